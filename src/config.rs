//! Logger configuration.
//!
//! The configuration is read once from a YAML file, overlaid with environment
//! variables, validated, and then treated as immutable for the life of the
//! process.

use crate::error::{Result, ShellyError};
use crate::registry::{self, DeviceDescriptor};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// Environment variable naming the configuration file.
pub const CONFIG_FILE_ENV: &str = "CONFIG_FILE";

/// Configuration file used when neither the CLI nor the environment names one.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";

/// Complete logger configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Shelly Cloud account settings
    pub shelly_cloud: ShellyCloudConfig,
    /// InfluxDB connection settings
    pub influxdb: InfluxConfig,
    /// Devices polled outside any group
    pub devices: Vec<DeviceConfig>,
    /// Device groups sharing a bucket
    pub groups: Vec<GroupConfig>,
    /// Minutes between poll cycles
    pub poll_interval: u64,
}

/// Shelly Cloud account settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellyCloudConfig {
    /// Per-account API host, e.g. `shelly-103-eu.shelly.cloud`
    pub server_uri: String,
    /// Cloud authorization key, passed through untouched
    pub auth_key: String,
}

/// InfluxDB v2 connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InfluxConfig {
    pub url: String,
    pub token: String,
    pub org: String,
    /// Default bucket for devices that do not name their own
    pub bucket: String,
}

/// A single device entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Device id as known to Shelly Cloud
    pub id: String,
    /// Display name; the id is used when empty
    #[serde(default)]
    pub name: String,
    /// Free-form device type tag
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub device_type: Option<String>,
    /// Switch or relay index to read
    #[serde(default)]
    pub channel: usize,
    /// Bucket override for this device
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,
}

/// A group of devices sharing a bucket.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupConfig {
    /// Optional label, only used in logs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Bucket applied to members that do not name their own
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,
    pub devices: Vec<DeviceConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            shelly_cloud: ShellyCloudConfig::default(),
            influxdb: InfluxConfig::default(),
            devices: Vec::new(),
            groups: Vec::new(),
            poll_interval: crate::DEFAULT_POLL_INTERVAL_MINUTES,
        }
    }
}

impl Default for InfluxConfig {
    fn default() -> Self {
        Self {
            url: crate::DEFAULT_INFLUXDB_URL.to_string(),
            token: String::new(),
            org: String::new(),
            bucket: crate::DEFAULT_BUCKET.to_string(),
        }
    }
}

impl DeviceConfig {
    /// Create a device entry with the given id and display name.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    /// Set the device type tag.
    pub fn with_type(mut self, device_type: impl Into<String>) -> Self {
        self.device_type = Some(device_type.into());
        self
    }

    /// Set the channel to read.
    pub fn with_channel(mut self, channel: usize) -> Self {
        self.channel = channel;
        self
    }

    /// Route this device to a specific bucket.
    pub fn with_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = Some(bucket.into());
        self
    }
}

impl GroupConfig {
    /// Create a group routing its members to `bucket`.
    pub fn new(bucket: Option<String>, devices: Vec<DeviceConfig>) -> Self {
        Self {
            name: None,
            bucket,
            devices,
        }
    }
}

impl AppConfig {
    /// Load the configuration from `path` (or `CONFIG_FILE`, or `config.yaml`)
    /// and apply environment overrides. Callers validate what they need.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = config_path(path, |key| std::env::var(key).ok());

        let mut config = if path.exists() {
            info!("Loading configuration from {}", path.display());
            let text = std::fs::read_to_string(&path)?;
            Self::from_yaml_str(&text)?
        } else {
            info!(
                "Config file {} not found, using defaults and environment variables",
                path.display()
            );
            Self::default()
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Parse a YAML document. An empty document yields the defaults.
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }

    /// Overlay values from the environment. `lookup` returns the value of a
    /// variable; empty values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(value) = get("SHELLY_SERVER_URI") {
            self.shelly_cloud.server_uri = value;
        }
        if let Some(value) = get("SHELLY_AUTH_KEY") {
            self.shelly_cloud.auth_key = value;
        }
        if let Some(value) = get("INFLUXDB_URL") {
            self.influxdb.url = value;
        }
        if let Some(value) = get("INFLUXDB_TOKEN") {
            self.influxdb.token = value;
        }
        if let Some(value) = get("INFLUXDB_ORG") {
            self.influxdb.org = value;
        }
        if let Some(value) = get("INFLUXDB_BUCKET") {
            self.influxdb.bucket = value;
        }
        if let Some(value) = get("POLL_INTERVAL") {
            self.poll_interval = value.trim().parse().map_err(|_| {
                ShellyError::config_error(format!("POLL_INTERVAL must be a whole number of minutes, got {:?}", value))
            })?;
        }
        Ok(())
    }

    /// Check the settings needed to talk to Shelly Cloud.
    pub fn validate_cloud(&self) -> Result<()> {
        if self.shelly_cloud.auth_key.trim().is_empty() {
            return Err(ShellyError::config_error(
                "Shelly Cloud auth_key not configured (Shelly App > User Settings > Authorization cloud key)",
            ));
        }
        if self.shelly_cloud.server_uri.trim().is_empty() {
            return Err(ShellyError::config_error(
                "Shelly Cloud server_uri not configured (Shelly App > User Settings > Authorization cloud key)",
            ));
        }
        Ok(())
    }

    /// Check everything the polling loop needs.
    pub fn validate(&self) -> Result<()> {
        self.validate_cloud()?;
        if self.influxdb.token.trim().is_empty() {
            return Err(ShellyError::config_error("InfluxDB token not configured"));
        }
        if self.influxdb.bucket.trim().is_empty() {
            return Err(ShellyError::config_error("InfluxDB default bucket is empty"));
        }
        if self.poll_interval == 0 {
            return Err(ShellyError::config_error("poll_interval must be at least 1 minute"));
        }
        Ok(())
    }

    /// Flatten groups and devices into the ordered poll list.
    pub fn resolve_devices(&self) -> Result<Vec<DeviceDescriptor>> {
        registry::resolve(&self.groups, &self.devices, &self.influxdb.bucket)
    }

    /// Poll interval as a duration.
    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.poll_interval.saturating_mul(60))
    }

    /// Copy of the configuration with secrets masked, for display.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        copy.shelly_cloud.auth_key = redact(&copy.shelly_cloud.auth_key);
        copy.influxdb.token = redact(&copy.influxdb.token);
        copy
    }
}

fn config_path<F>(explicit: Option<&Path>, lookup: F) -> PathBuf
where
    F: Fn(&str) -> Option<String>,
{
    match explicit {
        Some(path) => path.to_path_buf(),
        None => lookup(CONFIG_FILE_ENV)
            .filter(|value| !value.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE)),
    }
}

fn redact(secret: &str) -> String {
    if secret.is_empty() {
        String::new()
    } else {
        "********".to_string()
    }
}
