//! Shelly Cloud HTTP client.

use crate::cloud::StatusSource;
use crate::config::ShellyCloudConfig;
use crate::error::{FetchError, Result, ShellyError};
use crate::metrics::RawStatus;
use serde::Serialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

/// Path of the get-by-ids endpoint.
pub const DEVICE_STATUS_PATH: &str = "/v2/devices/api/get";

/// Path of the account-wide status endpoint.
pub const ALL_STATUS_PATH: &str = "/device/all_status";

/// Client for one Shelly Cloud account.
#[derive(Clone)]
pub struct CloudClient {
    http: reqwest::Client,
    base_url: String,
    auth_key: String,
}

/// A device known to the cloud account.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountDevice {
    pub id: String,
    /// Hardware model code, e.g. `SNSW-001P16EU`
    pub model: Option<String>,
    /// Hardware generation as reported
    pub generation: Option<String>,
    pub online: bool,
    /// Component keys present in the status, sorted
    pub components: Vec<String>,
}

impl CloudClient {
    /// Create a client with the default fetch timeout.
    pub fn new(config: &ShellyCloudConfig) -> Result<Self> {
        Self::with_timeout(config, crate::FETCH_TIMEOUT)
    }

    /// Create a client whose requests give up after `timeout`.
    pub fn with_timeout(config: &ShellyCloudConfig, timeout: Duration) -> Result<Self> {
        if config.server_uri.trim().is_empty() {
            return Err(ShellyError::config_error("Shelly Cloud server_uri is empty"));
        }
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url(&config.server_uri),
            auth_key: config.auth_key.clone(),
        })
    }

    /// Base URL requests are sent to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch the raw status of a single device.
    ///
    /// Every failure is reported as [`FetchError::Unreachable`]; the reason
    /// only differs in the log line.
    pub async fn get_device_status(&self, device_id: &str) -> std::result::Result<RawStatus, FetchError> {
        let url = format!("{}{}", self.base_url, DEVICE_STATUS_PATH);
        let payload = json!({
            "ids": [device_id],
            "select": ["status"],
        });
        debug!("POST {} for device {}", url, device_id);

        let response = self
            .http
            .post(&url)
            .query(&[("auth_key", self.auth_key.as_str())])
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                let reason = if e.is_timeout() {
                    "request timed out".to_string()
                } else {
                    format!("request failed: {}", e)
                };
                warn!("Error connecting to Shelly Cloud for {}: {}", device_id, reason);
                FetchError::Unreachable(reason)
            })?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            warn!("HTTP {} for device {}: {}", status.as_u16(), device_id, body);
            return Err(FetchError::unreachable(format!("HTTP {}", status.as_u16())));
        }

        let body: Value = response.json().await.map_err(|e| {
            warn!("Error parsing response for {}: {}", device_id, e);
            FetchError::unreachable(format!("invalid response body: {}", e))
        })?;

        select_device_entry(body, device_id).map_err(|e| {
            warn!("No status for device {}: {}", device_id, e);
            e
        })
    }

    /// List every device registered to the account.
    pub async fn list_account_devices(&self) -> Result<Vec<AccountDevice>> {
        let url = format!("{}{}", self.base_url, ALL_STATUS_PATH);
        debug!("POST {}", url);

        let response = self
            .http
            .post(&url)
            .form(&[("auth_key", self.auth_key.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ShellyError::api_error(format!("HTTP {}: {}", status.as_u16(), body)));
        }

        let body: Value = response.json().await?;
        parse_account_devices(&body)
    }
}

impl StatusSource for CloudClient {
    async fn fetch_status(&self, device_id: &str) -> std::result::Result<RawStatus, FetchError> {
        self.get_device_status(device_id).await
    }
}

/// Accept a bare host (https implied) or a full base URL.
fn base_url(server_uri: &str) -> String {
    let trimmed = server_uri.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    }
}

/// Pick the entry for `device_id` out of a get-by-ids response.
///
/// The entry whose `id` matches wins; otherwise the first element is used.
pub(crate) fn select_device_entry(
    body: Value,
    device_id: &str,
) -> std::result::Result<RawStatus, FetchError> {
    let Value::Array(entries) = body else {
        return Err(FetchError::unreachable("response is not a list"));
    };

    let position = entries
        .iter()
        .position(|entry| entry.get("id").and_then(Value::as_str) == Some(device_id))
        .unwrap_or(0);

    entries
        .into_iter()
        .nth(position)
        .map(RawStatus::new)
        .ok_or_else(|| FetchError::unreachable("empty response list"))
}

pub(crate) fn parse_account_devices(body: &Value) -> Result<Vec<AccountDevice>> {
    if body.get("isok").and_then(Value::as_bool) != Some(true) {
        return Err(ShellyError::api_error("API returned isok=false"));
    }

    let Some(statuses) = body
        .pointer("/data/devices_status")
        .and_then(Value::as_object)
    else {
        return Ok(Vec::new());
    };

    let mut devices: Vec<AccountDevice> = statuses
        .iter()
        .map(|(id, entry)| {
            let info = entry.get("_dev_info");
            let text = |key: &str| {
                info.and_then(|i| i.get(key)).and_then(|v| match v {
                    Value::String(s) => Some(s.clone()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
            };
            let online = info
                .and_then(|i| i.get("online"))
                .map(|v| v.as_bool().unwrap_or(false) || v.as_u64() == Some(1))
                .unwrap_or(false);

            let mut components: Vec<String> = entry
                .as_object()
                .map(|o| o.keys().filter(|k| !k.starts_with('_')).cloned().collect())
                .unwrap_or_default();
            components.sort();

            AccountDevice {
                id: id.clone(),
                model: text("code"),
                generation: text("gen"),
                online,
                components,
            }
        })
        .collect();

    devices.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(devices)
}
