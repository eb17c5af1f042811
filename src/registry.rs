//! Device registry: flattens the configured group/device tree into the
//! ordered list polled every cycle.

use crate::config::{DeviceConfig, GroupConfig};
use crate::error::{Result, ShellyError};
use serde::Serialize;
use tracing::{debug, warn};

/// Device type tag used when the configuration does not name one.
pub const UNKNOWN_DEVICE_TYPE: &str = "unknown";

/// A resolved, immutable poll target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceDescriptor {
    /// Device id sent to the cloud API
    pub id: String,
    /// Display name, used as the `device` tag
    pub name: String,
    /// Free-form classification, used as the `type` tag
    pub device_type: String,
    /// Switch/relay index to read
    pub channel: usize,
    /// Destination bucket
    pub bucket: String,
}

impl DeviceDescriptor {
    /// Resolve one device entry. Bucket precedence is device, then
    /// `inherited` (the enclosing group), then `default_bucket`.
    pub fn from_config(
        device: &DeviceConfig,
        inherited: Option<&str>,
        default_bucket: &str,
    ) -> Result<Self> {
        let id = device.id.trim();
        if id.is_empty() {
            return Err(ShellyError::config_error(format!(
                "device {:?} has no id",
                device.name
            )));
        }

        let name = if device.name.trim().is_empty() {
            id.to_string()
        } else {
            device.name.clone()
        };

        let device_type = device
            .device_type
            .clone()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| UNKNOWN_DEVICE_TYPE.to_string());

        let bucket = non_empty(device.bucket.as_deref())
            .or_else(|| non_empty(inherited))
            .unwrap_or(default_bucket)
            .to_string();

        Ok(Self {
            id: id.to_string(),
            name,
            device_type,
            channel: device.channel,
            bucket,
        })
    }
}

/// Resolve groups (in declared order) followed by the flat device list.
///
/// Fails when nothing is left to poll.
pub fn resolve(
    groups: &[GroupConfig],
    devices: &[DeviceConfig],
    default_bucket: &str,
) -> Result<Vec<DeviceDescriptor>> {
    let mut resolved = Vec::with_capacity(
        devices.len() + groups.iter().map(|g| g.devices.len()).sum::<usize>(),
    );

    for group in groups {
        debug!(
            "Resolving group {} ({} devices)",
            group.name.as_deref().unwrap_or("<unnamed>"),
            group.devices.len()
        );
        for device in &group.devices {
            resolved.push(DeviceDescriptor::from_config(
                device,
                group.bucket.as_deref(),
                default_bucket,
            )?);
        }
    }

    for device in devices {
        resolved.push(DeviceDescriptor::from_config(device, None, default_bucket)?);
    }

    if resolved.is_empty() {
        return Err(ShellyError::config_error(
            "No devices configured! Add devices or groups to the configuration",
        ));
    }

    for (i, device) in resolved.iter().enumerate() {
        if resolved[..i].iter().any(|other| other.id == device.id) {
            warn!("Device id {} is configured more than once", device.id);
        }
    }

    Ok(resolved)
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_groups_come_first_with_inherited_bucket() {
        let groups = vec![GroupConfig::new(
            Some("g1".into()),
            vec![DeviceConfig::new("A", "Device A")],
        )];
        let devices = vec![DeviceConfig::new("B", "Device B")];

        let resolved = resolve(&groups, &devices, "default").unwrap();
        let summary: Vec<(&str, &str)> = resolved
            .iter()
            .map(|d| (d.id.as_str(), d.bucket.as_str()))
            .collect();
        assert_eq!(summary, vec![("A", "g1"), ("B", "default")]);
    }

    #[test]
    fn test_device_bucket_beats_group_bucket() {
        let groups = vec![GroupConfig::new(
            Some("g1".into()),
            vec![
                DeviceConfig::new("A", "A").with_bucket("own"),
                DeviceConfig::new("C", "C"),
            ],
        )];
        let resolved = resolve(&groups, &[], "default").unwrap();
        assert_eq!(resolved[0].bucket, "own");
        assert_eq!(resolved[1].bucket, "g1");
    }

    #[test]
    fn test_group_without_bucket_falls_back_to_default() {
        let groups = vec![GroupConfig::new(None, vec![DeviceConfig::new("A", "A")])];
        let resolved = resolve(&groups, &[], "default").unwrap();
        assert_eq!(resolved[0].bucket, "default");
    }

    #[test]
    fn test_defaults_for_type_channel_and_name() {
        let resolved = resolve(&[], &[DeviceConfig::new("abc123", "")], "b").unwrap();
        assert_eq!(resolved[0].device_type, UNKNOWN_DEVICE_TYPE);
        assert_eq!(resolved[0].channel, 0);
        assert_eq!(resolved[0].name, "abc123");
    }

    #[test]
    fn test_declared_order_is_preserved() {
        let groups = vec![
            GroupConfig::new(Some("x".into()), vec![DeviceConfig::new("1", "1"), DeviceConfig::new("2", "2")]),
            GroupConfig::new(Some("y".into()), vec![DeviceConfig::new("3", "3")]),
        ];
        let devices = vec![DeviceConfig::new("4", "4"), DeviceConfig::new("5", "5")];
        let ids: Vec<String> = resolve(&groups, &devices, "d")
            .unwrap()
            .into_iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(ids, vec!["1", "2", "3", "4", "5"]);
    }

    #[test]
    fn test_empty_list_is_a_configuration_error() {
        let err = resolve(&[GroupConfig::default()], &[], "d").unwrap_err();
        assert!(matches!(err, ShellyError::Config(_)));
    }

    #[test]
    fn test_missing_id_is_rejected() {
        let err = resolve(&[], &[DeviceConfig::new("  ", "nameless")], "d").unwrap_err();
        assert!(err.to_string().contains("no id"));
    }
}
