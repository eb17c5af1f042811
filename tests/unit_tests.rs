use chrono::{TimeZone, Utc};
use serde_json::json;
use shelly_cloud_logger::{
    error::NormalizationError,
    metrics::{build_point, normalize_detailed},
    storage::line_protocol,
    AppConfig, CanonicalMetric, CapabilityShape, DeviceDescriptor, FieldValue, PollOutcome,
    RawStatus, ShellyError, DEFAULT_BUCKET, MEASUREMENT,
};
use std::collections::HashMap;

fn raw(value: serde_json::Value) -> RawStatus {
    RawStatus::new(value)
}

fn descriptor(id: &str, name: &str) -> DeviceDescriptor {
    DeviceDescriptor {
        id: id.to_string(),
        name: name.to_string(),
        device_type: "plus1pm".into(),
        channel: 0,
        bucket: DEFAULT_BUCKET.into(),
    }
}

/// A full YAML file resolves into the poll order: groups first, then devices
#[test]
fn test_config_resolves_groups_before_devices() {
    let yaml = r#"
shelly_cloud:
  server_uri: shelly-103-eu.shelly.cloud
  auth_key: abc
influxdb:
  token: tok
  org: home
  bucket: shelly_status
poll_interval: 2
groups:
  - name: garage
    bucket: garage
    devices:
      - id: g1
        name: Door
devices:
  - id: d1
    name: Lamp
    type: shelly1
  - id: d2
    bucket: heating
"#;
    let config = AppConfig::from_yaml_str(yaml).unwrap();
    config.validate().unwrap();
    assert_eq!(config.poll_interval().as_secs(), 120);

    let devices = config.resolve_devices().unwrap();
    let summary: Vec<(&str, &str, &str)> = devices
        .iter()
        .map(|d| (d.id.as_str(), d.name.as_str(), d.bucket.as_str()))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("g1", "Door", "garage"),
            ("d1", "Lamp", "shelly_status"),
            ("d2", "d2", "heating"),
        ]
    );
    assert_eq!(devices[1].device_type, "shelly1");
    assert_eq!(devices[2].device_type, "unknown");
}

/// Environment values take precedence over the file
#[test]
fn test_environment_overrides_file() {
    let mut config = AppConfig::from_yaml_str("devices:\n  - id: a\n").unwrap();
    let env: HashMap<&str, &str> = HashMap::from([
        ("SHELLY_SERVER_URI", "shelly-1-eu.shelly.cloud"),
        ("SHELLY_AUTH_KEY", "key"),
        ("INFLUXDB_TOKEN", "tok"),
        ("INFLUXDB_ORG", "org"),
        ("INFLUXDB_BUCKET", "other"),
        ("POLL_INTERVAL", "10"),
    ]);
    config
        .apply_overrides(|name| env.get(name).map(|v| v.to_string()))
        .unwrap();

    config.validate().unwrap();
    assert_eq!(config.poll_interval, 10);
    assert_eq!(config.resolve_devices().unwrap()[0].bucket, "other");
}

/// Missing credentials are reported as configuration errors
#[test]
fn test_missing_credentials_are_fatal() {
    let config = AppConfig::from_yaml_str("devices:\n  - id: a\n").unwrap();
    let err = config.validate().unwrap_err();
    assert!(matches!(err, ShellyError::Config(_)));
    assert!(err.is_fatal());
}

/// A Gen2 switch payload maps onto the canonical metric
#[test]
fn test_switch_payload_normalizes() {
    let status = raw(json!({
        "id": "abc",
        "online": 1,
        "status": {
            "switch:0": {
                "output": true,
                "apower": 12.5,
                "voltage": 231.2,
                "current": 0.054,
                "aenergy": { "total": 1520.25 },
                "temperature": { "tC": 41.3 }
            }
        }
    }));
    let normalized = normalize_detailed(&status, 0).unwrap();
    assert_eq!(normalized.shape, Some(CapabilityShape::Switch));
    assert_eq!(
        normalized.metric,
        CanonicalMetric {
            online: true,
            output: true,
            power: 12.5,
            energy: 1520.25,
            voltage: Some(231.2),
            current: Some(0.054),
            temperature: Some(41.3),
        }
    );
}

/// Gen1 relays take their power and energy from the meter on the same channel
#[test]
fn test_relay_payload_uses_matching_meter() {
    let status = raw(json!({
        "online": 1,
        "status": {
            "relays": [{ "ison": false }, { "ison": true }],
            "meters": [{ "power": 1.0, "total": 5.0 }, { "power": 60.0, "total": 900.0 }],
            "tmp": { "tC": 38.0 }
        }
    }));
    let normalized = normalize_detailed(&status, 1).unwrap();
    assert_eq!(normalized.shape, Some(CapabilityShape::Relay));
    assert!(normalized.metric.output);
    assert_eq!(normalized.metric.power, 60.0);
    assert_eq!(normalized.metric.energy, 900.0);
    assert_eq!(normalized.metric.temperature, Some(38.0));
}

/// Covers report output from their state; an open cover counts as on
#[test]
fn test_cover_payload() {
    let status = raw(json!({
        "online": 1,
        "status": { "cover:0": { "state": "open", "apower": 0.0 } }
    }));
    let normalized = normalize_detailed(&status, 0).unwrap();
    assert_eq!(normalized.shape, Some(CapabilityShape::Cover));
    assert!(normalized.metric.output);
}

/// Unknown shapes still produce a default metric with online taken from the payload
#[test]
fn test_unknown_shape_yields_defaults() {
    let status = raw(json!({ "online": 1, "status": { "input:0": { "state": true } } }));
    let normalized = normalize_detailed(&status, 0).unwrap();
    assert_eq!(normalized.shape, None);
    assert!(normalized.metric.online);
    assert!(!normalized.metric.output);
    assert_eq!(normalized.metric.power, 0.0);
}

/// Structurally broken payloads are rejected instead of guessed at
#[test]
fn test_malformed_payloads_are_rejected() {
    for payload in [
        json!("not an object"),
        json!({ "online": 1, "status": [1, 2, 3] }),
        json!({ "online": 1, "status": { "switch:0": "on" } }),
        json!({ "online": 1, "status": { "relays": { "ison": true } } }),
        json!({ "online": 1, "status": { "relays": ["on"] } }),
    ] {
        let result = normalize_detailed(&raw(payload.clone()), 0);
        assert!(
            matches!(result, Err(NormalizationError::MalformedResponse(_))),
            "expected rejection for {}",
            payload
        );
    }
}

/// A capability key that is present but null is skipped, not rejected
#[test]
fn test_null_capability_keeps_device_online() {
    for payload in [
        json!({ "online": 1, "status": { "switch:0": null } }),
        json!({ "online": 1, "status": { "relays": null } }),
        json!({ "online": 1, "status": { "cover:0": null } }),
        json!({ "online": 1, "status": { "relays": [], "meters": null } }),
    ] {
        let normalized = normalize_detailed(&raw(payload.clone()), 0)
            .unwrap_or_else(|e| panic!("{} was rejected: {}", payload, e));
        assert!(normalized.metric.online, "{} lost its online flag", payload);
        assert!(!normalized.metric.output);
    }
}

/// Every outcome produces a point with the same identifying tags
#[test]
fn test_points_for_all_outcomes_carry_tags() {
    let device = descriptor("abc", "Kitchen");
    let at = Utc::now();
    for outcome in [
        PollOutcome::Success(CanonicalMetric::default()),
        PollOutcome::Unreachable,
        PollOutcome::MalformedResponse,
    ] {
        let point = build_point(&device, &outcome, at);
        assert_eq!(point.measurement, MEASUREMENT);
        assert_eq!(point.tag_value("device"), Some("Kitchen"));
        assert_eq!(point.tag_value("device_id"), Some("abc"));
        assert_eq!(point.tag_value("type"), Some("plus1pm"));
        assert_eq!(
            point.field_value("cloud_accessible"),
            Some(FieldValue::Bool(outcome.is_success()))
        );
    }
}

/// A normalized payload ends up as a single line-protocol record
#[test]
fn test_payload_to_line_protocol() {
    let status = raw(json!({
        "online": 1,
        "status": { "switch:0": { "output": true, "apower": 7.5, "aenergy": { "total": 100.0 } } }
    }));
    let metric = normalize_detailed(&status, 0).unwrap().metric;
    let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let point = build_point(&descriptor("abc", "Living Room"), &PollOutcome::Success(metric), at);

    let line = line_protocol::encode(&point).unwrap();
    assert_eq!(
        line,
        "shelly_status,device=Living\\ Room,device_id=abc,type=plus1pm \
         online=true,cloud_accessible=true,output=true,output_int=1i,power=7.5,energy=100 \
         1704067200000"
    );
}
