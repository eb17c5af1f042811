//! Data structures for device metrics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Raw status of one device as returned by Shelly Cloud.
///
/// Expected shape is `{"online": 0|1, "status": {...capability keys...}}`,
/// but nothing is checked until normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawStatus(pub Value);

impl RawStatus {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// Borrow the underlying JSON value.
    pub fn as_value(&self) -> &Value {
        &self.0
    }
}

impl From<Value> for RawStatus {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// Device status normalized across hardware generations and capabilities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalMetric {
    /// Whether the cloud reports the device as connected
    pub online: bool,
    /// Whether the controlled element is energized (or the cover open)
    pub output: bool,
    /// Active power in watts
    pub power: f64,
    /// Cumulative energy in watt-hours
    pub energy: f64,
    /// Supply voltage, when reported
    pub voltage: Option<f64>,
    /// Current draw in amperes, when reported
    pub current: Option<f64>,
    /// Device temperature in Celsius, when reported
    pub temperature: Option<f64>,
}

impl Default for CanonicalMetric {
    fn default() -> Self {
        Self {
            online: false,
            output: false,
            power: 0.0,
            energy: 0.0,
            voltage: None,
            current: None,
            temperature: None,
        }
    }
}

/// Result of polling one device.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Success(CanonicalMetric),
    Unreachable,
    MalformedResponse,
}

impl PollOutcome {
    /// Whether the cloud answered with a usable payload.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Short label for logs and reports.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Success(_) => "success",
            Self::Unreachable => "unreachable",
            Self::MalformedResponse => "malformed",
        }
    }
}

/// A field value in a time-series point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Bool(bool),
    Int(i64),
    Float(f64),
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

/// A point ready to be written to the time-series store.
///
/// Tags and fields keep their insertion order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricPoint {
    pub measurement: String,
    pub tags: Vec<(String, String)>,
    pub fields: Vec<(String, FieldValue)>,
    /// Capture time, never taken from the payload
    pub timestamp: DateTime<Utc>,
}

impl MetricPoint {
    /// Create an empty point for `measurement` at `timestamp`.
    pub fn new(measurement: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            measurement: measurement.into(),
            tags: Vec::new(),
            fields: Vec::new(),
            timestamp,
        }
    }

    /// Add a tag.
    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.push((key.into(), value.into()));
        self
    }

    /// Add a field.
    pub fn field(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.push((key.into(), value.into()));
        self
    }

    /// Add a field only when `value` is present.
    pub fn optional_field(self, key: impl Into<String>, value: Option<f64>) -> Self {
        match value {
            Some(value) => self.field(key, value),
            None => self,
        }
    }

    /// Look up a tag by key.
    pub fn tag_value(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Look up a field by key.
    pub fn field_value(&self, key: &str) -> Option<FieldValue> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| *v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_metric_defaults() {
        let metric = CanonicalMetric::default();
        assert!(!metric.online);
        assert!(!metric.output);
        assert_eq!(metric.power, 0.0);
        assert_eq!(metric.energy, 0.0);
        assert_eq!(metric.voltage, None);
        assert_eq!(metric.current, None);
        assert_eq!(metric.temperature, None);
    }

    #[test]
    fn test_optional_field_is_skipped_when_absent() {
        let point = MetricPoint::new("m", Utc::now())
            .optional_field("voltage", None)
            .optional_field("current", Some(0.0));
        assert_eq!(point.field_value("voltage"), None);
        assert_eq!(point.field_value("current"), Some(FieldValue::Float(0.0)));
        assert_eq!(point.fields.len(), 1);
    }

    #[test]
    fn test_outcome_labels() {
        assert_eq!(PollOutcome::Success(CanonicalMetric::default()).label(), "success");
        assert_eq!(PollOutcome::Unreachable.label(), "unreachable");
        assert!(!PollOutcome::MalformedResponse.is_success());
    }
}
