//! Status normalization.
//!
//! Shelly devices report status in different shapes depending on hardware
//! generation and capability. Each shape has a detector; detectors run in a
//! fixed priority order and the first one that recognises the payload wins.
//! A payload is never blended from two shapes.

use crate::error::NormalizationError;
use crate::metrics::data::{CanonicalMetric, RawStatus};
use serde_json::{Map, Value};
use std::fmt;

type Object = Map<String, Value>;

/// Capability shapes in detection order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityShape {
    /// Gen2+ `switch:<channel>` component
    Switch,
    /// Gen1 `relays` + `meters` lists
    Relay,
    /// Gen2+ `cover:0` roller shutter
    Cover,
    /// Gen2+ `light:0` dimmer/bulb
    Light,
}

impl CapabilityShape {
    /// Priority order used by [`normalize`].
    pub const DETECTION_ORDER: [CapabilityShape; 4] = [
        CapabilityShape::Switch,
        CapabilityShape::Relay,
        CapabilityShape::Cover,
        CapabilityShape::Light,
    ];

    /// Extract a reading if `status` has this shape.
    ///
    /// `Ok(None)` means "not this shape". The returned metric has `online`
    /// unset; the caller fills it in.
    fn read(
        self,
        status: &Object,
        channel: usize,
    ) -> Result<Option<CanonicalMetric>, NormalizationError> {
        match self {
            Self::Switch => read_switch(status, channel),
            Self::Relay => read_relay(status, channel),
            Self::Cover => read_cover(status),
            Self::Light => read_light(status),
        }
    }
}

impl fmt::Display for CapabilityShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Switch => "switch",
            Self::Relay => "relay",
            Self::Cover => "cover",
            Self::Light => "light",
        };
        f.write_str(name)
    }
}

/// A normalized metric together with the shape it was read from.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub metric: CanonicalMetric,
    /// `None` when no known capability was present
    pub shape: Option<CapabilityShape>,
}

/// Normalize a raw status for the given channel.
pub fn normalize(raw: &RawStatus, channel: usize) -> Result<CanonicalMetric, NormalizationError> {
    normalize_detailed(raw, channel).map(|normalized| normalized.metric)
}

/// Normalize a raw status and report which capability shape matched.
pub fn normalize_detailed(
    raw: &RawStatus,
    channel: usize,
) -> Result<Normalized, NormalizationError> {
    let root = raw.as_value().as_object().ok_or_else(|| {
        NormalizationError::malformed(format!(
            "device entry is {}, expected an object",
            kind(raw.as_value())
        ))
    })?;

    let online = is_one(root.get("online"));

    let status = match root.get("status") {
        None | Some(Value::Null) => {
            return Ok(Normalized {
                metric: CanonicalMetric {
                    online,
                    ..Default::default()
                },
                shape: None,
            })
        }
        Some(Value::Object(status)) => status,
        Some(other) => {
            return Err(NormalizationError::malformed(format!(
                "`status` is {}, expected an object",
                kind(other)
            )))
        }
    };

    for shape in CapabilityShape::DETECTION_ORDER {
        if let Some(mut metric) = shape.read(status, channel)? {
            metric.online = online;
            return Ok(Normalized {
                metric,
                shape: Some(shape),
            });
        }
    }

    Ok(Normalized {
        metric: CanonicalMetric {
            online,
            ..Default::default()
        },
        shape: None,
    })
}

fn read_switch(
    status: &Object,
    channel: usize,
) -> Result<Option<CanonicalMetric>, NormalizationError> {
    let Some(switch) = component(status, &format!("switch:{}", channel))? else {
        return Ok(None);
    };

    Ok(Some(CanonicalMetric {
        output: flag(switch.get("output")),
        power: number(switch.get("apower")).unwrap_or(0.0),
        energy: nested_number(switch.get("aenergy"), "total").unwrap_or(0.0),
        voltage: number(switch.get("voltage")),
        current: number(switch.get("current")),
        temperature: nested_number(switch.get("temperature"), "tC"),
        ..Default::default()
    }))
}

fn read_relay(
    status: &Object,
    channel: usize,
) -> Result<Option<CanonicalMetric>, NormalizationError> {
    let relays = match status.get("relays") {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Array(relays)) => relays,
        Some(other) => {
            return Err(NormalizationError::malformed(format!(
                "`relays` is {}, expected a list",
                kind(other)
            )))
        }
    };

    let meters = match status.get("meters") {
        None | Some(Value::Null) => None,
        Some(Value::Array(meters)) => Some(meters),
        Some(other) => {
            return Err(NormalizationError::malformed(format!(
                "`meters` is {}, expected a list",
                kind(other)
            )))
        }
    };

    let relay = element(relays, "relays", channel)?;
    let meter = match meters {
        Some(meters) => element(meters, "meters", channel)?,
        None => None,
    };

    Ok(Some(CanonicalMetric {
        output: relay.map(|r| flag(r.get("ison"))).unwrap_or(false),
        power: meter.and_then(|m| number(m.get("power"))).unwrap_or(0.0),
        energy: meter.and_then(|m| number(m.get("total"))).unwrap_or(0.0),
        temperature: nested_number(status.get("tmp"), "tC"),
        ..Default::default()
    }))
}

fn read_cover(status: &Object) -> Result<Option<CanonicalMetric>, NormalizationError> {
    let Some(cover) = component(status, "cover:0")? else {
        return Ok(None);
    };

    let state = cover
        .get("state")
        .and_then(Value::as_str)
        .unwrap_or("stopped");

    Ok(Some(CanonicalMetric {
        output: state == "open",
        power: number(cover.get("apower")).unwrap_or(0.0),
        ..Default::default()
    }))
}

fn read_light(status: &Object) -> Result<Option<CanonicalMetric>, NormalizationError> {
    let Some(light) = component(status, "light:0")? else {
        return Ok(None);
    };

    Ok(Some(CanonicalMetric {
        output: flag(light.get("output")),
        ..Default::default()
    }))
}

/// A capability component must be an object when present and not null.
fn component<'a>(status: &'a Object, key: &str) -> Result<Option<&'a Object>, NormalizationError> {
    match status.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(component)) => Ok(Some(component)),
        Some(other) => Err(NormalizationError::malformed(format!(
            "`{}` is {}, expected an object",
            key,
            kind(other)
        ))),
    }
}

/// Channel entry of a Gen1 list. Out of range or null is absent.
fn element<'a>(
    list: &'a [Value],
    key: &str,
    channel: usize,
) -> Result<Option<&'a Object>, NormalizationError> {
    match list.get(channel) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(entry)) => Ok(Some(entry)),
        Some(other) => Err(NormalizationError::malformed(format!(
            "`{}[{}]` is {}, expected an object",
            key,
            channel,
            kind(other)
        ))),
    }
}

/// Null, missing and non-numeric values are all absent.
fn number(value: Option<&Value>) -> Option<f64> {
    value.and_then(Value::as_f64)
}

fn nested_number(parent: Option<&Value>, key: &str) -> Option<f64> {
    parent
        .and_then(Value::as_object)
        .and_then(|object| number(object.get(key)))
}

fn flag(value: Option<&Value>) -> bool {
    value.and_then(Value::as_bool).unwrap_or(false)
}

fn is_one(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Number(n)) => n.as_u64() == Some(1) || n.as_f64() == Some(1.0),
        _ => false,
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}
