//! InfluxDB line protocol encoding.

use crate::error::StorageError;
use crate::metrics::{FieldValue, MetricPoint};
use std::fmt::Write;

/// Encode a point as one line, timestamp in milliseconds.
///
/// Tags with empty values and non-finite float fields are dropped, since
/// InfluxDB rejects both. A point left without fields cannot be encoded.
pub fn encode(point: &MetricPoint) -> Result<String, StorageError> {
    if point.measurement.is_empty() {
        return Err(StorageError::Encode("measurement name is empty".into()));
    }

    let mut line = String::with_capacity(128);
    escape_into(&mut line, &point.measurement, &[',', ' ']);

    for (key, value) in &point.tags {
        if key.is_empty() || value.is_empty() {
            continue;
        }
        line.push(',');
        escape_into(&mut line, key, &[',', '=', ' ']);
        line.push('=');
        escape_into(&mut line, value, &[',', '=', ' ']);
    }

    let mut written = 0;
    for (key, value) in &point.fields {
        if key.is_empty() {
            continue;
        }
        if let FieldValue::Float(f) = value {
            if !f.is_finite() {
                continue;
            }
        }
        line.push(if written == 0 { ' ' } else { ',' });
        escape_into(&mut line, key, &[',', '=', ' ']);
        line.push('=');
        push_value(&mut line, value);
        written += 1;
    }

    if written == 0 {
        return Err(StorageError::Encode(format!(
            "point {} has no encodable fields",
            point.measurement
        )));
    }

    let _ = write!(line, " {}", point.timestamp.timestamp_millis());
    Ok(line)
}

fn push_value(line: &mut String, value: &FieldValue) {
    let _ = match value {
        FieldValue::Bool(b) => write!(line, "{}", b),
        FieldValue::Int(i) => write!(line, "{}i", i),
        FieldValue::Float(f) => write!(line, "{}", f),
    };
}

fn escape_into(out: &mut String, text: &str, special: &[char]) {
    for c in text.chars() {
        if c == '\\' || special.contains(&c) {
            out.push('\\');
        }
        match c {
            '\n' => out.push_str("\\n"),
            _ => out.push(c),
        }
    }
}
