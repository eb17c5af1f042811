//! Conversion of poll outcomes into time-series points.

use crate::error::StorageError;
use crate::metrics::data::{MetricPoint, PollOutcome};
use crate::registry::DeviceDescriptor;
use crate::storage::PointSink;
use chrono::{DateTime, Utc};

/// Build the point for one device.
///
/// Failed polls carry only `online=false` and `cloud_accessible=false`.
/// Optional readings are omitted, never written as zero.
pub fn build_point(
    descriptor: &DeviceDescriptor,
    outcome: &PollOutcome,
    captured_at: DateTime<Utc>,
) -> MetricPoint {
    let point = MetricPoint::new(crate::MEASUREMENT, captured_at)
        .tag("device", descriptor.name.as_str())
        .tag("device_id", descriptor.id.as_str())
        .tag("type", descriptor.device_type.as_str());

    match outcome {
        PollOutcome::Unreachable | PollOutcome::MalformedResponse => point
            .field("online", false)
            .field("cloud_accessible", false),
        PollOutcome::Success(metric) => point
            .field("online", metric.online)
            .field("cloud_accessible", true)
            .field("output", metric.output)
            .field("output_int", i64::from(metric.output))
            .field("power", metric.power)
            .field("energy", metric.energy)
            .optional_field("voltage", metric.voltage)
            .optional_field("current", metric.current)
            .optional_field("temperature", metric.temperature),
    }
}

/// Build the point for one device and write it to its bucket.
pub async fn emit<S: PointSink>(
    sink: &S,
    descriptor: &DeviceDescriptor,
    outcome: &PollOutcome,
    captured_at: DateTime<Utc>,
) -> Result<MetricPoint, StorageError> {
    let point = build_point(descriptor, outcome, captured_at);
    sink.write(&descriptor.bucket, &point).await?;
    Ok(point)
}
