//! Time-series storage.
//!
//! The poller only sees the [`PointSink`] trait; [`InfluxWriter`] is the
//! production implementation.

pub mod influx;
pub mod line_protocol;

pub use influx::InfluxWriter;

use crate::error::StorageError;
use crate::metrics::MetricPoint;

/// Destination for emitted points.
///
/// Implementations are acquired once at startup and released with
/// [`PointSink::close`] when the poller shuts down.
pub trait PointSink {
    /// Write a single point to `bucket`.
    fn write(
        &self,
        bucket: &str,
        point: &MetricPoint,
    ) -> impl std::future::Future<Output = Result<(), StorageError>> + Send;

    /// Release the underlying connection.
    fn close(&self) -> impl std::future::Future<Output = ()> + Send;
}
