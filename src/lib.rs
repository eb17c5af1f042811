//! # Shelly Cloud Logger
//!
//! Polls Shelly devices through the Shelly Cloud API and records their status
//! as InfluxDB points, one point per device per poll cycle.
//!
//! ## Features
//!
//! - **Every hardware generation**: Gen2+ switches, Gen1 relays with meters,
//!   covers and lights are normalized into one metric shape
//! - **Rate-limit aware**: fetches are sequential and spaced 1.1s apart
//! - **Never drops a device**: unreachable or malformed devices are still
//!   recorded as offline
//! - **Bucket routing**: per-device and per-group InfluxDB buckets
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use shelly_cloud_logger::{AppConfig, CloudClient, InfluxWriter, Poller};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AppConfig::load(None)?;
//!     config.validate()?;
//!
//!     let client = CloudClient::new(&config.shelly_cloud)?;
//!     let writer = InfluxWriter::new(&config.influxdb)?;
//!     let mut poller = Poller::new(client, writer, config.resolve_devices()?)?;
//!
//!     let report = poller.run_cycle().await;
//!     println!("{}", report);
//!     poller.close().await;
//!     Ok(())
//! }
//! ```

use std::time::Duration;

pub mod cloud;
pub mod config;
pub mod error;
pub mod metrics;
pub mod poller;
pub mod registry;
pub mod storage;

// Re-export public API
pub use cloud::{AccountDevice, CloudClient, StatusSource};
pub use config::{AppConfig, DeviceConfig, GroupConfig, InfluxConfig, ShellyCloudConfig};
pub use error::{FetchError, NormalizationError, Result, ShellyError, StorageError};
pub use metrics::{
    data::{CanonicalMetric, FieldValue, MetricPoint, PollOutcome, RawStatus},
    normalizer::{normalize, CapabilityShape},
};
pub use poller::{CycleReport, PollState, Poller, RateLimiter};
pub use registry::DeviceDescriptor;
pub use storage::{InfluxWriter, PointSink};

/// Measurement name of every emitted point
pub const MEASUREMENT: &str = "shelly_status";

/// Bucket used when neither the device nor its group names one
pub const DEFAULT_BUCKET: &str = "shelly_status";

/// InfluxDB URL used when none is configured
pub const DEFAULT_INFLUXDB_URL: &str = "http://localhost:8086";

/// Minutes between poll cycles when none is configured
pub const DEFAULT_POLL_INTERVAL_MINUTES: u64 = 5;

/// Minimum spacing between two status requests
pub const REQUEST_SPACING: Duration = Duration::from_millis(1100);

/// Upper bound for a single status request
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(10);
