//! Access to the Shelly Cloud API.

pub mod client;

pub use client::{AccountDevice, CloudClient};

use crate::error::FetchError;
use crate::metrics::RawStatus;

/// Source of raw device status.
///
/// The poller is generic over this trait so a cycle can run against
/// something other than the live cloud.
pub trait StatusSource {
    /// Fetch the current status of one device. Must not retry.
    fn fetch_status(
        &self,
        device_id: &str,
    ) -> impl std::future::Future<Output = Result<RawStatus, FetchError>> + Send;
}
