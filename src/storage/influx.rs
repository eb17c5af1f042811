//! InfluxDB v2 writer over the HTTP write API.

use crate::config::InfluxConfig;
use crate::error::{Result, StorageError};
use crate::metrics::MetricPoint;
use crate::storage::{line_protocol, PointSink};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info};

/// Upper bound for a single write request.
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Writes points to an InfluxDB v2 server, one request per point.
pub struct InfluxWriter {
    client: reqwest::Client,
    write_url: String,
    org: String,
    token: String,
    closed: AtomicBool,
}

impl InfluxWriter {
    /// Create a writer for the configured server.
    pub fn new(config: &InfluxConfig) -> Result<Self> {
        Self::with_timeout(config, WRITE_TIMEOUT)
    }

    /// Create a writer with a custom request timeout.
    pub fn with_timeout(config: &InfluxConfig, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            write_url: write_url(&config.url),
            org: config.org.clone(),
            token: config.token.clone(),
            closed: AtomicBool::new(false),
        })
    }

    /// Full URL of the write endpoint.
    pub fn write_url(&self) -> &str {
        &self.write_url
    }

    /// Whether [`PointSink::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl PointSink for InfluxWriter {
    async fn write(&self, bucket: &str, point: &MetricPoint) -> std::result::Result<(), StorageError> {
        if self.is_closed() {
            return Err(StorageError::Transport("writer is closed".into()));
        }

        let body = line_protocol::encode(point)?;
        debug!("Writing to bucket {}: {}", bucket, body);

        let response = self
            .client
            .post(&self.write_url)
            .query(&[
                ("org", self.org.as_str()),
                ("bucket", bucket),
                ("precision", "ms"),
            ])
            .header(AUTHORIZATION, format!("Token {}", self.token))
            .header(CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(body)
            .send()
            .await
            .map_err(|e| StorageError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(StorageError::Rejected {
                status: status.as_u16(),
                body,
            })
        }
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            info!("Closed InfluxDB writer ({})", self.write_url);
        }
    }
}

fn write_url(base: &str) -> String {
    format!("{}/api/v2/write", base.trim_end_matches('/'))
}
