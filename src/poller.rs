//! Poll cycle driver.
//!
//! A [`Poller`] walks the resolved device list strictly in order, running
//! fetch, normalize and emit for each device. Every device produces exactly
//! one point per cycle, whatever fails along the way. Fetches are spaced by a
//! process-wide [`RateLimiter`] because Shelly Cloud allows roughly one
//! request per second per account.

use crate::cloud::StatusSource;
use crate::error::{Result, ShellyError};
use crate::metrics::{emitter, normalizer, PollOutcome};
use crate::registry::DeviceDescriptor;
use crate::storage::PointSink;
use chrono::{DateTime, Utc};
use futures_util::stream::{self, BoxStream};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Enforces a minimum spacing between consecutive fetches.
#[derive(Debug)]
pub struct RateLimiter {
    spacing: Duration,
    last: Option<Instant>,
}

impl RateLimiter {
    pub fn new(spacing: Duration) -> Self {
        Self {
            spacing,
            last: None,
        }
    }

    /// Wait until `spacing` has passed since the previous call, then record
    /// this call.
    pub async fn until_ready(&mut self) {
        if let Some(last) = self.last {
            time::sleep_until(last + self.spacing).await;
        }
        self.last = Some(Instant::now());
    }
}

/// Driver state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PollState {
    Idle,
    Polling,
}

/// Summary of one poll cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    /// Devices in the poll list
    pub devices: usize,
    /// Devices actually visited
    pub polled: usize,
    pub succeeded: usize,
    pub unreachable: usize,
    pub malformed: usize,
    pub storage_failures: usize,
    /// Shutdown was requested before every device was visited
    pub interrupted: bool,
}

impl CycleReport {
    fn new(started_at: DateTime<Utc>, devices: usize) -> Self {
        Self {
            started_at,
            elapsed_ms: 0,
            devices,
            polled: 0,
            succeeded: 0,
            unreachable: 0,
            malformed: 0,
            storage_failures: 0,
            interrupted: false,
        }
    }

    fn record(&mut self, outcome: &PollOutcome) {
        self.polled += 1;
        match outcome {
            PollOutcome::Success(_) => self.succeeded += 1,
            PollOutcome::Unreachable => self.unreachable += 1,
            PollOutcome::MalformedResponse => self.malformed += 1,
        }
    }
}

impl fmt::Display for CycleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} devices polled in {:.1}s: {} ok, {} unreachable, {} malformed, {} write failures",
            self.polled,
            self.devices,
            self.elapsed_ms as f64 / 1000.0,
            self.succeeded,
            self.unreachable,
            self.malformed,
            self.storage_failures
        )?;
        if self.interrupted {
            write!(f, " (interrupted)")?;
        }
        Ok(())
    }
}

/// Sequential poller over a fixed device list.
pub struct Poller<F, S> {
    source: F,
    sink: S,
    devices: Arc<[DeviceDescriptor]>,
    limiter: RateLimiter,
    state: PollState,
    shutdown: Option<watch::Receiver<bool>>,
}

impl<F, S> Poller<F, S>
where
    F: StatusSource,
    S: PointSink,
{
    /// Create a poller. Fails when `devices` is empty.
    pub fn new(source: F, sink: S, devices: Vec<DeviceDescriptor>) -> Result<Self> {
        if devices.is_empty() {
            return Err(ShellyError::config_error("No devices to poll"));
        }
        Ok(Self {
            source,
            sink,
            devices: devices.into(),
            limiter: RateLimiter::new(crate::REQUEST_SPACING),
            state: PollState::Idle,
            shutdown: None,
        })
    }

    /// Override the spacing between fetches.
    pub fn with_spacing(mut self, spacing: Duration) -> Self {
        self.limiter = RateLimiter::new(spacing);
        self
    }

    /// Stop between devices once `shutdown` turns true.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn state(&self) -> PollState {
        self.state
    }

    pub fn devices(&self) -> &[DeviceDescriptor] {
        &self.devices
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown
            .as_ref()
            .map(|rx| *rx.borrow())
            .unwrap_or(false)
    }

    /// Run one full cycle over the device list.
    pub async fn run_cycle(&mut self) -> CycleReport {
        self.state = PollState::Polling;
        let started = Instant::now();
        let devices = Arc::clone(&self.devices);
        let mut report = CycleReport::new(Utc::now(), devices.len());

        info!("Polling {} devices via Shelly Cloud API...", devices.len());

        for device in devices.iter() {
            if self.shutdown_requested() {
                warn!(
                    "Shutdown requested, skipping {} remaining devices",
                    devices.len() - report.polled
                );
                report.interrupted = true;
                break;
            }

            let outcome = self.poll_device(device).await;
            report.record(&outcome);

            match emitter::emit(&self.sink, device, &outcome, Utc::now()).await {
                Ok(_) => {
                    if let PollOutcome::Success(metric) = &outcome {
                        info!(
                            "✓ {} ({}): {} ({:.1}W)",
                            device.name,
                            if metric.online { "online" } else { "offline" },
                            if metric.output { "ON" } else { "OFF" },
                            metric.power
                        );
                    }
                }
                Err(e) => {
                    error!("Error writing to InfluxDB for {}: {}", device.name, e);
                    report.storage_failures += 1;
                }
            }
        }

        report.elapsed_ms = started.elapsed().as_millis() as u64;
        self.state = PollState::Idle;
        info!("Polling complete: {}", report);
        report
    }

    /// Fetch and normalize one device, waiting for the rate limiter first.
    async fn poll_device(&mut self, device: &DeviceDescriptor) -> PollOutcome {
        self.limiter.until_ready().await;

        let raw = match self.source.fetch_status(&device.id).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Failed to get status for {} ({}): {}", device.name, device.id, e);
                return PollOutcome::Unreachable;
            }
        };

        match normalizer::normalize_detailed(&raw, device.channel) {
            Ok(normalized) => {
                match normalized.shape {
                    Some(shape) => debug!("{} reported a {} shape", device.name, shape),
                    None => debug!("{} reported no known capability", device.name),
                }
                PollOutcome::Success(normalized.metric)
            }
            Err(e) => {
                warn!("Failed to parse status for {}: {}", device.name, e);
                PollOutcome::MalformedResponse
            }
        }
    }

    /// Release the storage sink.
    pub async fn close(&self) {
        self.sink.close().await;
    }

    /// Run a single cycle and release the sink, also when shutdown cut the
    /// cycle short.
    pub async fn run_once(mut self) -> CycleReport {
        let report = self.run_cycle().await;
        self.close().await;
        report
    }
}

impl<F, S> Poller<F, S>
where
    F: StatusSource + Send + Sync + 'static,
    S: PointSink + Send + Sync + 'static,
{
    /// Turn the poller into a stream of cycle reports, one cycle per `every`.
    ///
    /// The first cycle starts immediately. The next tick is awaited only after
    /// a cycle finishes, and ticks missed meanwhile are skipped, so cycles
    /// never overlap or queue up. The stream ends after shutdown is observed,
    /// closing the sink on the way out.
    ///
    /// Fails when `every` is zero.
    pub fn into_stream(self, every: Duration) -> Result<BoxStream<'static, CycleReport>> {
        if every.is_zero() {
            return Err(ShellyError::config_error("Poll interval must be greater than zero"));
        }

        let mut ticker = time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let stream = stream::unfold(
            (self, ticker),
            |(mut poller, mut ticker)| async move {
                if !wait_for_tick(&mut ticker, poller.shutdown.as_mut()).await {
                    poller.close().await;
                    return None;
                }
                let report = poller.run_cycle().await;
                Some((report, (poller, ticker)))
            },
        );

        Ok(Box::pin(stream))
    }
}

/// Returns false when shutdown was requested instead.
async fn wait_for_tick(ticker: &mut Interval, shutdown: Option<&mut watch::Receiver<bool>>) -> bool {
    let Some(shutdown) = shutdown else {
        ticker.tick().await;
        return true;
    };

    if *shutdown.borrow() {
        return false;
    }

    tokio::select! {
        _ = ticker.tick() => !*shutdown.borrow(),
        changed = shutdown.changed() => changed.is_ok() && !*shutdown.borrow(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_rate_limiter_spacing() {
        let mut limiter = RateLimiter::new(Duration::from_millis(1100));
        let start = Instant::now();

        limiter.until_ready().await;
        assert_eq!(start.elapsed(), Duration::ZERO);

        limiter.until_ready().await;
        assert!(start.elapsed() >= Duration::from_millis(1100));

        time::sleep(Duration::from_secs(5)).await;
        let before = Instant::now();
        limiter.until_ready().await;
        assert_eq!(before.elapsed(), Duration::ZERO, "no wait once spacing has passed");
    }

    #[test]
    fn test_cycle_report_display() {
        let mut report = CycleReport::new(Utc::now(), 3);
        report.record(&PollOutcome::Unreachable);
        report.record(&PollOutcome::MalformedResponse);
        report.elapsed_ms = 2300;
        report.interrupted = true;

        let text = report.to_string();
        assert!(text.starts_with("2/3 devices polled in 2.3s"));
        assert!(text.contains("1 unreachable"));
        assert!(text.ends_with("(interrupted)"));
    }

    struct NoSource;

    impl StatusSource for NoSource {
        async fn fetch_status(&self, device_id: &str) -> std::result::Result<crate::metrics::RawStatus, crate::error::FetchError> {
            Err(crate::error::FetchError::unreachable(device_id))
        }
    }

    struct NoSink;

    impl PointSink for NoSink {
        async fn write(&self, _bucket: &str, _point: &crate::metrics::MetricPoint) -> std::result::Result<(), crate::error::StorageError> {
            Ok(())
        }

        async fn close(&self) {}
    }

    #[test]
    fn test_zero_interval_is_rejected() {
        let device = DeviceDescriptor {
            id: "a".into(),
            name: "a".into(),
            device_type: "unknown".into(),
            channel: 0,
            bucket: "b".into(),
        };
        let poller = Poller::new(NoSource, NoSink, vec![device]).unwrap();
        assert!(matches!(
            poller.into_stream(Duration::ZERO),
            Err(ShellyError::Config(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_tick_observes_shutdown() {
        let mut ticker = time::interval(Duration::from_secs(60));
        let (tx, mut rx) = watch::channel(false);

        assert!(wait_for_tick(&mut ticker, Some(&mut rx)).await, "first tick is immediate");

        tx.send(true).unwrap();
        assert!(!wait_for_tick(&mut ticker, Some(&mut rx)).await);
    }
}
