//! Metrics for the Christy Cares backend
//!
//! Emitted through the `metrics` facade; a recorder is installed by whoever
//! embeds these crates.

use metrics::{counter, histogram};
use std::time::{Duration, Instant};

/// Metric names as constants for consistency
pub mod names {
    // Provisioner metrics
    pub const PROVISION_RESOURCES_TOTAL: &str = "cares_provision_resources_total";
    pub const PROVISION_RUN_DURATION: &str = "cares_provision_run_duration_seconds";

    // Remote store metrics
    pub const REMOTE_CALLS_TOTAL: &str = "cares_remote_calls_total";
    pub const REMOTE_CALL_LATENCY: &str = "cares_remote_call_latency_seconds";

    // Gateway metrics
    pub const GATEWAY_REQUESTS_TOTAL: &str = "cares_gateway_requests_total";
    pub const GATEWAY_EMAILS_TOTAL: &str = "cares_gateway_emails_total";
}

/// Labels for metrics
pub mod labels {
    pub const KIND: &str = "kind";
    pub const OUTCOME: &str = "outcome";
    pub const OPERATION: &str = "operation";
    pub const ROUTE: &str = "route";
    pub const STATUS: &str = "status";
}

/// Provisioner metrics
#[derive(Clone, Default)]
pub struct ProvisionMetrics;

impl ProvisionMetrics {
    pub fn new() -> Self {
        Self
    }

    /// Record one resource outcome
    pub fn record_resource(&self, kind: &str, outcome: &str) {
        counter!(
            names::PROVISION_RESOURCES_TOTAL,
            labels::KIND => kind.to_string(),
            labels::OUTCOME => outcome.to_string(),
        )
        .increment(1);
    }

    /// Record total run duration
    pub fn record_run_duration(&self, duration: Duration) {
        histogram!(names::PROVISION_RUN_DURATION).record(duration.as_secs_f64());
    }
}

/// Remote store client metrics
#[derive(Clone, Default)]
pub struct RemoteMetrics;

impl RemoteMetrics {
    pub fn new() -> Self {
        Self
    }

    /// Record a finished call
    pub fn record_call(&self, operation: &'static str, status: u16, duration: Duration) {
        counter!(
            names::REMOTE_CALLS_TOTAL,
            labels::OPERATION => operation,
            labels::STATUS => status.to_string(),
        )
        .increment(1);
        histogram!(
            names::REMOTE_CALL_LATENCY,
            labels::OPERATION => operation,
        )
        .record(duration.as_secs_f64());
    }
}

/// Gateway metrics
#[derive(Clone, Default)]
pub struct GatewayMetrics;

impl GatewayMetrics {
    pub fn new() -> Self {
        Self
    }

    /// Record an answered request
    pub fn record_request(&self, route: &'static str, status: u16) {
        counter!(
            names::GATEWAY_REQUESTS_TOTAL,
            labels::ROUTE => route,
            labels::STATUS => status.to_string(),
        )
        .increment(1);
    }

    /// Record an email dispatch attempt
    pub fn record_email(&self, outcome: &'static str) {
        counter!(
            names::GATEWAY_EMAILS_TOTAL,
            labels::OUTCOME => outcome,
        )
        .increment(1);
    }
}

/// Timer guard for automatic latency recording
pub struct LatencyTimer<F>
where
    F: FnOnce(Duration),
{
    start: Instant,
    on_drop: Option<F>,
}

impl<F> LatencyTimer<F>
where
    F: FnOnce(Duration),
{
    /// Start a new timer
    pub fn start(on_drop: F) -> Self {
        Self {
            start: Instant::now(),
            on_drop: Some(on_drop),
        }
    }

    /// Get elapsed time without stopping
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Stop timer and record
    pub fn stop(mut self) -> Duration {
        let elapsed = self.start.elapsed();
        if let Some(f) = self.on_drop.take() {
            f(elapsed);
        }
        elapsed
    }
}

impl<F> Drop for LatencyTimer<F>
where
    F: FnOnce(Duration),
{
    fn drop(&mut self) {
        if let Some(f) = self.on_drop.take() {
            f(self.start.elapsed());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latency_timer_records_once() {
        let mut recorded = Vec::new();
        {
            let timer = LatencyTimer::start(|d| recorded.push(d));
            std::thread::sleep(Duration::from_millis(5));
            timer.stop();
        }
        assert_eq!(recorded.len(), 1);
        assert!(recorded[0] >= Duration::from_millis(5));
    }
}
