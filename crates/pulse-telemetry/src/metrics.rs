//! Prometheus metrics for pulse streams.
//!
//! Covers:
//! - Connectivity status per endpoint
//! - Reconnection attempts
//! - Accepted updates by source, dropped payloads, stale poll results
//! - Fallback fetch outcomes
//!
//! # Panics
//!
//! Metric registration uses `unwrap()` intentionally. If registration fails,
//! it indicates a fatal configuration error (e.g., duplicate metric names)
//! that should cause an immediate crash at startup rather than silent failure.
//! These panics only occur during static initialization, never at runtime.

use crate::error::{TelemetryError, TelemetryResult};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge_vec, register_int_gauge_vec, CounterVec, Encoder,
    GaugeVec, IntGaugeVec, TextEncoder,
};

/// Status labels, in the order they are reported.
pub const STATUS_LABELS: [&str; 4] = ["connected", "connecting", "polling", "offline-error"];

/// Stream status (1 = active, 0 = inactive).
/// Labels: endpoint, status (connected/connecting/polling/offline-error)
pub static STREAM_STATUS: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "pulse_stream_status",
        "Stream connectivity status (1=active, 0=inactive)",
        &["endpoint", "status"]
    )
    .unwrap()
});

/// Retry attempts consumed since the last successful connection.
pub static RECONNECT_ATTEMPTS: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        "pulse_reconnect_attempts",
        "Reconnection attempts since the last successful connection",
        &["endpoint"]
    )
    .unwrap()
});

/// Accepted updates.
/// Labels: endpoint, source (transport/fallback)
pub static UPDATES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "pulse_updates_total",
        "Total accepted stream updates",
        &["endpoint", "source"]
    )
    .unwrap()
});

/// Payloads dropped because they did not match the expected shape.
pub static MALFORMED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "pulse_malformed_payloads_total",
        "Total malformed payloads dropped",
        &["endpoint"]
    )
    .unwrap()
});

/// Transport errors reported by connections.
pub static TRANSPORT_ERRORS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "pulse_transport_errors_total",
        "Total transport connection errors",
        &["endpoint"]
    )
    .unwrap()
});

/// Fallback fetches.
/// Labels: endpoint, outcome (ok/error)
pub static FALLBACK_FETCHES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "pulse_fallback_fetches_total",
        "Total fallback fetches by outcome",
        &["endpoint", "outcome"]
    )
    .unwrap()
});

/// Poll results discarded because a newer update was already applied.
pub static STALE_DISCARDED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "pulse_stale_results_discarded_total",
        "Total fallback results discarded as stale",
        &["endpoint"]
    )
    .unwrap()
});

/// Seconds since the last accepted update.
pub static UPDATE_AGE_SECONDS: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "pulse_update_age_seconds",
        "Seconds since the last accepted update",
        &["endpoint"]
    )
    .unwrap()
});

/// Metrics facade for easy access.
pub struct Metrics;

impl Metrics {
    /// Set the active status. Only the active status is 1, all others 0.
    pub fn status_set(endpoint: &str, status: &str) {
        for s in STATUS_LABELS {
            STREAM_STATUS.with_label_values(&[endpoint, s]).set(0.0);
        }
        STREAM_STATUS.with_label_values(&[endpoint, status]).set(1.0);
    }

    pub fn reconnect_attempts(endpoint: &str, attempt: u32) {
        RECONNECT_ATTEMPTS
            .with_label_values(&[endpoint])
            .set(i64::from(attempt));
    }

    /// Record `count` accepted updates from `source`.
    pub fn updates(endpoint: &str, source: &str, count: u64) {
        if count > 0 {
            UPDATES_TOTAL
                .with_label_values(&[endpoint, source])
                .inc_by(count as f64);
        }
    }

    pub fn malformed(endpoint: &str, count: u64) {
        if count > 0 {
            MALFORMED_TOTAL
                .with_label_values(&[endpoint])
                .inc_by(count as f64);
        }
    }

    pub fn transport_errors(endpoint: &str, count: u64) {
        if count > 0 {
            TRANSPORT_ERRORS_TOTAL
                .with_label_values(&[endpoint])
                .inc_by(count as f64);
        }
    }

    /// Record fallback fetches; `outcome` is `ok` or `error`.
    pub fn fallback_fetches(endpoint: &str, outcome: &str, count: u64) {
        if count > 0 {
            FALLBACK_FETCHES_TOTAL
                .with_label_values(&[endpoint, outcome])
                .inc_by(count as f64);
        }
    }

    pub fn stale_discarded(endpoint: &str, count: u64) {
        if count > 0 {
            STALE_DISCARDED_TOTAL
                .with_label_values(&[endpoint])
                .inc_by(count as f64);
        }
    }

    pub fn update_age(endpoint: &str, age_secs: f64) {
        UPDATE_AGE_SECONDS
            .with_label_values(&[endpoint])
            .set(age_secs);
    }

    /// Render every registered metric in the Prometheus text format.
    pub fn gather_text() -> TelemetryResult<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&prometheus::gather(), &mut buffer)
            .map_err(|e| TelemetryError::Metrics(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| TelemetryError::Metrics(e.to_string()))
    }
}
