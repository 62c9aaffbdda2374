//! Prometheus metrics for the fxshadow engine.
//!
//! # Panics
//!
//! Registration unwraps on first access. It fails only on a duplicate metric
//! name, which is a programming error.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, register_int_gauge_vec, CounterVec, Encoder,
    HistogramVec, IntGaugeVec, TextEncoder,
};

use crate::error::{TelemetryError, TelemetryResult};

/// Orders sent to the broker, by outcome (linked/unlinked/rejected/no_quote/no_response).
pub static ORDERS_SUBMITTED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "fxshadow_orders_submitted_total",
        "Total order submissions by outcome",
        &["account", "outcome"]
    )
    .unwrap()
});

/// Confirmed position closes, by reason.
pub static POSITIONS_CLOSED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "fxshadow_positions_closed_total",
        "Total confirmed position closes by reason",
        &["account", "reason"]
    )
    .unwrap()
});

/// Closes that exhausted their retry budget.
pub static CLOSE_FAILURES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "fxshadow_close_failures_total",
        "Total position closes that were not confirmed",
        &["account"]
    )
    .unwrap()
});

/// Symbols banned for negative swap.
pub static SWAP_BANS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "fxshadow_swap_bans_total",
        "Total symbols banned for negative swap",
        &["account"]
    )
    .unwrap()
});

/// Lost broker connections surfaced by the engine.
pub static CONNECTION_LOST_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "fxshadow_connection_lost_total",
        "Total broker connection losses",
        &["account"]
    )
    .unwrap()
});

/// Full cycle duration in milliseconds.
pub static CYCLE_DURATION_MS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "fxshadow_cycle_duration_ms",
        "Lifecycle cycle duration in milliseconds",
        &["account"],
        vec![10.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0]
    )
    .unwrap()
});

/// Orders held per collection.
/// Labels: state (open/pending/delayed)
pub static BOOK_ORDERS: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        "fxshadow_book_orders",
        "Orders held in each collection",
        &["account", "state"]
    )
    .unwrap()
});

/// Metrics facade for easy access.
pub struct Metrics;

impl Metrics {
    /// Record an order submission outcome.
    pub fn order_submitted(account: &str, outcome: &str) {
        ORDERS_SUBMITTED_TOTAL
            .with_label_values(&[account, outcome])
            .inc();
    }

    /// Record a confirmed close.
    pub fn position_closed(account: &str, reason: &str) {
        POSITIONS_CLOSED_TOTAL
            .with_label_values(&[account, reason])
            .inc();
    }

    /// Record an unconfirmed close.
    pub fn close_failed(account: &str) {
        CLOSE_FAILURES_TOTAL.with_label_values(&[account]).inc();
    }

    /// Record a swap ban.
    pub fn swap_banned(account: &str) {
        SWAP_BANS_TOTAL.with_label_values(&[account]).inc();
    }

    /// Record a lost connection.
    pub fn connection_lost(account: &str) {
        CONNECTION_LOST_TOTAL.with_label_values(&[account]).inc();
    }

    /// Record cycle duration.
    pub fn cycle_duration(account: &str, duration_ms: f64) {
        CYCLE_DURATION_MS
            .with_label_values(&[account])
            .observe(duration_ms);
    }

    /// Set collection sizes.
    pub fn book_sizes(account: &str, open: usize, pending: usize, delayed: usize) {
        for (state, count) in [("open", open), ("pending", pending), ("delayed", delayed)] {
            BOOK_ORDERS
                .with_label_values(&[account, state])
                .set(count as i64);
        }
    }

    /// Render all registered metrics in the Prometheus text format.
    pub fn render() -> TelemetryResult<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&prometheus::gather(), &mut buffer)
            .map_err(|e| TelemetryError::Metrics(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| TelemetryError::Metrics(e.to_string()))
    }
}
