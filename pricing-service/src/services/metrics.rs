//! Metrics module for pricing-service.
//! Provides Prometheus metrics for plan sync, remote calls and cost finalization.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::Lazy;
use prometheus::{
    histogram_opts, opts, register_histogram_vec, register_int_counter_vec, Encoder, HistogramVec,
    IntCounterVec, TextEncoder,
};
use std::sync::OnceLock;

/// Database query duration histogram
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        histogram_opts!(
            "pricing_db_query_duration_seconds",
            "Database query duration"
        ),
        &["operation"]
    )
    .expect("Failed to register DB_QUERY_DURATION")
});

/// Recorder for the `metrics` facade (HTTP middleware counters)
pub static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Remote billing requests by operation and outcome
pub static REMOTE_REQUESTS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Remote billing retries by operation
pub static REMOTE_RETRIES_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Usage events submitted, by outcome
pub static USAGE_EVENTS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Call costs finalized, by currency
pub static COST_FINALIZED_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Plans processed by sync, by outcome
pub static PLAN_SYNC_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Plan assignments, by history action
pub static PLAN_ASSIGNMENTS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Initialize all metrics. Call once at startup.
pub fn init_metrics() {
    if METRICS_HANDLE.get().is_none() {
        match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => {
                let _ = METRICS_HANDLE.set(handle);
            }
            Err(e) => tracing::warn!(error = %e, "Prometheus recorder already installed"),
        }
    }

    REMOTE_REQUESTS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "pricing_remote_requests_total",
                "Remote billing requests by operation and outcome"
            ),
            &["operation", "outcome"]
        )
        .expect("Failed to register REMOTE_REQUESTS_TOTAL")
    });

    REMOTE_RETRIES_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "pricing_remote_retries_total",
                "Remote billing retry attempts by operation"
            ),
            &["operation"]
        )
        .expect("Failed to register REMOTE_RETRIES_TOTAL")
    });

    USAGE_EVENTS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!("pricing_usage_events_total", "Usage events submitted by outcome"),
            &["outcome"]
        )
        .expect("Failed to register USAGE_EVENTS_TOTAL")
    });

    COST_FINALIZED_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!("pricing_cost_finalized_total", "Call costs finalized by currency"),
            &["currency"]
        )
        .expect("Failed to register COST_FINALIZED_TOTAL")
    });

    PLAN_SYNC_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!("pricing_plan_sync_total", "Plans processed by sync, by outcome"),
            &["outcome"]
        )
        .expect("Failed to register PLAN_SYNC_TOTAL")
    });

    PLAN_ASSIGNMENTS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "pricing_plan_assignments_total",
                "Agent plan assignments by history action"
            ),
            &["action"]
        )
        .expect("Failed to register PLAN_ASSIGNMENTS_TOTAL")
    });

    // Force initialization of lazy statics
    let _ = &*DB_QUERY_DURATION;
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    let mut output = String::from_utf8(buffer).unwrap_or_default();
    if let Some(handle) = METRICS_HANDLE.get() {
        output.push_str(&handle.render());
    }
    output
}

pub fn record_remote_request(operation: &str, outcome: &str) {
    if let Some(counter) = REMOTE_REQUESTS_TOTAL.get() {
        counter.with_label_values(&[operation, outcome]).inc();
    }
}

pub fn record_remote_retry(operation: &str) {
    if let Some(counter) = REMOTE_RETRIES_TOTAL.get() {
        counter.with_label_values(&[operation]).inc();
    }
}

pub fn record_usage_event(outcome: &str) {
    if let Some(counter) = USAGE_EVENTS_TOTAL.get() {
        counter.with_label_values(&[outcome]).inc();
    }
}

pub fn record_cost_finalized(currency: &str) {
    if let Some(counter) = COST_FINALIZED_TOTAL.get() {
        counter.with_label_values(&[currency]).inc();
    }
}

pub fn record_plan_sync(outcome: &str) {
    if let Some(counter) = PLAN_SYNC_TOTAL.get() {
        counter.with_label_values(&[outcome]).inc();
    }
}

pub fn record_plan_assignment(action: &str) {
    if let Some(counter) = PLAN_ASSIGNMENTS_TOTAL.get() {
        counter.with_label_values(&[action]).inc();
    }
}
