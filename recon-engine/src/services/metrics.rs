//! Prometheus metrics for the reconciliation engine.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};

/// Histogram for storage query duration by operation.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "recon_db_query_duration_seconds",
        "Storage query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]
    )
    .expect("Failed to register DB_QUERY_DURATION")
});

/// Counter for settled transaction matches by source.
pub static TRANSACTION_MATCHES: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "recon_transaction_matches_total",
        "Total number of settled transaction matches",
        &["source"]
    )
    .expect("Failed to register TRANSACTION_MATCHES")
});

/// Counter for batch reconciliation runs.
pub static MATCH_RUNS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "recon_match_runs_total",
        "Total number of batch reconciliation runs",
        &["status"]
    )
    .expect("Failed to register MATCH_RUNS")
});

/// Counter for errors by kind.
pub static ERRORS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "recon_errors_total",
        "Total number of reconciliation errors",
        &["error_type"]
    )
    .expect("Failed to register ERRORS")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&DB_QUERY_DURATION);
    Lazy::force(&TRANSACTION_MATCHES);
    Lazy::force(&MATCH_RUNS);
    Lazy::force(&ERRORS);
}

/// Get all metrics in Prometheus text format, for an embedding process
/// that exposes a scrape endpoint.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap_or_default();
    String::from_utf8(buffer).unwrap_or_default()
}

/// Record a settled match.
pub fn record_transaction_match(source: &str) {
    TRANSACTION_MATCHES.with_label_values(&[source]).inc();
}

/// Record a completed batch run.
pub fn record_match_run(status: &str) {
    MATCH_RUNS.with_label_values(&[status]).inc();
}

/// Record an error.
pub fn record_error(error_type: &str) {
    ERRORS.with_label_values(&[error_type]).inc();
}
