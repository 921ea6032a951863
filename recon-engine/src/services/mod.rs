//! Service-level helpers for the reconciliation engine.

pub mod metrics;

pub use metrics::init_metrics;
