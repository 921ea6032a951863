//! recon-core: Shared infrastructure for the reconciliation engine workspace.
pub mod config;
pub mod error;
pub mod observability;

pub use serde;
pub use tracing;
