//! Error taxonomy for reconciliation operations.

use thiserror::Error;
use uuid::Uuid;

/// Failures surfaced by the matching and settlement paths.
///
/// `AlreadyMatched` and `InvoiceNotEligible` are terminal for the attempted
/// pair: the caller should refresh its view and re-decide rather than retry
/// blindly. `Storage` is transient; retrying the whole operation is safe
/// because every settlement re-checks its preconditions under the row lock.
/// Ambiguity is never an error here — it comes back as a selector decision.
#[derive(Debug, Error)]
pub enum MatchError {
    #[error("invalid match policy: {0}")]
    Validation(String),

    #[error("transaction {transaction_id} already matched to invoice {invoice_id}")]
    AlreadyMatched {
        transaction_id: Uuid,
        invoice_id: Uuid,
    },

    #[error("invoice {invoice_id} not eligible: {reason}")]
    InvoiceNotEligible { invoice_id: Uuid, reason: String },

    #[error("transaction {0} not found")]
    TransactionNotFound(Uuid),

    #[error("invoice {0} not found")]
    InvoiceNotFound(Uuid),

    #[error("storage failure: {0}")]
    Storage(#[source] anyhow::Error),
}

impl MatchError {
    /// Stable label for metrics and run reports.
    pub fn kind(&self) -> &'static str {
        match self {
            MatchError::Validation(_) => "validation",
            MatchError::AlreadyMatched { .. } => "already_matched",
            MatchError::InvoiceNotEligible { .. } => "invoice_not_eligible",
            MatchError::TransactionNotFound(_) => "transaction_not_found",
            MatchError::InvoiceNotFound(_) => "invoice_not_found",
            MatchError::Storage(_) => "storage",
        }
    }

    /// Whether retrying the same call can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, MatchError::Storage(_))
    }
}

impl From<sqlx::Error> for MatchError {
    fn from(err: sqlx::Error) -> Self {
        MatchError::Storage(anyhow::Error::new(err))
    }
}
