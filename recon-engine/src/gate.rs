//! Manual match entry point.
//!
//! Same invariants, same executor as the automatic path; what differs is
//! the caller population (human operators acting on a suggestion) and the
//! audit trail of who matched what.

use crate::error::MatchError;
use crate::executor::MatchExecutor;
use crate::models::{MatchSource, Payment, ProcessingStatus};
use crate::store::MatchStore;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Confidence recorded for operator-confirmed matches.
const MANUAL_CONFIDENCE: f64 = 100.0;

pub struct ManualMatchGate {
    store: Arc<dyn MatchStore>,
    executor: MatchExecutor,
}

impl ManualMatchGate {
    pub fn new(store: Arc<dyn MatchStore>) -> Self {
        let executor = MatchExecutor::new(store.clone());
        Self { store, executor }
    }

    /// Match an operator-specified (transaction, invoice) pair.
    ///
    /// Lookups here give the operator a precise reason when the pair does
    /// not exist; eligibility itself is still decided by the executor's
    /// locked precondition re-check, so a suggestion gone stale surfaces as
    /// `AlreadyMatched` rather than a duplicate payment.
    pub async fn manual_match(
        &self,
        tenant_id: Uuid,
        transaction_id: Uuid,
        invoice_id: Uuid,
        operator: &str,
    ) -> Result<Payment, MatchError> {
        let transaction = self
            .store
            .get_transaction(tenant_id, transaction_id)
            .await?
            .ok_or(MatchError::TransactionNotFound(transaction_id))?;

        self.store
            .get_invoice(tenant_id, invoice_id)
            .await?
            .ok_or(MatchError::InvoiceNotFound(invoice_id))?;

        // Fail early with the actionable message a human can act on; the
        // executor re-checks this under its lock regardless.
        if transaction.processing_status() == ProcessingStatus::Processed {
            return Err(MatchError::AlreadyMatched {
                transaction_id,
                invoice_id: transaction.matched_invoice_id.unwrap_or(invoice_id),
            });
        }

        info!(
            tenant_id = %tenant_id,
            transaction_id = %transaction_id,
            invoice_id = %invoice_id,
            operator = operator,
            "manual match requested"
        );

        self.executor
            .execute(
                tenant_id,
                transaction_id,
                invoice_id,
                MANUAL_CONFIDENCE,
                MatchSource::Manual,
                operator,
            )
            .await
    }
}
