//! The atomic settlement boundary.
//!
//! The only component permitted to mutate persisted state. Both the batch
//! run and the manual gate converge here, so exactly one code path can
//! ever create a payment and flip transaction/invoice status.

use crate::error::MatchError;
use crate::models::{MatchSource, Payment};
use crate::services::metrics;
use crate::store::{MatchStore, SettleRequest};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

pub struct MatchExecutor {
    store: Arc<dyn MatchStore>,
}

impl MatchExecutor {
    pub fn new(store: Arc<dyn MatchStore>) -> Self {
        Self { store }
    }

    /// Settle a transaction against an invoice.
    ///
    /// Preconditions are re-validated inside the store under a lock on the
    /// transaction row, so two concurrent attempts (one automatic, one
    /// manual) can never both create a payment: the loser gets
    /// `AlreadyMatched`. `Storage` failures are safe to retry wholesale —
    /// the re-check runs again on every attempt.
    pub async fn execute(
        &self,
        tenant_id: Uuid,
        transaction_id: Uuid,
        invoice_id: Uuid,
        confidence: f64,
        source: MatchSource,
        matched_by: &str,
    ) -> Result<Payment, MatchError> {
        if !confidence.is_finite() || !(0.0..=100.0).contains(&confidence) {
            return Err(MatchError::Validation(format!(
                "confidence must be within 0..=100, got {}",
                confidence
            )));
        }

        let request = SettleRequest {
            tenant_id,
            transaction_id,
            invoice_id,
            confidence,
            source,
            matched_by: matched_by.to_string(),
        };

        match self.store.settle(&request).await {
            Ok(payment) => {
                metrics::record_transaction_match(source.as_str());
                info!(
                    tenant_id = %tenant_id,
                    transaction_id = %transaction_id,
                    invoice_id = %invoice_id,
                    payment_id = %payment.payment_id,
                    payment_number = %payment.payment_number,
                    amount_minor = payment.amount_minor,
                    confidence = confidence,
                    source = source.as_str(),
                    "transaction settled against invoice"
                );
                Ok(payment)
            }
            Err(err) => {
                metrics::record_error(err.kind());
                warn!(
                    tenant_id = %tenant_id,
                    transaction_id = %transaction_id,
                    invoice_id = %invoice_id,
                    error = %err,
                    "settlement failed"
                );
                Err(err)
            }
        }
    }
}
