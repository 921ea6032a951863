//! Candidate lookup: which invoices could plausibly be settled by a
//! given transaction.

use crate::error::MatchError;
use crate::models::{BankTransaction, Invoice};
use crate::policy::MatchPolicy;
use crate::store::MatchStore;
use std::sync::Arc;
use tracing::debug;

/// Pure read path. Guarantees completeness within the filter, not ranking;
/// the selector re-ranks whatever comes back.
pub struct CandidateFinder {
    store: Arc<dyn MatchStore>,
}

impl CandidateFinder {
    pub fn new(store: Arc<dyn MatchStore>) -> Self {
        Self { store }
    }

    /// Find plausible settlement targets for a deposit.
    ///
    /// Outgoing transactions never have candidates: only money-in lines
    /// settle receivables. The lookback window bounds the transaction date
    /// from the invoice issue date, tolerating early or on-time payment.
    pub async fn find(
        &self,
        transaction: &BankTransaction,
        policy: &MatchPolicy,
    ) -> Result<Vec<Invoice>, MatchError> {
        if !transaction.is_deposit() {
            return Ok(Vec::new());
        }

        let invoices = self
            .store
            .find_candidate_invoices(
                transaction.tenant_id,
                &transaction.currency,
                transaction.transaction_date,
                policy.lookback_days,
            )
            .await?;

        // The storage query already scopes by tenant and status; re-filter
        // here so a misbehaving backend can never leak a cross-tenant or
        // closed invoice into scoring.
        let candidates: Vec<Invoice> = invoices
            .into_iter()
            .filter(|invoice| invoice.tenant_id == transaction.tenant_id && invoice.is_open())
            .collect();

        debug!(
            transaction_id = %transaction.transaction_id,
            candidate_count = candidates.len(),
            "candidate lookup complete"
        );

        Ok(candidates)
    }
}
