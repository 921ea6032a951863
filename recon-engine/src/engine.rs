//! Caller-facing facade over the reconciliation components.
//!
//! Embedding applications construct one `ReconciliationEngine` per storage
//! backend and call it in-process; tenant scope is an explicit parameter on
//! every operation, never ambient state.

use crate::batch::BatchReconciler;
use crate::error::MatchError;
use crate::gate::ManualMatchGate;
use crate::matching::Decision;
use crate::models::{
    Invoice, MatchRunReport, MatchStats, Payment, TransactionWithSuggestion,
};
use crate::policy::MatchPolicy;
use crate::store::MatchStore;
use std::str::FromStr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::instrument;
use uuid::Uuid;

pub struct ReconciliationEngine {
    store: Arc<dyn MatchStore>,
    reconciler: BatchReconciler,
    gate: ManualMatchGate,
}

impl ReconciliationEngine {
    pub fn new(store: Arc<dyn MatchStore>) -> Self {
        let reconciler = BatchReconciler::new(store.clone());
        let gate = ManualMatchGate::new(store.clone());
        Self {
            store,
            reconciler,
            gate,
        }
    }

    /// Read-only preview: a page of unprocessed deposits, each with its
    /// best candidate when one clears the suggestion threshold.
    ///
    /// A candidate good enough for auto-acceptance still shows as a
    /// suggestion here — nothing on this path mutates state, and the page
    /// may be stale by the time an operator acts on it; the settle path
    /// re-validates.
    #[instrument(skip(self, policy), fields(tenant_id = %tenant_id))]
    pub async fn list_unmatched_with_suggestions(
        &self,
        tenant_id: Uuid,
        policy: &MatchPolicy,
        page_size: i32,
        page_token: Option<&str>,
    ) -> Result<(Vec<TransactionWithSuggestion>, Option<String>), MatchError> {
        policy.validate()?;
        let cursor = parse_page_token(page_token)?;

        let (transactions, next) = self
            .store
            .page_unprocessed_deposits(tenant_id, page_size, cursor)
            .await?;

        let mut rows = Vec::with_capacity(transactions.len());
        for transaction in transactions {
            let suggestion = match self
                .reconciler
                .reconcile_one(&transaction, policy, None)
                .await?
            {
                Decision::AutoMatch(candidate) | Decision::Suggest(candidate) => Some(candidate),
                Decision::NoMatch => None,
            };
            rows.push(TransactionWithSuggestion {
                transaction,
                suggestion,
            });
        }

        Ok((rows, next.map(|id| id.to_string())))
    }

    /// Run auto-matching over the tenant's unprocessed backlog.
    pub async fn run_auto_match(
        &self,
        tenant_id: Uuid,
        policy: &MatchPolicy,
        cancel: &CancellationToken,
    ) -> Result<MatchRunReport, MatchError> {
        self.reconciler.run(tenant_id, policy, cancel).await
    }

    /// Operator-confirmed match; confidence is fixed at 100.
    pub async fn manual_match(
        &self,
        tenant_id: Uuid,
        transaction_id: Uuid,
        invoice_id: Uuid,
        operator: &str,
    ) -> Result<Payment, MatchError> {
        self.gate
            .manual_match(tenant_id, transaction_id, invoice_id, operator)
            .await
    }

    /// Tenant matching statistics over money-in transactions.
    pub async fn stats(&self, tenant_id: Uuid) -> Result<MatchStats, MatchError> {
        self.store.stats(tenant_id).await
    }

    /// Open invoices for the manual-match picker, due-date ascending.
    pub async fn list_eligible_invoices(
        &self,
        tenant_id: Uuid,
    ) -> Result<Vec<Invoice>, MatchError> {
        self.store.list_eligible_invoices(tenant_id).await
    }
}

fn parse_page_token(token: Option<&str>) -> Result<Option<Uuid>, MatchError> {
    token
        .map(|t| {
            Uuid::from_str(t)
                .map_err(|_| MatchError::Validation(format!("invalid page_token '{}'", t)))
        })
        .transpose()
}
