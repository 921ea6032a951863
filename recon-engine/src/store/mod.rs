//! Storage abstraction for the reconciliation engine.
//!
//! Readers never block writers; all mutation funnels through [`MatchStore::settle`],
//! which re-validates preconditions under a lock on the transaction row
//! (and the invoice row where the backend supports it). Any caller acting
//! on a stale read gets `AlreadyMatched` from the settle path instead of a
//! double-booked payment.

pub mod memory;
pub mod postgres;

use crate::error::MatchError;
use crate::models::{
    BankTransaction, Invoice, MatchSource, MatchStats, Payment,
};
use crate::rules::MatchingRule;
use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

pub use memory::InMemoryMatchStore;
pub use postgres::PgMatchStore;

/// One settlement attempt, fully specified by ids plus audit fields.
#[derive(Debug, Clone)]
pub struct SettleRequest {
    pub tenant_id: Uuid,
    pub transaction_id: Uuid,
    pub invoice_id: Uuid,
    pub confidence: f64,
    pub source: MatchSource,
    /// Operator name for manual matches, `"auto"` for batch runs.
    pub matched_by: String,
}

#[async_trait]
pub trait MatchStore: Send + Sync {
    async fn get_transaction(
        &self,
        tenant_id: Uuid,
        transaction_id: Uuid,
    ) -> Result<Option<BankTransaction>, MatchError>;

    async fn get_invoice(
        &self,
        tenant_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<Option<Invoice>, MatchError>;

    /// Full unprocessed money-in backlog for a tenant, transaction-date
    /// ascending so older debts settle first.
    async fn list_unprocessed_deposits(
        &self,
        tenant_id: Uuid,
    ) -> Result<Vec<BankTransaction>, MatchError>;

    /// Keyset page of the unprocessed money-in backlog for preview listings.
    async fn page_unprocessed_deposits(
        &self,
        tenant_id: Uuid,
        page_size: i32,
        page_token: Option<Uuid>,
    ) -> Result<(Vec<BankTransaction>, Option<Uuid>), MatchError>;

    /// Plausible settlement targets: same tenant and currency, `sent` with
    /// a positive due amount, issued on or before the transaction date and
    /// no more than `lookback_days` before it. Completeness within the
    /// filter is guaranteed; ordering is not — the caller re-ranks.
    async fn find_candidate_invoices(
        &self,
        tenant_id: Uuid,
        currency: &str,
        transaction_date: NaiveDate,
        lookback_days: u32,
    ) -> Result<Vec<Invoice>, MatchError>;

    /// All open `sent` invoices for a tenant, due-date ascending (manual
    /// match picker).
    async fn list_eligible_invoices(&self, tenant_id: Uuid) -> Result<Vec<Invoice>, MatchError>;

    /// Active matching rules for a tenant, priority ascending.
    async fn list_active_rules(&self, tenant_id: Uuid) -> Result<Vec<MatchingRule>, MatchError>;

    /// Atomically settle a transaction against an invoice: allocate the
    /// next payment number, create the payment, decrement the invoice due
    /// amount (flipping to `paid` at zero), and mark the transaction
    /// processed. All-or-nothing; loser of a concurrent settle gets
    /// `AlreadyMatched`.
    async fn settle(&self, request: &SettleRequest) -> Result<Payment, MatchError>;

    /// Tenant matching statistics over money-in transactions.
    async fn stats(&self, tenant_id: Uuid) -> Result<MatchStats, MatchError>;
}
