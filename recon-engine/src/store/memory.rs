//! In-memory storage backend.
//!
//! Runs the same settlement plan as the PostgreSQL backend behind a store
//! mutex, so the engine's invariants hold identically. Used by the
//! integration tests and by embedders that want a hermetic engine.

use crate::error::MatchError;
use crate::models::{
    BankTransaction, Invoice, InvoiceStatus, MatchStats, Payment, ProcessingStatus,
    GATEWAY_BANK_TRANSFER,
};
use crate::rules::MatchingRule;
use crate::settlement::{payment_notes, payment_number, SettlementPlan};
use crate::store::{MatchStore, SettleRequest};
use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tracing::warn;
use uuid::Uuid;

#[derive(Default)]
struct State {
    transactions: HashMap<Uuid, BankTransaction>,
    invoices: HashMap<Uuid, Invoice>,
    payments: HashMap<Uuid, Payment>,
    rules: Vec<MatchingRule>,
    payment_counters: HashMap<(Uuid, i32), i64>,
}

#[derive(Default)]
pub struct InMemoryMatchStore {
    inner: Mutex<State>,
}

impl InMemoryMatchStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, MatchError> {
        self.inner
            .lock()
            .map_err(|_| MatchError::Storage(anyhow::anyhow!("store mutex poisoned")))
    }

    // Seeding helpers for tests and embedders.

    pub fn insert_transaction(&self, transaction: BankTransaction) {
        if let Ok(mut state) = self.inner.lock() {
            state
                .transactions
                .insert(transaction.transaction_id, transaction);
        }
    }

    pub fn insert_invoice(&self, invoice: Invoice) {
        if let Ok(mut state) = self.inner.lock() {
            state.invoices.insert(invoice.invoice_id, invoice);
        }
    }

    pub fn insert_rule(&self, rule: MatchingRule) {
        if let Ok(mut state) = self.inner.lock() {
            state.rules.push(rule);
            state.rules.sort_by_key(|r| (r.priority, r.rule_id));
        }
    }

    /// Count of payments linked to a transaction (the de-duplication anchor).
    pub fn payments_for_transaction(&self, transaction_id: Uuid) -> Vec<Payment> {
        match self.inner.lock() {
            Ok(state) => state
                .payments
                .values()
                .filter(|p| p.transaction_id == transaction_id)
                .cloned()
                .collect(),
            Err(_) => Vec::new(),
        }
    }
}

#[async_trait]
impl MatchStore for InMemoryMatchStore {
    async fn get_transaction(
        &self,
        tenant_id: Uuid,
        transaction_id: Uuid,
    ) -> Result<Option<BankTransaction>, MatchError> {
        let state = self.lock()?;
        Ok(state
            .transactions
            .get(&transaction_id)
            .filter(|t| t.tenant_id == tenant_id)
            .cloned())
    }

    async fn get_invoice(
        &self,
        tenant_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<Option<Invoice>, MatchError> {
        let state = self.lock()?;
        Ok(state
            .invoices
            .get(&invoice_id)
            .filter(|i| i.tenant_id == tenant_id)
            .cloned())
    }

    async fn list_unprocessed_deposits(
        &self,
        tenant_id: Uuid,
    ) -> Result<Vec<BankTransaction>, MatchError> {
        let state = self.lock()?;
        let mut transactions: Vec<BankTransaction> = state
            .transactions
            .values()
            .filter(|t| {
                t.tenant_id == tenant_id
                    && t.processing_status() == ProcessingStatus::Unprocessed
                    && t.amount_minor > 0
            })
            .cloned()
            .collect();
        transactions.sort_by_key(|t| (t.transaction_date, t.created_utc, t.transaction_id));
        Ok(transactions)
    }

    async fn page_unprocessed_deposits(
        &self,
        tenant_id: Uuid,
        page_size: i32,
        page_token: Option<Uuid>,
    ) -> Result<(Vec<BankTransaction>, Option<Uuid>), MatchError> {
        let limit = page_size.clamp(1, 100) as usize;
        let state = self.lock()?;

        let mut transactions: Vec<BankTransaction> = state
            .transactions
            .values()
            .filter(|t| {
                t.tenant_id == tenant_id
                    && t.processing_status() == ProcessingStatus::Unprocessed
                    && t.amount_minor > 0
                    && page_token.map(|cursor| t.transaction_id > cursor).unwrap_or(true)
            })
            .cloned()
            .collect();
        transactions.sort_by_key(|t| t.transaction_id);

        let has_more = transactions.len() > limit;
        transactions.truncate(limit);
        let next_token = if has_more {
            transactions.last().map(|t| t.transaction_id)
        } else {
            None
        };

        Ok((transactions, next_token))
    }

    async fn find_candidate_invoices(
        &self,
        tenant_id: Uuid,
        currency: &str,
        transaction_date: NaiveDate,
        lookback_days: u32,
    ) -> Result<Vec<Invoice>, MatchError> {
        let state = self.lock()?;
        let window = chrono::Days::new(lookback_days as u64);
        Ok(state
            .invoices
            .values()
            .filter(|i| {
                i.tenant_id == tenant_id
                    && i.currency == currency
                    && i.is_open()
                    && i.invoice_date <= transaction_date
                    && i
                        .invoice_date
                        .checked_add_days(window)
                        .map(|end| transaction_date <= end)
                        .unwrap_or(false)
            })
            .cloned()
            .collect())
    }

    async fn list_eligible_invoices(&self, tenant_id: Uuid) -> Result<Vec<Invoice>, MatchError> {
        let state = self.lock()?;
        let mut invoices: Vec<Invoice> = state
            .invoices
            .values()
            .filter(|i| i.tenant_id == tenant_id && i.is_open())
            .cloned()
            .collect();
        invoices.sort_by_key(|i| (i.due_date, i.invoice_id));
        Ok(invoices)
    }

    async fn list_active_rules(&self, tenant_id: Uuid) -> Result<Vec<MatchingRule>, MatchError> {
        let state = self.lock()?;
        Ok(state
            .rules
            .iter()
            .filter(|r| r.tenant_id == tenant_id && r.is_active)
            .cloned()
            .collect())
    }

    async fn settle(&self, request: &SettleRequest) -> Result<Payment, MatchError> {
        // The store mutex plays the role of the row locks: the plan is
        // evaluated and applied without any interleaving writer.
        let mut state = self.lock()?;

        let transaction = state
            .transactions
            .get(&request.transaction_id)
            .filter(|t| t.tenant_id == request.tenant_id)
            .cloned()
            .ok_or(MatchError::TransactionNotFound(request.transaction_id))?;

        let invoice = state
            .invoices
            .get(&request.invoice_id)
            .filter(|i| i.tenant_id == request.tenant_id)
            .cloned()
            .ok_or(MatchError::InvoiceNotFound(request.invoice_id))?;

        let plan =
            SettlementPlan::build(&transaction, &invoice, request.confidence, request.source)?;

        let year = transaction.transaction_date.year();
        let sequence = state
            .payment_counters
            .entry((request.tenant_id, year))
            .and_modify(|v| *v += 1)
            .or_insert(1);
        let number = payment_number(year, *sequence);

        let now = Utc::now();
        let payment = Payment {
            payment_id: Uuid::new_v4(),
            tenant_id: request.tenant_id,
            invoice_id: invoice.invoice_id,
            customer_id: invoice.customer_id,
            transaction_id: transaction.transaction_id,
            amount_minor: plan.applied_minor,
            currency: invoice.currency.clone(),
            payment_date: transaction.transaction_date,
            payment_number: number,
            gateway: GATEWAY_BANK_TRANSFER.to_string(),
            external_reference: transaction.external_reference.clone(),
            confidence: plan.confidence,
            matched_by: request.matched_by.clone(),
            notes: Some(payment_notes(&plan, &transaction)),
            created_utc: now,
        };
        state.payments.insert(payment.payment_id, payment.clone());

        if let Some(stored) = state.invoices.get_mut(&invoice.invoice_id) {
            stored.due_minor = plan.new_due_minor;
            stored.status = if plan.closes_invoice {
                InvoiceStatus::Paid.as_str().to_string()
            } else {
                InvoiceStatus::Sent.as_str().to_string()
            };
        }

        if let Some(stored) = state.transactions.get_mut(&transaction.transaction_id) {
            stored.status = ProcessingStatus::Processed.as_str().to_string();
            stored.matched_invoice_id = Some(invoice.invoice_id);
            stored.matched_payment_id = Some(payment.payment_id);
            stored.match_confidence = Some(plan.confidence);
            stored.matched_at = Some(now);
        }

        if plan.unapplied_minor > 0 {
            warn!(
                transaction_id = %transaction.transaction_id,
                invoice_id = %invoice.invoice_id,
                unapplied_minor = plan.unapplied_minor,
                "deposit exceeds invoice due amount; remainder left unapplied"
            );
        }

        Ok(payment)
    }

    async fn stats(&self, tenant_id: Uuid) -> Result<MatchStats, MatchError> {
        let state = self.lock()?;

        let deposits = state
            .transactions
            .values()
            .filter(|t| t.tenant_id == tenant_id && t.amount_minor > 0);
        let (mut matched_count, mut unmatched_count) = (0i64, 0i64);
        for transaction in deposits {
            match transaction.processing_status() {
                ProcessingStatus::Processed => matched_count += 1,
                ProcessingStatus::Unprocessed => unmatched_count += 1,
            }
        }

        let engine_payments: Vec<&Payment> = state
            .payments
            .values()
            .filter(|p| p.tenant_id == tenant_id && p.gateway == GATEWAY_BANK_TRANSFER)
            .collect();
        let total_matched_amount_minor = engine_payments.iter().map(|p| p.amount_minor).sum();
        let average_confidence = if engine_payments.is_empty() {
            0.0
        } else {
            engine_payments.iter().map(|p| p.confidence).sum::<f64>() / engine_payments.len() as f64
        };

        Ok(MatchStats {
            matched_count,
            unmatched_count,
            total_matched_amount_minor,
            average_confidence,
        })
    }
}
