//! Common fixtures for the reconciliation engine integration tests.
//!
//! The suite runs against the in-memory store so it needs no
//! infrastructure; the PostgreSQL backend shares the same settlement plan.

use chrono::{NaiveDate, Utc};
use recon_engine::models::{BankTransaction, Invoice};
use recon_engine::rules::MatchingRule;
use recon_engine::store::InMemoryMatchStore;
use recon_engine::ReconciliationEngine;
use std::sync::{Arc, Once};
use uuid::Uuid;

static INIT: Once = Once::new();

/// Initialize tracing and metrics for tests (only once).
pub fn init_test_env() {
    INIT.call_once(|| {
        recon_core::observability::init_tracing("recon-engine-test", "info");
        recon_engine::services::init_metrics();
    });
}

#[allow(dead_code)]
pub struct TestHarness {
    pub engine: ReconciliationEngine,
    pub store: Arc<InMemoryMatchStore>,
    pub tenant_id: Uuid,
}

/// Build an engine over a fresh in-memory store with a unique tenant.
pub fn spawn_engine() -> TestHarness {
    init_test_env();

    let store = Arc::new(InMemoryMatchStore::new());
    let engine = ReconciliationEngine::new(store.clone());
    TestHarness {
        engine,
        store,
        tenant_id: Uuid::new_v4(),
    }
}

pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
}

/// An unprocessed money-in transaction with sensible defaults; tests tweak
/// fields directly before seeding.
pub fn deposit(tenant_id: Uuid, amount_minor: i64, transaction_date: NaiveDate) -> BankTransaction {
    BankTransaction {
        transaction_id: Uuid::new_v4(),
        tenant_id,
        amount_minor,
        currency: "MKD".to_string(),
        transaction_date,
        description: "uplata po smetka".to_string(),
        counterparty_name: None,
        external_reference: None,
        status: "unprocessed".to_string(),
        matched_invoice_id: None,
        matched_payment_id: None,
        match_confidence: None,
        matched_at: None,
        created_utc: Utc::now(),
    }
}

/// A sent invoice with its full amount still due.
pub fn sent_invoice(
    tenant_id: Uuid,
    invoice_number: &str,
    due_minor: i64,
    invoice_date: NaiveDate,
    due_date: NaiveDate,
) -> Invoice {
    Invoice {
        invoice_id: Uuid::new_v4(),
        tenant_id,
        invoice_number: invoice_number.to_string(),
        customer_id: Uuid::new_v4(),
        customer_name: "Gradeznik DOOEL".to_string(),
        currency: "MKD".to_string(),
        total_minor: due_minor,
        due_minor,
        status: "sent".to_string(),
        invoice_date,
        due_date,
        created_utc: Utc::now(),
    }
}

/// An active matching rule.
#[allow(dead_code)]
pub fn rule(
    tenant_id: Uuid,
    pattern: &str,
    match_type: &str,
    action: &str,
    customer_id: Option<Uuid>,
) -> MatchingRule {
    MatchingRule {
        rule_id: Uuid::new_v4(),
        tenant_id,
        name: format!("{} {}", action, pattern),
        description_pattern: pattern.to_string(),
        match_type: match_type.to_string(),
        action: action.to_string(),
        customer_id,
        priority: 100,
        is_active: true,
        created_utc: Utc::now(),
    }
}
