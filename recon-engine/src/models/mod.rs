//! Domain models for the reconciliation engine.
//!
//! All monetary amounts are integer minor units (cents); statuses are
//! stored as strings with typed helpers on top.

#![allow(clippy::should_implement_trait)]

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// ============================================================================
// Bank Transaction
// ============================================================================

/// Processing lifecycle of an imported bank transaction.
///
/// `Unprocessed -> Processed` happens exactly once, and only through the
/// settlement executor. There is no way back: corrections are reversing
/// entries created elsewhere, never an un-match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingStatus {
    Unprocessed,
    Processed,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unprocessed => "unprocessed",
            Self::Processed => "processed",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "processed" => Self::Processed,
            _ => Self::Unprocessed,
        }
    }
}

/// A single ledger line imported from a bank feed or statement file.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BankTransaction {
    pub transaction_id: Uuid,
    pub tenant_id: Uuid,
    pub amount_minor: i64,
    pub currency: String,
    pub transaction_date: NaiveDate,
    pub description: String,
    pub counterparty_name: Option<String>,
    pub external_reference: Option<String>,
    pub status: String,
    pub matched_invoice_id: Option<Uuid>,
    pub matched_payment_id: Option<Uuid>,
    pub match_confidence: Option<f64>,
    pub matched_at: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
}

impl BankTransaction {
    pub fn processing_status(&self) -> ProcessingStatus {
        ProcessingStatus::from_str(&self.status)
    }

    /// Only money-in lines settle receivables.
    pub fn is_deposit(&self) -> bool {
        self.amount_minor > 0
    }
}

// ============================================================================
// Invoice
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvoiceStatus {
    Draft,
    Sent,
    Paid,
    Cancelled,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Sent => "sent",
            Self::Paid => "paid",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "sent" => Self::Sent,
            "paid" => Self::Paid,
            "cancelled" => Self::Cancelled,
            _ => Self::Draft,
        }
    }
}

/// A billable document, as far as reconciliation is concerned.
///
/// `due_minor` is monotonically non-increasing as payments accrue and
/// never goes below zero.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Invoice {
    pub invoice_id: Uuid,
    pub tenant_id: Uuid,
    pub invoice_number: String,
    pub customer_id: Uuid,
    pub customer_name: String,
    pub currency: String,
    pub total_minor: i64,
    pub due_minor: i64,
    pub status: String,
    pub invoice_date: NaiveDate,
    pub due_date: NaiveDate,
    pub created_utc: DateTime<Utc>,
}

impl Invoice {
    pub fn invoice_status(&self) -> InvoiceStatus {
        InvoiceStatus::from_str(&self.status)
    }

    /// Reconciliation candidate: still sent and still carrying a balance.
    pub fn is_open(&self) -> bool {
        self.invoice_status() == InvoiceStatus::Sent && self.due_minor > 0
    }
}

// ============================================================================
// Payment
// ============================================================================

/// How a match was initiated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchSource {
    Auto,
    Manual,
}

impl MatchSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Manual => "manual",
        }
    }
}

/// Gateway tag for payments created by this engine.
pub const GATEWAY_BANK_TRANSFER: &str = "bank_transfer";

/// Durable record of money received, created exclusively by the settlement
/// executor for this flow. Always links back to exactly one transaction and
/// exactly one invoice — that link is the de-duplication anchor.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Payment {
    pub payment_id: Uuid,
    pub tenant_id: Uuid,
    pub invoice_id: Uuid,
    pub customer_id: Uuid,
    pub transaction_id: Uuid,
    pub amount_minor: i64,
    pub currency: String,
    pub payment_date: NaiveDate,
    pub payment_number: String,
    pub gateway: String,
    pub external_reference: Option<String>,
    pub confidence: f64,
    pub matched_by: String,
    pub notes: Option<String>,
    pub created_utc: DateTime<Utc>,
}

// ============================================================================
// Ephemeral matching types
// ============================================================================

/// Per-signal score breakdown, each in points of the 0-100 scale.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct MatchSignals {
    pub amount_exactness: f64,
    pub reference_match: f64,
    pub name_similarity: f64,
    pub date_proximity: f64,
}

impl MatchSignals {
    pub fn total(&self) -> f64 {
        (self.amount_exactness + self.reference_match + self.name_similarity + self.date_proximity)
            .clamp(0.0, 100.0)
    }

    /// Named breakdown for reports and logging.
    pub fn breakdown(&self) -> Vec<(&'static str, f64)> {
        vec![
            ("amount_exactness", self.amount_exactness),
            ("reference_match", self.reference_match),
            ("name_similarity", self.name_similarity),
            ("date_proximity", self.date_proximity),
        ]
    }
}

/// A scored settlement target. Produced and consumed within one
/// reconciliation pass; never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchCandidate {
    pub invoice: Invoice,
    pub score: f64,
    pub signals: MatchSignals,
}

// ============================================================================
// Reports
// ============================================================================

/// Aggregate outcome of one batch reconciliation run. Returned to the
/// caller; not persisted by this engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatchRunReport {
    pub considered: u32,
    pub auto_matched: u32,
    pub suggested: u32,
    pub no_match: u32,
    pub ignored_by_rule: u32,
    pub applied_minor: i64,
    /// Per-transaction failures; one bad record never aborts the run.
    pub failed: Vec<(Uuid, String)>,
}

/// Tenant-level matching statistics over money-in transactions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatchStats {
    pub matched_count: i64,
    pub unmatched_count: i64,
    pub total_matched_amount_minor: i64,
    pub average_confidence: f64,
}

/// One preview row: an unprocessed deposit plus its best suggestion, if any
/// candidate clears the suggestion threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionWithSuggestion {
    pub transaction: BankTransaction,
    pub suggestion: Option<MatchCandidate>,
}
