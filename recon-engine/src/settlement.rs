//! Settlement planning: the one place that decides whether and how a
//! (transaction, invoice) pair settles.
//!
//! Every storage backend evaluates this plan while holding its lock on the
//! transaction row, so the precondition re-check and the concurrent-settle
//! race resolution live in exactly one code path.

use crate::error::MatchError;
use crate::models::{BankTransaction, Invoice, InvoiceStatus, MatchSource, ProcessingStatus};

/// The computed effect of settling a transaction against an invoice.
#[derive(Debug, Clone, PartialEq)]
pub struct SettlementPlan {
    /// Amount actually applied to the invoice: min(transaction, due).
    pub applied_minor: i64,
    /// Invoice due amount after the settlement.
    pub new_due_minor: i64,
    /// Whether the invoice flips to `paid`.
    pub closes_invoice: bool,
    /// Deposit amount left unapplied when the transaction overpays the
    /// invoice; flagged for manual handling, never a negative due amount.
    pub unapplied_minor: i64,
    pub confidence: f64,
    pub source: MatchSource,
}

impl SettlementPlan {
    /// Validate preconditions and compute the settlement.
    ///
    /// Callers pass freshly-read rows; the storage backend calls this again
    /// under its lock before writing anything.
    pub fn build(
        transaction: &BankTransaction,
        invoice: &Invoice,
        confidence: f64,
        source: MatchSource,
    ) -> Result<Self, MatchError> {
        if !confidence.is_finite() || !(0.0..=100.0).contains(&confidence) {
            return Err(MatchError::Validation(format!(
                "confidence must be within 0..=100, got {}",
                confidence
            )));
        }

        if transaction.processing_status() == ProcessingStatus::Processed {
            return Err(MatchError::AlreadyMatched {
                transaction_id: transaction.transaction_id,
                // A processed transaction always carries its match link.
                invoice_id: transaction.matched_invoice_id.unwrap_or(invoice.invoice_id),
            });
        }

        if !transaction.is_deposit() {
            return Err(MatchError::Validation(format!(
                "transaction {} is not a deposit; only money-in lines settle receivables",
                transaction.transaction_id
            )));
        }

        if invoice.tenant_id != transaction.tenant_id {
            return Err(MatchError::InvoiceNotEligible {
                invoice_id: invoice.invoice_id,
                reason: "invoice belongs to a different tenant".to_string(),
            });
        }

        if invoice.invoice_status() != InvoiceStatus::Sent {
            return Err(MatchError::InvoiceNotEligible {
                invoice_id: invoice.invoice_id,
                reason: format!("invoice status is '{}', expected 'sent'", invoice.status),
            });
        }

        if invoice.due_minor <= 0 {
            return Err(MatchError::InvoiceNotEligible {
                invoice_id: invoice.invoice_id,
                reason: "invoice has no outstanding due amount".to_string(),
            });
        }

        if invoice.currency != transaction.currency {
            return Err(MatchError::InvoiceNotEligible {
                invoice_id: invoice.invoice_id,
                reason: format!(
                    "currency mismatch: invoice {}, transaction {}",
                    invoice.currency, transaction.currency
                ),
            });
        }

        let applied_minor = transaction.amount_minor.min(invoice.due_minor);
        let new_due_minor = invoice.due_minor - applied_minor;

        Ok(Self {
            applied_minor,
            new_due_minor,
            closes_invoice: new_due_minor == 0,
            unapplied_minor: transaction.amount_minor - applied_minor,
            confidence,
            source,
        })
    }
}

/// Tenant-scoped payment number, sequential per year.
pub fn payment_number(year: i32, sequence: i64) -> String {
    format!("PAY-{}-{:06}", year, sequence)
}

/// Human-readable audit note recorded on the payment.
pub fn payment_notes(plan: &SettlementPlan, transaction: &BankTransaction) -> String {
    let reference = transaction
        .external_reference
        .as_deref()
        .unwrap_or("(no reference)");
    let mut notes = match plan.source {
        MatchSource::Auto => format!(
            "Auto-matched from bank transaction {}. Confidence: {:.1}%",
            reference, plan.confidence
        ),
        MatchSource::Manual => format!(
            "Manually matched from bank transaction {}. Confidence: {:.1}%",
            reference, plan.confidence
        ),
    };
    if plan.unapplied_minor > 0 {
        notes.push_str(&format!(
            " Unapplied remainder of {} minor units left for manual handling.",
            plan.unapplied_minor
        ));
    }
    notes
}
