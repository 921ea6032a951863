//! Confidence scoring: (transaction, invoice) -> 0..100 plus a signal
//! breakdown.
//!
//! Pure and total over valid inputs: mismatches and missing fields score
//! low, they never fail. Weights sum to 100 at a full match.

use crate::matching::normalize::{fold_name, fold_reference};
use crate::matching::similarity::jaro_winkler;
use crate::models::{BankTransaction, Invoice, MatchSignals};
use crate::policy::MatchPolicy;

const AMOUNT_WEIGHT: f64 = 50.0;
const REFERENCE_WEIGHT: f64 = 30.0;
const NAME_WEIGHT: f64 = 15.0;
const DATE_WEIGHT: f64 = 5.0;

/// Score a candidate invoice against a transaction.
pub fn score(
    transaction: &BankTransaction,
    invoice: &Invoice,
    policy: &MatchPolicy,
) -> MatchSignals {
    MatchSignals {
        amount_exactness: amount_signal(
            transaction.amount_minor,
            invoice.due_minor,
            policy.amount_tolerance,
        ),
        reference_match: reference_signal(transaction, invoice),
        name_similarity: name_signal(transaction, invoice),
        date_proximity: date_signal(transaction, invoice),
    }
}

/// Up to 50 points: full marks for an exact amount match, linear decay to
/// zero as the difference approaches the tolerance. The candidate finder
/// filters by tolerance too, but this re-checks rather than assuming it.
fn amount_signal(amount_minor: i64, due_minor: i64, tolerance: f64) -> f64 {
    if due_minor <= 0 {
        return 0.0;
    }
    let diff = (amount_minor - due_minor).unsigned_abs();
    if diff == 0 {
        return AMOUNT_WEIGHT;
    }
    let tolerance_minor = tolerance_minor_units(due_minor, tolerance);
    if diff >= tolerance_minor {
        return 0.0;
    }
    AMOUNT_WEIGHT * (1.0 - diff as f64 / tolerance_minor as f64)
}

/// Absolute tolerance in minor units for a given due amount, at least one
/// minor unit so an off-by-one rounding difference is not an automatic zero.
fn tolerance_minor_units(due_minor: i64, tolerance: f64) -> u64 {
    ((due_minor as f64 * tolerance).round() as u64).max(1)
}

/// 30 points or nothing: the normalized invoice number appears in the
/// transaction's description or external reference. Binary on purpose —
/// reference numbers are either present or absent by design.
fn reference_signal(transaction: &BankTransaction, invoice: &Invoice) -> f64 {
    let needle = fold_reference(&invoice.invoice_number);
    if needle.is_empty() {
        return 0.0;
    }
    let in_description = fold_reference(&transaction.description).contains(&needle);
    let in_reference = transaction
        .external_reference
        .as_deref()
        .map(|r| fold_reference(r).contains(&needle))
        .unwrap_or(false);
    if in_description || in_reference {
        REFERENCE_WEIGHT
    } else {
        0.0
    }
}

/// Up to 15 points, scaled linearly by counterparty/customer name
/// similarity over case-folded, diacritic-stripped text.
fn name_signal(transaction: &BankTransaction, invoice: &Invoice) -> f64 {
    let counterparty = match transaction.counterparty_name.as_deref() {
        Some(name) => fold_name(name),
        None => return 0.0,
    };
    let customer = fold_name(&invoice.customer_name);
    if counterparty.is_empty() || customer.is_empty() {
        return 0.0;
    }
    NAME_WEIGHT * jaro_winkler(&counterparty, &customer)
}

/// 5 points when payment arrived on or before the due date. A late payment
/// is still a valid match, just slightly less confident.
fn date_signal(transaction: &BankTransaction, invoice: &Invoice) -> f64 {
    if transaction.transaction_date <= invoice.due_date {
        DATE_WEIGHT
    } else {
        0.0
    }
}
