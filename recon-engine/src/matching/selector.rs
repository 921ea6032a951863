//! Candidate ranking and the auto/suggest/no-match decision.

use crate::models::{BankTransaction, MatchCandidate};
use crate::policy::MatchPolicy;
use std::cmp::Ordering;

/// Outcome of ranking a transaction's scored candidates.
#[derive(Debug, Clone)]
pub enum Decision {
    /// Settle without human review.
    AutoMatch(MatchCandidate),
    /// Surface for human confirmation; nothing is mutated.
    Suggest(MatchCandidate),
    NoMatch,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::AutoMatch(_) => "auto_match",
            Decision::Suggest(_) => "suggest",
            Decision::NoMatch => "no_match",
        }
    }
}

/// Rank candidates and decide.
///
/// Order: score descending, then smallest absolute amount difference, then
/// earliest invoice date (pay down the oldest debt first), then invoice id
/// so equal candidates rank deterministically. Auto-acceptance additionally
/// requires that no runner-up sits within the ambiguity margin of the top
/// score — two near-equal candidates are never resolved silently.
pub fn select(
    transaction: &BankTransaction,
    mut candidates: Vec<MatchCandidate>,
    policy: &MatchPolicy,
) -> Decision {
    if candidates.is_empty() {
        return Decision::NoMatch;
    }

    let amount = transaction.amount_minor;
    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| {
                let da = (a.invoice.due_minor - amount).abs();
                let db = (b.invoice.due_minor - amount).abs();
                da.cmp(&db)
            })
            .then_with(|| a.invoice.invoice_date.cmp(&b.invoice.invoice_date))
            .then_with(|| a.invoice.invoice_id.cmp(&b.invoice.invoice_id))
    });

    let top_score = candidates[0].score;
    let ambiguous = candidates
        .get(1)
        .map(|second| top_score - second.score < policy.ambiguity_margin)
        .unwrap_or(false);

    let top = candidates.swap_remove(0);
    if top_score >= policy.auto_accept_threshold && !ambiguous {
        Decision::AutoMatch(top)
    } else if top_score >= policy.suggest_threshold {
        Decision::Suggest(top)
    } else {
        Decision::NoMatch
    }
}
