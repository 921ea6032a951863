//! Per-run matching policy.

use crate::error::MatchError;
use serde::{Deserialize, Serialize};

/// Tunable knobs for one reconciliation pass.
///
/// Defaults mirror the production configuration: a 7-day lookback from the
/// invoice issue date, 1% amount tolerance, and a deliberately higher bar
/// for unattended auto-acceptance than for human-reviewed suggestions.
/// Callers may hold a per-tenant policy; nothing here is global state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchPolicy {
    /// Days after the invoice issue date in which a settling transaction
    /// may land.
    pub lookback_days: u32,
    /// Amount tolerance as a fraction of the invoice due amount.
    pub amount_tolerance: f64,
    /// Minimum score for an unattended match.
    pub auto_accept_threshold: f64,
    /// Minimum score to surface a suggestion.
    pub suggest_threshold: f64,
    /// A runner-up within this many points of the top score blocks
    /// auto-acceptance.
    pub ambiguity_margin: f64,
}

impl Default for MatchPolicy {
    fn default() -> Self {
        Self {
            lookback_days: 7,
            amount_tolerance: 0.01,
            auto_accept_threshold: 90.0,
            suggest_threshold: 50.0,
            ambiguity_margin: 5.0,
        }
    }
}

impl MatchPolicy {
    /// Reject malformed parameters before any work begins.
    pub fn validate(&self) -> Result<(), MatchError> {
        if !self.amount_tolerance.is_finite() || self.amount_tolerance < 0.0 {
            return Err(MatchError::Validation(format!(
                "amount_tolerance must be a non-negative fraction, got {}",
                self.amount_tolerance
            )));
        }
        if self.amount_tolerance >= 1.0 {
            return Err(MatchError::Validation(format!(
                "amount_tolerance must be below 1.0, got {}",
                self.amount_tolerance
            )));
        }
        for (name, value) in [
            ("auto_accept_threshold", self.auto_accept_threshold),
            ("suggest_threshold", self.suggest_threshold),
        ] {
            if !value.is_finite() || !(0.0..=100.0).contains(&value) {
                return Err(MatchError::Validation(format!(
                    "{} must be within 0..=100, got {}",
                    name, value
                )));
            }
        }
        if self.suggest_threshold > self.auto_accept_threshold {
            return Err(MatchError::Validation(format!(
                "suggest_threshold ({}) must not exceed auto_accept_threshold ({})",
                self.suggest_threshold, self.auto_accept_threshold
            )));
        }
        if !self.ambiguity_margin.is_finite() || self.ambiguity_margin < 0.0 {
            return Err(MatchError::Validation(format!(
                "ambiguity_margin must be non-negative, got {}",
                self.ambiguity_margin
            )));
        }
        Ok(())
    }
}
