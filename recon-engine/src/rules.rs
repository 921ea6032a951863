//! Tenant-defined matching rules, consulted by the batch run before
//! scoring. Rules are read-only within a run; an `ignore` action skips the
//! transaction without mutating it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use tracing::warn;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchType {
    Contains,
    Exact,
    Regex,
    StartsWith,
    EndsWith,
}

impl MatchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Contains => "contains",
            Self::Exact => "exact",
            Self::Regex => "regex",
            Self::StartsWith => "starts_with",
            Self::EndsWith => "ends_with",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "exact" => Self::Exact,
            "regex" => Self::Regex,
            "starts_with" => Self::StartsWith,
            "ends_with" => Self::EndsWith,
            _ => Self::Contains,
        }
    }
}

/// What a matching rule does when its pattern hits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleAction {
    /// Skip the transaction in batch runs.
    Ignore,
    /// Narrow the candidate pool to this customer's invoices.
    PinCustomer(Uuid),
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MatchingRule {
    pub rule_id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub description_pattern: String,
    pub match_type: String,
    pub action: String,
    pub customer_id: Option<Uuid>,
    pub priority: i32,
    pub is_active: bool,
    pub created_utc: DateTime<Utc>,
}

impl MatchingRule {
    pub fn rule_action(&self) -> Option<RuleAction> {
        match self.action.as_str() {
            "ignore" => Some(RuleAction::Ignore),
            "pin_customer" => self.customer_id.map(RuleAction::PinCustomer),
            _ => None,
        }
    }
}

/// Evaluate rules against a transaction description in priority order;
/// first match wins.
///
/// Regex patterns are compiled once per call set; an invalid pattern is
/// logged and treated as non-matching rather than failing the run.
pub fn evaluate(rules: &[MatchingRule], description: &str) -> Option<RuleAction> {
    let description_lower = description.to_lowercase();

    for rule in rules.iter().filter(|r| r.is_active) {
        let pattern_lower = rule.description_pattern.to_lowercase();
        let hit = match MatchType::from_str(&rule.match_type) {
            MatchType::Exact => description_lower == pattern_lower,
            MatchType::Contains => description_lower.contains(&pattern_lower),
            MatchType::StartsWith => description_lower.starts_with(&pattern_lower),
            MatchType::EndsWith => description_lower.ends_with(&pattern_lower),
            MatchType::Regex => match regex::Regex::new(&rule.description_pattern) {
                Ok(re) => re.is_match(description),
                Err(err) => {
                    warn!(rule_id = %rule.rule_id, error = %err, "invalid rule regex, skipping");
                    false
                }
            },
        };

        if hit {
            if let Some(action) = rule.rule_action() {
                return Some(action);
            }
        }
    }

    None
}
