//! Batch reconciliation: one synchronous pass over a tenant's unprocessed
//! money-in backlog.

use crate::error::MatchError;
use crate::executor::MatchExecutor;
use crate::finder::CandidateFinder;
use crate::matching::{self, Decision};
use crate::models::{MatchCandidate, MatchRunReport, MatchSource};
use crate::policy::MatchPolicy;
use crate::rules::{self, RuleAction};
use crate::services::metrics;
use crate::store::MatchStore;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};
use uuid::Uuid;

pub struct BatchReconciler {
    store: Arc<dyn MatchStore>,
    finder: CandidateFinder,
    executor: MatchExecutor,
}

impl BatchReconciler {
    pub fn new(store: Arc<dyn MatchStore>) -> Self {
        let finder = CandidateFinder::new(store.clone());
        let executor = MatchExecutor::new(store.clone());
        Self {
            store,
            finder,
            executor,
        }
    }

    /// Run auto-matching over the tenant's full backlog.
    ///
    /// Transactions are processed oldest-first so earlier debts are
    /// resolved before later ones compete for the same invoice; within one
    /// run that competition cannot race because processing is sequential.
    /// Cancellation is cooperative, checked once per transaction, and never
    /// interrupts a settlement mid-flight. Individual failures are counted
    /// into the report; they do not abort the run.
    #[instrument(skip(self, policy, cancel), fields(tenant_id = %tenant_id))]
    pub async fn run(
        &self,
        tenant_id: Uuid,
        policy: &MatchPolicy,
        cancel: &CancellationToken,
    ) -> Result<MatchRunReport, MatchError> {
        policy.validate()?;

        let transactions = self.store.list_unprocessed_deposits(tenant_id).await?;
        let rules = self.store.list_active_rules(tenant_id).await?;

        info!(
            backlog = transactions.len(),
            rule_count = rules.len(),
            lookback_days = policy.lookback_days,
            "starting reconciliation run"
        );

        let mut report = MatchRunReport::default();

        for transaction in &transactions {
            if cancel.is_cancelled() {
                info!(
                    considered = report.considered,
                    "reconciliation run cancelled between transactions"
                );
                break;
            }

            report.considered += 1;

            let mut pinned_customer = None;
            match rules::evaluate(&rules, &transaction.description) {
                Some(RuleAction::Ignore) => {
                    debug!(transaction_id = %transaction.transaction_id, "transaction ignored by rule");
                    report.ignored_by_rule += 1;
                    continue;
                }
                Some(RuleAction::PinCustomer(customer_id)) => {
                    pinned_customer = Some(customer_id);
                }
                None => {}
            }

            match self
                .reconcile_one(transaction, policy, pinned_customer)
                .await
            {
                Ok(Decision::AutoMatch(candidate)) => {
                    match self
                        .executor
                        .execute(
                            tenant_id,
                            transaction.transaction_id,
                            candidate.invoice.invoice_id,
                            candidate.score,
                            MatchSource::Auto,
                            MatchSource::Auto.as_str(),
                        )
                        .await
                    {
                        Ok(payment) => {
                            report.auto_matched += 1;
                            report.applied_minor += payment.amount_minor;
                        }
                        Err(err) => {
                            report
                                .failed
                                .push((transaction.transaction_id, err.to_string()));
                        }
                    }
                }
                Ok(Decision::Suggest(_)) => report.suggested += 1,
                Ok(Decision::NoMatch) => report.no_match += 1,
                Err(err) => {
                    report
                        .failed
                        .push((transaction.transaction_id, err.to_string()));
                }
            }
        }

        metrics::record_match_run(if report.failed.is_empty() {
            "ok"
        } else {
            "partial"
        });
        info!(
            considered = report.considered,
            auto_matched = report.auto_matched,
            suggested = report.suggested,
            no_match = report.no_match,
            ignored_by_rule = report.ignored_by_rule,
            failed = report.failed.len(),
            applied_minor = report.applied_minor,
            "reconciliation run completed"
        );

        Ok(report)
    }

    /// Score one transaction's candidates and decide, without mutating
    /// anything. Shared by the batch loop and the preview listing.
    pub(crate) async fn reconcile_one(
        &self,
        transaction: &crate::models::BankTransaction,
        policy: &MatchPolicy,
        pinned_customer: Option<Uuid>,
    ) -> Result<Decision, MatchError> {
        let invoices = self.finder.find(transaction, policy).await?;

        // A pinned customer narrows the pool only when that customer has
        // eligible invoices; otherwise fall back to the full pool.
        let invoices = match pinned_customer {
            Some(customer_id) if invoices.iter().any(|i| i.customer_id == customer_id) => invoices
                .into_iter()
                .filter(|i| i.customer_id == customer_id)
                .collect(),
            _ => invoices,
        };

        let candidates: Vec<MatchCandidate> = invoices
            .into_iter()
            .map(|invoice| {
                let signals = matching::score(transaction, &invoice, policy);
                MatchCandidate {
                    score: signals.total(),
                    signals,
                    invoice,
                }
            })
            .collect();

        Ok(matching::select(transaction, candidates, policy))
    }
}
