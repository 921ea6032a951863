//! PostgreSQL storage backend.
//!
//! Settlement runs in one database transaction with `FOR UPDATE` row locks
//! on the bank transaction and the invoice; preconditions are re-planned
//! under those locks before anything is written.

use crate::error::MatchError;
use crate::models::{
    BankTransaction, Invoice, InvoiceStatus, MatchStats, Payment, ProcessingStatus,
    GATEWAY_BANK_TRANSFER,
};
use crate::rules::MatchingRule;
use crate::services::metrics::DB_QUERY_DURATION;
use crate::settlement::{payment_notes, payment_number, SettlementPlan};
use crate::store::{MatchStore, SettleRequest};
use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use recon_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{info, instrument, warn};
use uuid::Uuid;

const TRANSACTION_COLUMNS: &str = "transaction_id, tenant_id, amount_minor, currency, \
     transaction_date, description, counterparty_name, external_reference, status, \
     matched_invoice_id, matched_payment_id, match_confidence, matched_at, created_utc";

const INVOICE_COLUMNS: &str = "invoice_id, tenant_id, invoice_number, customer_id, \
     customer_name, currency, total_minor, due_minor, status, invoice_date, due_date, \
     created_utc";

const PAYMENT_COLUMNS: &str = "payment_id, tenant_id, invoice_id, customer_id, \
     transaction_id, amount_minor, currency, payment_date, payment_number, gateway, \
     external_reference, confidence, matched_by, notes, created_utc";

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct PgMatchStore {
    pool: PgPool,
}

impl PgMatchStore {
    /// Create a new database connection pool.
    #[instrument(skip(database_url))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["health_check"])
            .start_timer();

        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;

        timer.observe_duration();
        Ok(())
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }
}

#[async_trait]
impl MatchStore for PgMatchStore {
    #[instrument(skip(self), fields(tenant_id = %tenant_id, transaction_id = %transaction_id))]
    async fn get_transaction(
        &self,
        tenant_id: Uuid,
        transaction_id: Uuid,
    ) -> Result<Option<BankTransaction>, MatchError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_transaction"])
            .start_timer();

        let transaction = sqlx::query_as::<_, BankTransaction>(&format!(
            "SELECT {} FROM bank_transactions WHERE tenant_id = $1 AND transaction_id = $2",
            TRANSACTION_COLUMNS
        ))
        .bind(tenant_id)
        .bind(transaction_id)
        .fetch_optional(&self.pool)
        .await?;

        timer.observe_duration();
        Ok(transaction)
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, invoice_id = %invoice_id))]
    async fn get_invoice(
        &self,
        tenant_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<Option<Invoice>, MatchError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_invoice"])
            .start_timer();

        let invoice = sqlx::query_as::<_, Invoice>(&format!(
            "SELECT {} FROM invoices WHERE tenant_id = $1 AND invoice_id = $2",
            INVOICE_COLUMNS
        ))
        .bind(tenant_id)
        .bind(invoice_id)
        .fetch_optional(&self.pool)
        .await?;

        timer.observe_duration();
        Ok(invoice)
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    async fn list_unprocessed_deposits(
        &self,
        tenant_id: Uuid,
    ) -> Result<Vec<BankTransaction>, MatchError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_unprocessed_deposits"])
            .start_timer();

        let transactions = sqlx::query_as::<_, BankTransaction>(&format!(
            "SELECT {} FROM bank_transactions \
             WHERE tenant_id = $1 AND status = $2 AND amount_minor > 0 \
             ORDER BY transaction_date, created_utc, transaction_id",
            TRANSACTION_COLUMNS
        ))
        .bind(tenant_id)
        .bind(ProcessingStatus::Unprocessed.as_str())
        .fetch_all(&self.pool)
        .await?;

        timer.observe_duration();
        Ok(transactions)
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    async fn page_unprocessed_deposits(
        &self,
        tenant_id: Uuid,
        page_size: i32,
        page_token: Option<Uuid>,
    ) -> Result<(Vec<BankTransaction>, Option<Uuid>), MatchError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["page_unprocessed_deposits"])
            .start_timer();

        let limit = page_size.clamp(1, 100) as i64;

        let transactions = if let Some(cursor) = page_token {
            sqlx::query_as::<_, BankTransaction>(&format!(
                "SELECT {} FROM bank_transactions \
                 WHERE tenant_id = $1 AND status = $2 AND amount_minor > 0 AND transaction_id > $3 \
                 ORDER BY transaction_id LIMIT $4",
                TRANSACTION_COLUMNS
            ))
            .bind(tenant_id)
            .bind(ProcessingStatus::Unprocessed.as_str())
            .bind(cursor)
            .bind(limit + 1)
            .fetch_all(&self.pool)
            .await
        } else {
            sqlx::query_as::<_, BankTransaction>(&format!(
                "SELECT {} FROM bank_transactions \
                 WHERE tenant_id = $1 AND status = $2 AND amount_minor > 0 \
                 ORDER BY transaction_id LIMIT $3",
                TRANSACTION_COLUMNS
            ))
            .bind(tenant_id)
            .bind(ProcessingStatus::Unprocessed.as_str())
            .bind(limit + 1)
            .fetch_all(&self.pool)
            .await
        }?;

        timer.observe_duration();

        let has_more = transactions.len() > limit as usize;
        let mut transactions = transactions;
        if has_more {
            transactions.pop();
        }
        let next_token = if has_more {
            transactions.last().map(|t| t.transaction_id)
        } else {
            None
        };

        Ok((transactions, next_token))
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    async fn find_candidate_invoices(
        &self,
        tenant_id: Uuid,
        currency: &str,
        transaction_date: NaiveDate,
        lookback_days: u32,
    ) -> Result<Vec<Invoice>, MatchError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_candidate_invoices"])
            .start_timer();

        let invoices = sqlx::query_as::<_, Invoice>(&format!(
            "SELECT {} FROM invoices \
             WHERE tenant_id = $1 AND currency = $2 AND status = $3 AND due_minor > 0 \
               AND invoice_date <= $4 AND invoice_date + $5 >= $4",
            INVOICE_COLUMNS
        ))
        .bind(tenant_id)
        .bind(currency)
        .bind(InvoiceStatus::Sent.as_str())
        .bind(transaction_date)
        .bind(lookback_days as i32)
        .fetch_all(&self.pool)
        .await?;

        timer.observe_duration();
        Ok(invoices)
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    async fn list_eligible_invoices(&self, tenant_id: Uuid) -> Result<Vec<Invoice>, MatchError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_eligible_invoices"])
            .start_timer();

        let invoices = sqlx::query_as::<_, Invoice>(&format!(
            "SELECT {} FROM invoices \
             WHERE tenant_id = $1 AND status = $2 AND due_minor > 0 \
             ORDER BY due_date, invoice_id",
            INVOICE_COLUMNS
        ))
        .bind(tenant_id)
        .bind(InvoiceStatus::Sent.as_str())
        .fetch_all(&self.pool)
        .await?;

        timer.observe_duration();
        Ok(invoices)
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    async fn list_active_rules(&self, tenant_id: Uuid) -> Result<Vec<MatchingRule>, MatchError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_active_rules"])
            .start_timer();

        let rules = sqlx::query_as::<_, MatchingRule>(
            "SELECT rule_id, tenant_id, name, description_pattern, match_type, action, \
                    customer_id, priority, is_active, created_utc \
             FROM matching_rules \
             WHERE tenant_id = $1 AND is_active = TRUE \
             ORDER BY priority, rule_id",
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;

        timer.observe_duration();
        Ok(rules)
    }

    #[instrument(
        skip(self, request),
        fields(
            tenant_id = %request.tenant_id,
            transaction_id = %request.transaction_id,
            invoice_id = %request.invoice_id,
        )
    )]
    async fn settle(&self, request: &SettleRequest) -> Result<Payment, MatchError> {
        let timer = DB_QUERY_DURATION.with_label_values(&["settle"]).start_timer();

        let mut tx = self.pool.begin().await?;

        // Row locks close the race between a concurrent automatic run and a
        // manual match; the plan re-checks every precondition on the locked
        // rows. Lock order (transaction, then invoice) is fixed across all
        // callers.
        let transaction = sqlx::query_as::<_, BankTransaction>(&format!(
            "SELECT {} FROM bank_transactions \
             WHERE tenant_id = $1 AND transaction_id = $2 FOR UPDATE",
            TRANSACTION_COLUMNS
        ))
        .bind(request.tenant_id)
        .bind(request.transaction_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(MatchError::TransactionNotFound(request.transaction_id))?;

        let invoice = sqlx::query_as::<_, Invoice>(&format!(
            "SELECT {} FROM invoices WHERE tenant_id = $1 AND invoice_id = $2 FOR UPDATE",
            INVOICE_COLUMNS
        ))
        .bind(request.tenant_id)
        .bind(request.invoice_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(MatchError::InvoiceNotFound(request.invoice_id))?;

        let plan =
            SettlementPlan::build(&transaction, &invoice, request.confidence, request.source)?;

        let year = transaction.transaction_date.year();
        let sequence: i64 = sqlx::query_scalar(
            "INSERT INTO payment_counters (tenant_id, year, last_value) VALUES ($1, $2, 1) \
             ON CONFLICT (tenant_id, year) \
             DO UPDATE SET last_value = payment_counters.last_value + 1 \
             RETURNING last_value",
        )
        .bind(request.tenant_id)
        .bind(year)
        .fetch_one(&mut *tx)
        .await?;

        let payment = sqlx::query_as::<_, Payment>(&format!(
            "INSERT INTO payments (payment_id, tenant_id, invoice_id, customer_id, \
                 transaction_id, amount_minor, currency, payment_date, payment_number, \
                 gateway, external_reference, confidence, matched_by, notes) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14) \
             RETURNING {}",
            PAYMENT_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(request.tenant_id)
        .bind(invoice.invoice_id)
        .bind(invoice.customer_id)
        .bind(transaction.transaction_id)
        .bind(plan.applied_minor)
        .bind(&invoice.currency)
        .bind(transaction.transaction_date)
        .bind(payment_number(year, sequence))
        .bind(GATEWAY_BANK_TRANSFER)
        .bind(&transaction.external_reference)
        .bind(plan.confidence)
        .bind(&request.matched_by)
        .bind(payment_notes(&plan, &transaction))
        .fetch_one(&mut *tx)
        .await?;

        let new_status = if plan.closes_invoice {
            InvoiceStatus::Paid
        } else {
            InvoiceStatus::Sent
        };
        sqlx::query(
            "UPDATE invoices SET due_minor = $3, status = $4 \
             WHERE tenant_id = $1 AND invoice_id = $2",
        )
        .bind(request.tenant_id)
        .bind(invoice.invoice_id)
        .bind(plan.new_due_minor)
        .bind(new_status.as_str())
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE bank_transactions \
             SET status = $3, matched_invoice_id = $4, matched_payment_id = $5, \
                 match_confidence = $6, matched_at = NOW() \
             WHERE tenant_id = $1 AND transaction_id = $2",
        )
        .bind(request.tenant_id)
        .bind(transaction.transaction_id)
        .bind(ProcessingStatus::Processed.as_str())
        .bind(invoice.invoice_id)
        .bind(payment.payment_id)
        .bind(plan.confidence)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        timer.observe_duration();

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

    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    async fn stats(&self, tenant_id: Uuid) -> Result<MatchStats, MatchError> {
        let timer = DB_QUERY_DURATION.with_label_values(&["stats"]).start_timer();

        let (matched_count, unmatched_count): (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*) FILTER (WHERE status = 'processed'), \
                    COUNT(*) FILTER (WHERE status = 'unprocessed') \
             FROM bank_transactions WHERE tenant_id = $1 AND amount_minor > 0",
        )
        .bind(tenant_id)
        .fetch_one(&self.pool)
        .await?;

        let (total_matched_amount_minor, average_confidence): (i64, f64) = sqlx::query_as(
            "SELECT COALESCE(SUM(amount_minor), 0)::BIGINT, \
                    COALESCE(AVG(confidence), 0.0)::DOUBLE PRECISION \
             FROM payments WHERE tenant_id = $1 AND gateway = $2",
        )
        .bind(tenant_id)
        .bind(GATEWAY_BANK_TRANSFER)
        .fetch_one(&self.pool)
        .await?;

        timer.observe_duration();

        Ok(MatchStats {
            matched_count,
            unmatched_count,
            total_matched_amount_minor,
            average_confidence,
        })
    }
}
