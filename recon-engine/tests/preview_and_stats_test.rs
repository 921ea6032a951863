//! Integration tests for the read-only preview, eligible-invoice listing,
//! and tenant statistics.

mod common;

use common::{date, deposit, sent_invoice, spawn_engine};
use recon_engine::store::MatchStore;
use recon_engine::{MatchError, MatchPolicy};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[tokio::test]
async fn preview_pairs_transactions_with_their_best_suggestion() {
    let app = spawn_engine();

    let mut matchable = deposit(app.tenant_id, 118_000, date(2025, 3, 10));
    matchable.description = "Uplata INV-2025-0042".to_string();
    let matchable_id = matchable.transaction_id;
    let invoice = sent_invoice(
        app.tenant_id,
        "INV-2025-0042",
        118_000,
        date(2025, 3, 5),
        date(2025, 3, 20),
    );
    let invoice_id = invoice.invoice_id;

    // A deposit nothing matches: amount far from any due amount.
    let orphan = deposit(app.tenant_id, 3_333, date(2025, 3, 11));
    let orphan_id = orphan.transaction_id;

    app.store.insert_transaction(matchable);
    app.store.insert_transaction(orphan);
    app.store.insert_invoice(invoice);

    let (rows, next) = app
        .engine
        .list_unmatched_with_suggestions(app.tenant_id, &MatchPolicy::default(), 20, None)
        .await
        .unwrap();

    assert_eq!(rows.len(), 2);
    assert!(next.is_none());
    for row in &rows {
        if row.transaction.transaction_id == matchable_id {
            let suggestion = row.suggestion.as_ref().expect("expected a suggestion");
            assert_eq!(suggestion.invoice.invoice_id, invoice_id);
            assert!(suggestion.score >= 50.0);
            assert!(suggestion.signals.amount_exactness > 0.0);
        } else {
            assert_eq!(row.transaction.transaction_id, orphan_id);
            assert!(row.suggestion.is_none());
        }
    }

    // Preview never mutates: the invoice still carries its full due amount.
    let invoice = app
        .store
        .get_invoice(app.tenant_id, invoice_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(invoice.due_minor, 118_000);
}

#[tokio::test]
async fn preview_paginates_with_a_keyset_token() {
    let app = spawn_engine();

    for _ in 0..3 {
        app.store
            .insert_transaction(deposit(app.tenant_id, 10_000, date(2025, 3, 10)));
    }

    let (first_page, token) = app
        .engine
        .list_unmatched_with_suggestions(app.tenant_id, &MatchPolicy::default(), 2, None)
        .await
        .unwrap();
    assert_eq!(first_page.len(), 2);
    let token = token.expect("expected a next-page token");

    let (second_page, end) = app
        .engine
        .list_unmatched_with_suggestions(app.tenant_id, &MatchPolicy::default(), 2, Some(&token))
        .await
        .unwrap();
    assert_eq!(second_page.len(), 1);
    assert!(end.is_none());

    let mut seen: Vec<Uuid> = first_page
        .iter()
        .chain(second_page.iter())
        .map(|row| row.transaction.transaction_id)
        .collect();
    seen.sort();
    seen.dedup();
    assert_eq!(seen.len(), 3);
}

#[tokio::test]
async fn preview_rejects_a_malformed_page_token() {
    let app = spawn_engine();

    let err = app
        .engine
        .list_unmatched_with_suggestions(
            app.tenant_id,
            &MatchPolicy::default(),
            20,
            Some("not-a-uuid"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, MatchError::Validation(_)));
}

#[tokio::test]
async fn preview_never_suggests_across_tenants() {
    let app = spawn_engine();
    let other_tenant = Uuid::new_v4();

    let mut txn = deposit(app.tenant_id, 118_000, date(2025, 3, 10));
    txn.description = "Uplata INV-2025-0042".to_string();
    let invoice = sent_invoice(
        other_tenant,
        "INV-2025-0042",
        118_000,
        date(2025, 3, 5),
        date(2025, 3, 20),
    );
    app.store.insert_transaction(txn);
    app.store.insert_invoice(invoice);

    let (rows, _) = app
        .engine
        .list_unmatched_with_suggestions(app.tenant_id, &MatchPolicy::default(), 20, None)
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert!(rows[0].suggestion.is_none());
}

#[tokio::test]
async fn eligible_invoices_are_open_and_due_date_ordered() {
    let app = spawn_engine();

    let later = sent_invoice(
        app.tenant_id,
        "INV-2025-0002",
        20_000,
        date(2025, 3, 1),
        date(2025, 3, 25),
    );
    let sooner = sent_invoice(
        app.tenant_id,
        "INV-2025-0001",
        10_000,
        date(2025, 3, 1),
        date(2025, 3, 12),
    );
    let mut paid = sent_invoice(
        app.tenant_id,
        "INV-2025-0003",
        30_000,
        date(2025, 3, 1),
        date(2025, 3, 10),
    );
    paid.status = "paid".to_string();
    paid.due_minor = 0;
    let foreign = sent_invoice(
        Uuid::new_v4(),
        "INV-2025-0004",
        40_000,
        date(2025, 3, 1),
        date(2025, 3, 11),
    );
    let (sooner_id, later_id) = (sooner.invoice_id, later.invoice_id);
    app.store.insert_invoice(later);
    app.store.insert_invoice(sooner);
    app.store.insert_invoice(paid);
    app.store.insert_invoice(foreign);

    let invoices = app
        .engine
        .list_eligible_invoices(app.tenant_id)
        .await
        .unwrap();
    let ids: Vec<Uuid> = invoices.iter().map(|i| i.invoice_id).collect();
    assert_eq!(ids, vec![sooner_id, later_id]);
}

#[tokio::test]
async fn stats_reflect_settled_and_open_deposits() {
    let app = spawn_engine();

    let mut settled = deposit(app.tenant_id, 118_000, date(2025, 3, 10));
    settled.description = "Uplata INV-2025-0042".to_string();
    settled.counterparty_name = Some("Gradeznik DOOEL".to_string());
    let invoice = sent_invoice(
        app.tenant_id,
        "INV-2025-0042",
        118_000,
        date(2025, 3, 5),
        date(2025, 3, 20),
    );
    let open = deposit(app.tenant_id, 5_000, date(2025, 3, 11));

    app.store.insert_transaction(settled);
    app.store.insert_transaction(open);
    app.store.insert_invoice(invoice);

    let report = app
        .engine
        .run_auto_match(app.tenant_id, &MatchPolicy::default(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.auto_matched, 1);

    let stats = app.engine.stats(app.tenant_id).await.unwrap();
    assert_eq!(stats.matched_count, 1);
    assert_eq!(stats.unmatched_count, 1);
    assert_eq!(stats.total_matched_amount_minor, 118_000);
    assert!(stats.average_confidence >= 90.0);

    // Another tenant sees an empty slate.
    let empty = app.engine.stats(Uuid::new_v4()).await.unwrap();
    assert_eq!(empty.matched_count, 0);
    assert_eq!(empty.unmatched_count, 0);
    assert_eq!(empty.total_matched_amount_minor, 0);
    assert_eq!(empty.average_confidence, 0.0);

    // The settled match shows up on the metrics surface too.
    let metrics = recon_engine::services::metrics::gather_metrics();
    assert!(metrics.contains("recon_transaction_matches_total"));
}
