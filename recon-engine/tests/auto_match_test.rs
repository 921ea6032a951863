//! Integration tests for the batch auto-matching path.

mod common;

use common::{date, deposit, rule, sent_invoice, spawn_engine};
use recon_engine::models::{InvoiceStatus, ProcessingStatus};
use recon_engine::store::MatchStore;
use recon_engine::{MatchError, MatchPolicy};
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn exact_match_settles_and_closes_invoice() {
    let app = spawn_engine();

    let mut txn = deposit(app.tenant_id, 118_000, date(2025, 3, 10));
    txn.description = "Uplata po faktura INV-2025-0042".to_string();
    txn.counterparty_name = Some("Gradeznik DOOEL".to_string());
    let invoice = sent_invoice(
        app.tenant_id,
        "INV-2025-0042",
        118_000,
        date(2025, 3, 5),
        // Two days before the transaction date: a slightly late payment
        // still auto-matches on amount + reference + name.
        date(2025, 3, 8),
    );
    let (txn_id, invoice_id) = (txn.transaction_id, invoice.invoice_id);
    app.store.insert_transaction(txn);
    app.store.insert_invoice(invoice);

    let report = app
        .engine
        .run_auto_match(app.tenant_id, &MatchPolicy::default(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.considered, 1);
    assert_eq!(report.auto_matched, 1);
    assert_eq!(report.applied_minor, 118_000);
    assert!(report.failed.is_empty());

    let settled = app
        .store
        .get_transaction(app.tenant_id, txn_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(settled.processing_status(), ProcessingStatus::Processed);
    assert_eq!(settled.matched_invoice_id, Some(invoice_id));
    assert!(settled.matched_payment_id.is_some());
    assert!(settled.match_confidence.unwrap() >= 90.0);
    assert!(settled.matched_at.is_some());

    let paid = app
        .store
        .get_invoice(app.tenant_id, invoice_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(paid.invoice_status(), InvoiceStatus::Paid);
    assert_eq!(paid.due_minor, 0);

    let payments = app.store.payments_for_transaction(txn_id);
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].amount_minor, 118_000);
    assert_eq!(payments[0].matched_by, "auto");
}

#[tokio::test]
async fn ambiguous_candidates_are_suggested_not_settled() {
    let app = spawn_engine();

    let mut txn = deposit(app.tenant_id, 100_000, date(2025, 3, 10));
    txn.counterparty_name = Some("Pekara Uno".to_string());
    let txn_id = txn.transaction_id;

    // Two open invoices for the same customer, same amount, both in the
    // lookback window and neither referenced in the description.
    let mut first = sent_invoice(
        app.tenant_id,
        "INV-2025-0100",
        100_000,
        date(2025, 3, 4),
        date(2025, 3, 20),
    );
    first.customer_name = "Pekara Uno".to_string();
    let mut second = sent_invoice(
        app.tenant_id,
        "INV-2025-0101",
        100_000,
        date(2025, 3, 6),
        date(2025, 3, 20),
    );
    second.customer_name = "Pekara Uno".to_string();
    let (first_id, second_id) = (first.invoice_id, second.invoice_id);
    app.store.insert_transaction(txn);
    app.store.insert_invoice(first);
    app.store.insert_invoice(second);

    let report = app
        .engine
        .run_auto_match(app.tenant_id, &MatchPolicy::default(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.auto_matched, 0);
    assert_eq!(report.suggested, 1);

    // Nothing moved: the transaction is still open and both invoices are
    // still sent with their full due amount.
    let txn = app
        .store
        .get_transaction(app.tenant_id, txn_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(txn.processing_status(), ProcessingStatus::Unprocessed);
    for invoice_id in [first_id, second_id] {
        let invoice = app
            .store
            .get_invoice(app.tenant_id, invoice_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(invoice.invoice_status(), InvoiceStatus::Sent);
        assert_eq!(invoice.due_minor, 100_000);
    }
}

#[tokio::test]
async fn oldest_transaction_wins_a_contested_invoice() {
    let app = spawn_engine();

    let invoice = sent_invoice(
        app.tenant_id,
        "INV-2025-0007",
        75_000,
        date(2025, 3, 3),
        date(2025, 3, 17),
    );
    let invoice_id = invoice.invoice_id;

    let mut older = deposit(app.tenant_id, 75_000, date(2025, 3, 5));
    older.description = "Uplata INV-2025-0007".to_string();
    older.counterparty_name = Some("Gradeznik DOOEL".to_string());
    let mut newer = deposit(app.tenant_id, 75_000, date(2025, 3, 9));
    newer.description = "Uplata INV-2025-0007".to_string();
    newer.counterparty_name = Some("Gradeznik DOOEL".to_string());
    let (older_id, newer_id) = (older.transaction_id, newer.transaction_id);

    app.store.insert_invoice(invoice);
    app.store.insert_transaction(newer);
    app.store.insert_transaction(older);

    let report = app
        .engine
        .run_auto_match(app.tenant_id, &MatchPolicy::default(), &CancellationToken::new())
        .await
        .unwrap();

    // The older deposit settles the invoice; by the time the newer one is
    // scored the invoice is paid and out of the candidate set.
    assert_eq!(report.auto_matched, 1);
    let payments = app.store.payments_for_transaction(older_id);
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].invoice_id, invoice_id);
    assert!(app.store.payments_for_transaction(newer_id).is_empty());
}

#[tokio::test]
async fn outgoing_transactions_are_never_considered_candidates() {
    let app = spawn_engine();

    // An outgoing line with an otherwise perfect textual match.
    let mut txn = deposit(app.tenant_id, -118_000, date(2025, 3, 10));
    txn.description = "Povrat INV-2025-0042".to_string();
    let invoice = sent_invoice(
        app.tenant_id,
        "INV-2025-0042",
        118_000,
        date(2025, 3, 5),
        date(2025, 3, 20),
    );
    app.store.insert_transaction(txn);
    app.store.insert_invoice(invoice);

    let report = app
        .engine
        .run_auto_match(app.tenant_id, &MatchPolicy::default(), &CancellationToken::new())
        .await
        .unwrap();

    // Outgoing transactions are not part of the backlog at all.
    assert_eq!(report.considered, 0);
    assert_eq!(report.auto_matched, 0);
}

#[tokio::test]
async fn cross_tenant_invoice_is_invisible() {
    let app = spawn_engine();
    let other_tenant = uuid::Uuid::new_v4();

    let mut txn = deposit(app.tenant_id, 118_000, date(2025, 3, 10));
    txn.description = "Uplata INV-2025-0042".to_string();
    // Identical amount and reference, wrong tenant.
    let invoice = sent_invoice(
        other_tenant,
        "INV-2025-0042",
        118_000,
        date(2025, 3, 5),
        date(2025, 3, 20),
    );
    let invoice_id = invoice.invoice_id;
    app.store.insert_transaction(txn);
    app.store.insert_invoice(invoice);

    let report = app
        .engine
        .run_auto_match(app.tenant_id, &MatchPolicy::default(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.considered, 1);
    assert_eq!(report.no_match, 1);
    let untouched = app
        .store
        .get_invoice(other_tenant, invoice_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(untouched.due_minor, 118_000);
}

#[tokio::test]
async fn ignore_rule_skips_without_mutating() {
    let app = spawn_engine();

    let mut txn = deposit(app.tenant_id, 2_500, date(2025, 3, 10));
    txn.description = "Pripisana kamata za mart".to_string();
    let txn_id = txn.transaction_id;
    app.store.insert_transaction(txn);
    app.store
        .insert_rule(rule(app.tenant_id, "kamata", "contains", "ignore", None));

    let report = app
        .engine
        .run_auto_match(app.tenant_id, &MatchPolicy::default(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.ignored_by_rule, 1);
    assert_eq!(report.auto_matched, 0);
    let txn = app
        .store
        .get_transaction(app.tenant_id, txn_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(txn.processing_status(), ProcessingStatus::Unprocessed);
}

#[tokio::test]
async fn pin_customer_rule_disambiguates() {
    let app = spawn_engine();

    let mut txn = deposit(app.tenant_id, 90_000, date(2025, 3, 10));
    txn.description = "Uplata od kooperant".to_string();
    let txn_id = txn.transaction_id;

    let first = sent_invoice(
        app.tenant_id,
        "INV-2025-0200",
        90_000,
        date(2025, 3, 4),
        date(2025, 3, 20),
    );
    let second = sent_invoice(
        app.tenant_id,
        "INV-2025-0201",
        90_000,
        date(2025, 3, 6),
        date(2025, 3, 20),
    );
    let pinned_customer = second.customer_id;
    let pinned_invoice = second.invoice_id;
    app.store.insert_transaction(txn);
    app.store.insert_invoice(first);
    app.store.insert_invoice(second);
    app.store.insert_rule(rule(
        app.tenant_id,
        "kooperant",
        "contains",
        "pin_customer",
        Some(pinned_customer),
    ));

    // With a lowered auto threshold the pinned pool has a single clear
    // candidate; without the pin these two would be ambiguous.
    let policy = MatchPolicy {
        auto_accept_threshold: 50.0,
        ..MatchPolicy::default()
    };
    let report = app
        .engine
        .run_auto_match(app.tenant_id, &policy, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.auto_matched, 1);
    let payments = app.store.payments_for_transaction(txn_id);
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].invoice_id, pinned_invoice);
}

#[tokio::test]
async fn cancelled_run_stops_before_processing() {
    let app = spawn_engine();

    let mut txn = deposit(app.tenant_id, 118_000, date(2025, 3, 10));
    txn.description = "Uplata INV-2025-0042".to_string();
    let txn_id = txn.transaction_id;
    let invoice = sent_invoice(
        app.tenant_id,
        "INV-2025-0042",
        118_000,
        date(2025, 3, 5),
        date(2025, 3, 20),
    );
    app.store.insert_transaction(txn);
    app.store.insert_invoice(invoice);

    let cancel = CancellationToken::new();
    cancel.cancel();
    let report = app
        .engine
        .run_auto_match(app.tenant_id, &MatchPolicy::default(), &cancel)
        .await
        .unwrap();

    assert_eq!(report.considered, 0);
    let txn = app
        .store
        .get_transaction(app.tenant_id, txn_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(txn.processing_status(), ProcessingStatus::Unprocessed);
}

#[tokio::test]
async fn malformed_policy_is_rejected_before_any_work() {
    let app = spawn_engine();

    let policy = MatchPolicy {
        amount_tolerance: -0.5,
        ..MatchPolicy::default()
    };
    let err = app
        .engine
        .run_auto_match(app.tenant_id, &policy, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, MatchError::Validation(_)));
}
