//! PostgreSQL adapter tests
//!
//! These run against the database named by `TEST_DATABASE_URL` and are
//! skipped when it is not set. Every test uses fresh ids, so a shared
//! database can be reused between runs.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::{Arc, Once};

use core_kernel::{AdapterHealth, Currency, ExchangeRate, HealthCheckable, RateSource, RateType};
use domain_ledger::{
    Document, DocumentKind, GeneralLedger, GlDistributionLine, LedgerConfig, LedgerStore,
    LedgerTransaction, LineItem,
    Payment, PaymentDirection, PaymentStatus, PaymentTarget,
};
use infra_db::{create_pool, DatabaseConfig, PgLedgerStore, PgRateTable};

static INIT: Once = Once::new();

fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("info,infra_db=debug,sqlx=warn")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

struct PgHarness {
    store: PgLedgerStore,
    rates: PgRateTable,
    ledger: GeneralLedger,
}

async fn harness() -> Option<PgHarness> {
    init_tracing();
    let Ok(url) = std::env::var("TEST_DATABASE_URL") else {
        eprintln!("TEST_DATABASE_URL not set, skipping");
        return None;
    };

    let pool = create_pool(DatabaseConfig::new(url).max_connections(4).run_migrations(true))
        .await
        .expect("connect to test database");
    let store = PgLedgerStore::new(pool.clone());
    store.seed_standard_chart().await.expect("seed chart");
    let rates = PgRateTable::new(pool);

    let ledger = GeneralLedger::new(
        Arc::new(store.clone()),
        Arc::new(rates.clone()),
        LedgerConfig::default().with_base_currency(Currency::AED),
    );
    Some(PgHarness { store, rates, ledger })
}

fn date(month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, month, day).unwrap()
}

fn invoice(currency: Currency, net: Decimal) -> Document {
    let document = Document::new(DocumentKind::CustomerInvoice, "INV-PG", currency, date(3, 1))
        .with_due_date(date(3, 31))
        .with_line_item(LineItem::new("Consulting", Decimal::ONE, net));
    let total = document.total;
    document
        .with_distribution(GlDistributionLine::debit("1100", total))
        .with_distribution(GlDistributionLine::credit("4000", total))
}

#[tokio::test]
async fn test_health_check_reports_healthy() {
    let Some(h) = harness().await else { return };
    let result = h.store.health_check().await;
    assert_eq!(result.status, AdapterHealth::Healthy);
    assert_eq!(result.adapter_id, "postgres-ledger-store");
}

#[tokio::test]
async fn test_post_document_persists_entry_and_link() {
    let Some(h) = harness().await else { return };
    let document = invoice(Currency::AED, dec!(250));
    h.store.put_document(&document).await.unwrap();

    let outcome = h.ledger.post_document(document.id).await.unwrap();
    assert!(outcome.created);

    let stored = h.store.document(document.id).await.unwrap().unwrap();
    assert_eq!(stored.gl_journal, Some(outcome.entry.id));

    let entry = h.store.journal_entry(outcome.entry.id).await.unwrap().unwrap();
    assert!(entry.is_balanced());
    assert_eq!(entry.lines.len(), 2);
    assert_eq!(entry.lines[0].account_code, "1100");
    assert_eq!(entry.lines[0].debit, dec!(250.00));

    let again = h.ledger.post_document(document.id).await.unwrap();
    assert!(!again.created);
    assert_eq!(again.entry.id, outcome.entry.id);
}

#[tokio::test]
async fn test_settlement_closes_document() {
    let Some(h) = harness().await else { return };
    let document = invoice(Currency::AED, dec!(100));
    h.store.put_document(&document).await.unwrap();
    h.ledger.post_document(document.id).await.unwrap();

    let payment = Payment::new(
        PaymentDirection::Received,
        "RCPT-PG",
        dec!(100),
        Currency::AED,
        date(3, 15),
        PaymentTarget::SingleInvoice(document.id),
    );
    h.store.put_payment(&payment).await.unwrap();

    let outcome = h.ledger.post_payment(payment.id).await.unwrap();
    assert!(!outcome.already_posted);
    assert_eq!(outcome.closed_documents, vec!["INV-PG".to_string()]);

    let stored = h.store.document(document.id).await.unwrap().unwrap();
    assert_eq!(stored.balance, Decimal::ZERO);
    assert_eq!(stored.payment_status, PaymentStatus::Paid);

    let open = h.store.open_documents(Some(DocumentKind::CustomerInvoice)).await.unwrap();
    assert!(open.iter().all(|d| d.id != document.id));
}

#[tokio::test]
async fn test_reversal_is_linked_to_source() {
    let Some(h) = harness().await else { return };
    let document = invoice(Currency::AED, dec!(40));
    h.store.put_document(&document).await.unwrap();
    let posted = h.ledger.post_document(document.id).await.unwrap();

    let reversal = h.ledger.reverse_journal(posted.entry.id).await.unwrap();

    let stored = h.store.journal_entry(reversal.id).await.unwrap().unwrap();
    assert_eq!(stored.reverses, Some(posted.entry.id));
    assert_eq!(stored.lines[0].credit, dec!(40.00));

    let by_source = h.store.entries_for_source(*posted.entry.id.as_uuid()).await.unwrap();
    assert_eq!(by_source.len(), 1);
    assert_eq!(by_source[0].id, reversal.id);
}

#[tokio::test]
async fn test_rate_table_falls_back_to_prior_date() {
    let Some(h) = harness().await else { return };
    h.rates
        .insert(&ExchangeRate {
            from: Currency::GBP,
            to: Currency::AED,
            rate_date: date(1, 2),
            rate_type: RateType::Closing,
            rate: dec!(4.650000),
        })
        .await
        .unwrap();

    let exact = h
        .rates
        .rate_on(Currency::GBP, Currency::AED, date(1, 3), RateType::Closing)
        .await
        .unwrap();
    assert!(exact.is_none());

    let latest = h
        .rates
        .latest_rate_on_or_before(Currency::GBP, Currency::AED, date(1, 3), RateType::Closing)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(latest.rate_date, date(1, 2));
    assert_eq!(latest.rate, dec!(4.65));
}

#[tokio::test]
async fn test_lock_of_missing_document_is_not_found() {
    let Some(h) = harness().await else { return };
    let mut tx = h.store.begin().await.unwrap();
    let err = tx.lock_document(core_kernel::DocumentId::new()).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_save_without_lock_is_refused() {
    let Some(h) = harness().await else { return };
    let document = invoice(Currency::AED, dec!(10));
    let mut tx = h.store.begin().await.unwrap();
    let err = tx.save_document(&document).await.unwrap_err();
    assert!(matches!(err, core_kernel::PortError::Conflict { .. }));
}
