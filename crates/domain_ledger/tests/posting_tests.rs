//! Posting service tests

mod common;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

use core_kernel::Currency;
use domain_ledger::{
    Document, DocumentKind, EntrySource, GlDistributionLine, LedgerError, LedgerStore, LineItem,
    PaymentStatus,
};

use common::{customer_invoice, date, supplier_invoice, Harness};

// ============================================================================
// Happy path
// ============================================================================

mod posting {
    use super::*;

    #[tokio::test]
    async fn test_post_customer_invoice() {
        let h = Harness::new().await;
        let invoice = customer_invoice("INV-1", Currency::AED, date(2024, 3, 1), dec!(100.00), Some(dec!(5)));
        h.store.put_document(invoice.clone()).await;

        let outcome = h.ledger.post_document(invoice.id).await.unwrap();

        assert!(outcome.created);
        let entry = &outcome.entry;
        assert!(entry.posted);
        assert!(entry.is_balanced());
        assert_eq!(entry.currency, Currency::AED);
        assert_eq!(entry.date, date(2024, 3, 1));
        assert_eq!(entry.source, EntrySource::Document(invoice.id));
        assert_eq!(entry.total_debit(), dec!(105.00));
        assert_eq!(entry.lines.len(), 3);

        let stored = h.document(&invoice).await;
        assert_eq!(stored.gl_journal, Some(entry.id));
        assert!(stored.posted_at.is_some());
        assert_eq!(stored.total, dec!(105.00));
        assert_eq!(stored.balance, dec!(105.00));
        assert_eq!(stored.exchange_rate, Some(Decimal::ONE));
        assert_eq!(stored.base_currency_total, Some(dec!(105.00)));
        assert_eq!(stored.payment_status, PaymentStatus::Unpaid);
    }

    #[tokio::test]
    async fn test_post_supplier_invoice() {
        let h = Harness::new().await;
        let bill = supplier_invoice("BILL-1", Currency::AED, date(2024, 3, 1), dec!(200.00), Some(dec!(5)));
        h.store.put_document(bill.clone()).await;

        let entry = h.ledger.post_document(bill.id).await.unwrap().entry;

        let ap: Decimal = entry.lines_for("2000").map(|l| l.credit).sum();
        let vat_in: Decimal = entry.lines_for("1200").map(|l| l.debit).sum();
        assert_eq!(ap, dec!(210.00));
        assert_eq!(vat_in, dec!(10.00));
    }

    #[tokio::test]
    async fn test_cross_currency_invoice_is_booked_in_base_currency() {
        let h = Harness::new().await;
        let invoice = customer_invoice("INV-USD", Currency::USD, date(2024, 2, 1), dec!(100.00), None);
        h.store.put_document(invoice.clone()).await;

        let entry = h.ledger.post_document(invoice.id).await.unwrap().entry;

        assert_eq!(entry.currency, Currency::AED);
        assert_eq!(entry.total_debit(), dec!(367.00));
        assert!(entry.memo.contains("USD"));

        let stored = h.document(&invoice).await;
        assert_eq!(stored.base_currency_total, Some(dec!(367.00)));
        assert_eq!(stored.exchange_rate, Some(dec!(3.67)));
        // document amounts stay in document currency
        assert_eq!(stored.total, dec!(100.00));
    }

    #[tokio::test]
    async fn test_segments_are_carried_to_lines() {
        let h = Harness::new().await;
        let invoice = Document::new(DocumentKind::CustomerInvoice, "INV-SEG", Currency::AED, date(2024, 3, 1))
            .with_line_item(LineItem::new("Design", dec!(1), dec!(80)))
            .with_distribution(GlDistributionLine::debit("1100", dec!(80)))
            .with_distribution(
                GlDistributionLine::credit("4000", dec!(80))
                    .with_segment(domain_ledger::Segment::new().with("department", "studio")),
            );
        h.store.put_document(invoice.clone()).await;

        let entry = h.ledger.post_document(invoice.id).await.unwrap().entry;

        let sales = entry.lines_for("4000").next().unwrap();
        assert_eq!(sales.segment.get("department"), Some("studio"));
    }
}

// ============================================================================
// Idempotence and amendment
// ============================================================================

mod idempotence {
    use super::*;

    #[tokio::test]
    async fn test_posting_twice_returns_the_same_entry() {
        let h = Harness::new().await;
        let invoice = customer_invoice("INV-1", Currency::AED, date(2024, 3, 1), dec!(100.00), Some(dec!(5)));
        h.store.put_document(invoice.clone()).await;

        let first = h.ledger.post_document(invoice.id).await.unwrap();
        let second = h.ledger.post_document(invoice.id).await.unwrap();

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.entry.id, second.entry.id);
        assert_eq!(h.store.journal_entries().await.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_posting_creates_one_entry() {
        let h = Harness::new().await;
        let invoice = customer_invoice("INV-RACE", Currency::USD, date(2024, 3, 1), dec!(250.00), Some(dec!(5)));
        h.store.put_document(invoice.clone()).await;

        let ledger = Arc::new(h.ledger.clone());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let ledger = Arc::clone(&ledger);
            let id = invoice.id;
            handles.push(tokio::spawn(async move { ledger.post_document(id).await }));
        }

        let mut created = 0;
        let mut ids = Vec::new();
        for handle in handles {
            let outcome = handle.await.unwrap().unwrap();
            if outcome.created {
                created += 1;
            }
            ids.push(outcome.entry.id);
        }

        assert_eq!(created, 1);
        assert!(ids.iter().all(|id| *id == ids[0]));
        assert_eq!(h.store.journal_entries().await.len(), 1);
    }

    #[tokio::test]
    async fn test_amended_document_gets_a_new_entry() {
        let h = Harness::new().await;
        let invoice = customer_invoice("INV-1", Currency::AED, date(2024, 3, 1), dec!(100.00), Some(dec!(5)));
        let original = h.posted(invoice.clone()).await;
        let first_entry = original.gl_journal.unwrap();

        let previous = h.ledger.unpost_document(invoice.id).await.unwrap();
        assert_eq!(previous, Some(first_entry));

        // the document module edits the draft and supplies new distribution lines
        let mut amended = h.document(&invoice).await;
        amended.line_items = vec![LineItem::new("Services", dec!(1), dec!(120.00)).with_tax_rate(dec!(5))];
        amended.refresh_totals();
        amended.distribution = vec![
            GlDistributionLine::debit("1100", dec!(126.00)),
            GlDistributionLine::credit("4000", dec!(120.00)),
            GlDistributionLine::credit("2100", dec!(6.00)),
        ];
        h.store.put_document(amended).await;

        let reposted = h.ledger.post_document(invoice.id).await.unwrap();

        assert!(reposted.created);
        assert_ne!(reposted.entry.id, first_entry);
        assert_eq!(reposted.entry.total_debit(), dec!(126.00));
        // the orphaned entry is kept
        assert_eq!(h.store.journal_entries().await.len(), 2);
        assert!(h.store.journal_entry(first_entry).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_reverse_and_unpost_cancels_the_original_entry() {
        let h = Harness::new().await;
        let invoice = customer_invoice("INV-1", Currency::AED, date(2024, 3, 1), dec!(100.00), Some(dec!(5)));
        let original = h.posted(invoice.clone()).await;

        let reversal = h.ledger.reverse_and_unpost_document(invoice.id).await.unwrap();

        assert_eq!(reversal.reverses, original.gl_journal);
        assert!(!h.document(&invoice).await.is_posted());
        let balance = h.ledger.build_trial_balance(None, None).await.unwrap();
        assert!(balance.rows.is_empty());

        let reposted = h.ledger.post_document(invoice.id).await.unwrap();
        assert!(reposted.created);
        assert_ne!(Some(reposted.entry.id), original.gl_journal);
    }
}

// ============================================================================
// Failures leave nothing behind
// ============================================================================

mod failures {
    use super::*;

    async fn assert_nothing_posted(h: &Harness, document: &Document) {
        assert!(h.store.journal_entries().await.is_empty());
        assert!(!h.document(document).await.is_posted());
    }

    #[tokio::test]
    async fn test_empty_document() {
        let h = Harness::new().await;
        let empty = Document::new(DocumentKind::CustomerInvoice, "INV-EMPTY", Currency::AED, date(2024, 3, 1))
            .with_distribution(GlDistributionLine::debit("1100", dec!(1)));
        h.store.put_document(empty.clone()).await;

        let err = h.ledger.post_document(empty.id).await.unwrap_err();

        assert!(matches!(err, LedgerError::EmptyDocument(ref n) if n == "INV-EMPTY"));
        assert!(err.is_validation());
        assert_nothing_posted(&h, &empty).await;
    }

    #[tokio::test]
    async fn test_zero_total() {
        let h = Harness::new().await;
        let zero = Document::new(DocumentKind::CustomerInvoice, "INV-ZERO", Currency::AED, date(2024, 3, 1))
            .with_line_item(LineItem::new("Free sample", dec!(1), dec!(0.004)))
            .with_distribution(GlDistributionLine::debit("1100", dec!(0)));
        h.store.put_document(zero.clone()).await;

        let err = h.ledger.post_document(zero.id).await.unwrap_err();

        assert!(matches!(err, LedgerError::ZeroTotal(_)));
        assert_nothing_posted(&h, &zero).await;
    }

    #[tokio::test]
    async fn test_missing_distribution() {
        let h = Harness::new().await;
        let bare = Document::new(DocumentKind::CustomerInvoice, "INV-BARE", Currency::AED, date(2024, 3, 1))
            .with_line_item(LineItem::new("Services", dec!(1), dec!(100)));
        h.store.put_document(bare.clone()).await;

        let err = h.ledger.post_document(bare.id).await.unwrap_err();

        assert!(matches!(err, LedgerError::MissingDistribution(_)));
        assert_nothing_posted(&h, &bare).await;
    }

    #[tokio::test]
    async fn test_missing_rate() {
        let h = Harness::new().await;
        let invoice = customer_invoice("INV-EUR", Currency::EUR, date(2024, 3, 1), dec!(100.00), None);
        h.store.put_document(invoice.clone()).await;

        let err = h.ledger.post_document(invoice.id).await.unwrap_err();

        assert!(err.is_rate_not_found());
        assert_nothing_posted(&h, &invoice).await;
    }

    #[tokio::test]
    async fn test_rate_dated_after_document_is_not_used() {
        let h = Harness::new().await;
        let invoice = customer_invoice("INV-OLD", Currency::USD, date(2023, 12, 31), dec!(100.00), None);
        h.store.put_document(invoice.clone()).await;

        let err = h.ledger.post_document(invoice.id).await.unwrap_err();
        assert!(err.is_rate_not_found());
    }

    #[tokio::test]
    async fn test_unknown_account() {
        let h = Harness::new().await;
        let invoice = Document::new(DocumentKind::CustomerInvoice, "INV-9999", Currency::AED, date(2024, 3, 1))
            .with_line_item(LineItem::new("Services", dec!(1), dec!(100)))
            .with_distribution(GlDistributionLine::debit("1100", dec!(100)))
            .with_distribution(GlDistributionLine::credit("9999", dec!(100)));
        h.store.put_document(invoice.clone()).await;

        let err = h.ledger.post_document(invoice.id).await.unwrap_err();

        assert!(matches!(err, LedgerError::UnknownAccount(ref code) if code == "9999"));
        assert_nothing_posted(&h, &invoice).await;
    }

    #[tokio::test]
    async fn test_unbalanced_distribution() {
        let h = Harness::new().await;
        let invoice = Document::new(DocumentKind::CustomerInvoice, "INV-BAD", Currency::AED, date(2024, 3, 1))
            .with_line_item(LineItem::new("Services", dec!(1), dec!(100)).with_tax_rate(dec!(5)))
            .with_distribution(GlDistributionLine::debit("1100", dec!(105)))
            .with_distribution(GlDistributionLine::credit("4000", dec!(100)));
        h.store.put_document(invoice.clone()).await;

        let err = h.ledger.post_document(invoice.id).await.unwrap_err();

        assert!(matches!(
            err,
            LedgerError::Unbalanced { debits, credits } if debits == dec!(105.00) && credits == dec!(100.00)
        ));
        assert_nothing_posted(&h, &invoice).await;
    }

    #[tokio::test]
    async fn test_conversion_rounding_drift_is_not_absorbed() {
        let h = Harness::new().await;
        // 0.03 * 3.67 = 0.11, but 3 x (0.01 * 3.67) = 3 x 0.04 = 0.12
        let invoice = Document::new(DocumentKind::CustomerInvoice, "INV-DRIFT", Currency::USD, date(2024, 3, 1))
            .with_line_item(LineItem::new("Micro", dec!(1), dec!(0.03)))
            .with_distribution(GlDistributionLine::debit("1100", dec!(0.03)))
            .with_distribution(GlDistributionLine::credit("4000", dec!(0.01)))
            .with_distribution(GlDistributionLine::credit("4000", dec!(0.01)))
            .with_distribution(GlDistributionLine::credit("4000", dec!(0.01)));
        h.store.put_document(invoice.clone()).await;

        let err = h.ledger.post_document(invoice.id).await.unwrap_err();

        assert!(matches!(
            err,
            LedgerError::Unbalanced { debits, credits } if debits == dec!(0.11) && credits == dec!(0.12)
        ));
        assert_nothing_posted(&h, &invoice).await;
    }

    #[tokio::test]
    async fn test_unknown_document() {
        let h = Harness::new().await;
        let err = h.ledger.post_document(core_kernel::DocumentId::new()).await.unwrap_err();
        assert!(matches!(err, LedgerError::Store(ref e) if e.is_not_found()));
    }
}
