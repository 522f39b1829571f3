//! Shared fixtures for ledger integration tests

#![allow(dead_code)]

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

use core_kernel::{Currency, RateType, StaticRateTable};
use domain_ledger::{
    LedgerStore, CorporateTaxRule, Document, DocumentKind, GeneralLedger, GlDistributionLine, InMemoryLedgerStore,
    LedgerConfig, LineItem, Payment, PaymentDirection, PaymentTarget,
};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("domain_ledger=debug")
        .try_init();
}

pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

/// AED base ledger with the standard chart and a 9% AE corporate tax rule
pub fn config() -> LedgerConfig {
    LedgerConfig::default()
        .with_base_currency(Currency::AED)
        .with_tax_rule(CorporateTaxRule::new("AE", dec!(9), dec!(1000)))
}

/// USD -> AED at 3.67 from 2024-01-01
pub fn rates() -> StaticRateTable {
    StaticRateTable::new().with_rate(
        Currency::USD,
        Currency::AED,
        date(2024, 1, 1),
        RateType::Spot,
        dec!(3.670000),
    )
}

pub struct Harness {
    pub store: InMemoryLedgerStore,
    pub rates: Arc<StaticRateTable>,
    pub ledger: GeneralLedger,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_config(config()).await
    }

    pub async fn with_config(config: LedgerConfig) -> Self {
        init_tracing();
        let store = InMemoryLedgerStore::with_standard_chart().await;
        let rates = Arc::new(rates());
        let ledger = GeneralLedger::new(Arc::new(store.clone()), rates.clone(), config);
        Self { store, rates, ledger }
    }

    /// Committed state of a document
    pub async fn document(&self, document: &Document) -> Document {
        self.store.document(document.id).await.unwrap().expect("document exists")
    }

    /// Committed state of a payment
    pub async fn payment(&self, payment: &Payment) -> Payment {
        self.store.payment(payment.id).await.unwrap().expect("payment exists")
    }

    /// Stores a document and posts it
    pub async fn posted(&self, document: Document) -> Document {
        self.store.put_document(document.clone()).await;
        self.ledger.post_document(document.id).await.unwrap();
        self.document(&document).await
    }

    /// Stores a payment and posts it
    pub async fn pay(&self, payment: Payment) -> domain_ledger::SettlementOutcome {
        self.store.put_payment(payment.clone()).await;
        self.ledger.post_payment(payment.id).await.unwrap()
    }
}

/// Customer invoice: Dr AR total / Cr Sales subtotal / Cr VAT output tax
pub fn customer_invoice(number: &str, currency: Currency, day: NaiveDate, net: Decimal, vat: Option<Decimal>) -> Document {
    let mut item = LineItem::new("Services", Decimal::ONE, net);
    if let Some(rate) = vat {
        item = item.with_tax_rate(rate);
    }
    let document = Document::new(DocumentKind::CustomerInvoice, number, currency, day)
        .with_party("CUST-1")
        .with_line_item(item);

    let (total, subtotal, tax) = (document.total, document.subtotal, document.tax);
    let document = document
        .with_distribution(GlDistributionLine::debit("1100", total))
        .with_distribution(GlDistributionLine::credit("4000", subtotal));
    if tax > Decimal::ZERO {
        document.with_distribution(GlDistributionLine::credit("2100", tax))
    } else {
        document
    }
}

/// Supplier invoice: Dr Purchases subtotal / Dr VAT input tax / Cr AP total
pub fn supplier_invoice(number: &str, currency: Currency, day: NaiveDate, net: Decimal, vat: Option<Decimal>) -> Document {
    let mut item = LineItem::new("Goods", Decimal::ONE, net);
    if let Some(rate) = vat {
        item = item.with_tax_rate(rate);
    }
    let document = Document::new(DocumentKind::SupplierInvoice, number, currency, day)
        .with_party("SUPP-1")
        .with_line_item(item);

    let (total, subtotal, tax) = (document.total, document.subtotal, document.tax);
    let document = document
        .with_distribution(GlDistributionLine::credit("2000", total))
        .with_distribution(GlDistributionLine::debit("5000", subtotal));
    if tax > Decimal::ZERO {
        document.with_distribution(GlDistributionLine::debit("1200", tax))
    } else {
        document
    }
}

pub fn receipt(number: &str, amount: Decimal, currency: Currency, day: NaiveDate, document: &Document) -> Payment {
    Payment::new(
        PaymentDirection::Received,
        number,
        amount,
        currency,
        day,
        PaymentTarget::SingleInvoice(document.id),
    )
}

pub fn disbursement(number: &str, amount: Decimal, currency: Currency, day: NaiveDate, document: &Document) -> Payment {
    Payment::new(
        PaymentDirection::Made,
        number,
        amount,
        currency,
        day,
        PaymentTarget::SingleInvoice(document.id),
    )
}
