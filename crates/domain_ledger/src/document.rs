//! Commercial documents (customer and supplier invoices)
//!
//! Documents are owned by a collaborator module. The ledger consumes their
//! currency, date, line items and precomputed GL distribution lines, and
//! writes back the booking rate, base-currency total, journal reference and
//! settlement status.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use core_kernel::{amount_with_tax, round2, Currency, DocumentId, JournalEntryId, TaxedAmount};

use crate::account::AccountRole;
use crate::error::LedgerError;
use crate::journal::{EntrySide, Segment};

/// Kind of commercial document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentKind {
    /// Sales invoice, settled by received payments (AR)
    CustomerInvoice,
    /// Purchase invoice, settled by payments made (AP)
    SupplierInvoice,
}

impl DocumentKind {
    /// Control account role reduced on settlement
    pub fn control_role(&self) -> AccountRole {
        match self {
            DocumentKind::CustomerInvoice => AccountRole::Receivable,
            DocumentKind::SupplierInvoice => AccountRole::Payable,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::CustomerInvoice => "CUSTOMER_INVOICE",
            DocumentKind::SupplierInvoice => "SUPPLIER_INVOICE",
        }
    }
}

impl FromStr for DocumentKind {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CUSTOMER_INVOICE" => Ok(DocumentKind::CustomerInvoice),
            "SUPPLIER_INVOICE" => Ok(DocumentKind::SupplierInvoice),
            other => Err(LedgerError::validation(format!("unknown document kind {other}"))),
        }
    }
}

/// Settlement status of a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    #[default]
    Unpaid,
    PartiallyPaid,
    Paid,
}

impl PaymentStatus {
    /// `Paid` at a zero balance, `PartiallyPaid` while something is paid and
    /// something is still owed, `Unpaid` otherwise
    pub fn from_amounts(paid: Decimal, balance: Decimal) -> Self {
        if balance <= Decimal::ZERO {
            PaymentStatus::Paid
        } else if paid > Decimal::ZERO {
            PaymentStatus::PartiallyPaid
        } else {
            PaymentStatus::Unpaid
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Unpaid => "UNPAID",
            PaymentStatus::PartiallyPaid => "PARTIALLY_PAID",
            PaymentStatus::Paid => "PAID",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "UNPAID" => Ok(PaymentStatus::Unpaid),
            "PARTIALLY_PAID" => Ok(PaymentStatus::PartiallyPaid),
            "PAID" => Ok(PaymentStatus::Paid),
            other => Err(LedgerError::validation(format!("unknown payment status {other}"))),
        }
    }
}

/// A priced line of a document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    /// Tax rate in percent; `None` means untaxed
    pub tax_rate: Option<Decimal>,
}

impl LineItem {
    pub fn new(description: impl Into<String>, quantity: Decimal, unit_price: Decimal) -> Self {
        Self {
            description: description.into(),
            quantity,
            unit_price,
            tax_rate: None,
        }
    }

    pub fn with_tax_rate(mut self, rate_percent: Decimal) -> Self {
        self.tax_rate = Some(rate_percent);
        self
    }

    /// Subtotal, tax and total in the document currency
    pub fn amounts(&self) -> TaxedAmount {
        amount_with_tax(self.quantity, self.unit_price, self.tax_rate)
    }
}

/// Precomputed booking instruction, in document currency
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlDistributionLine {
    pub side: EntrySide,
    pub account_code: String,
    #[serde(default)]
    pub segment: Segment,
    pub amount: Decimal,
    pub memo: Option<String>,
}

impl GlDistributionLine {
    pub fn debit(account_code: impl Into<String>, amount: Decimal) -> Self {
        Self::new(EntrySide::Debit, account_code, amount)
    }

    pub fn credit(account_code: impl Into<String>, amount: Decimal) -> Self {
        Self::new(EntrySide::Credit, account_code, amount)
    }

    fn new(side: EntrySide, account_code: impl Into<String>, amount: Decimal) -> Self {
        Self {
            side,
            account_code: account_code.into(),
            segment: Segment::new(),
            amount,
            memo: None,
        }
    }

    pub fn with_segment(mut self, segment: Segment) -> Self {
        self.segment = segment;
        self
    }
}

/// An AR or AP invoice as seen by the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    /// Human-readable number (e.g. "INV-0001")
    pub number: String,
    pub kind: DocumentKind,
    /// Customer or supplier reference, opaque to the ledger
    pub party: Option<String>,
    pub currency: Currency,
    pub date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub scope: Option<String>,
    pub line_items: Vec<LineItem>,
    pub distribution: Vec<GlDistributionLine>,
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
    /// Settled amount in document currency
    pub paid: Decimal,
    pub balance: Decimal,
    /// Booking rate, document currency to base currency
    pub exchange_rate: Option<Decimal>,
    pub base_currency_total: Option<Decimal>,
    /// Posting entry; `None` means not yet posted
    pub gl_journal: Option<JournalEntryId>,
    pub posted_at: Option<DateTime<Utc>>,
    pub payment_status: PaymentStatus,
}

impl Document {
    /// Creates an empty draft document
    ///
    /// # Arguments
    ///
    /// * `kind` - Customer or supplier invoice
    /// * `number` - Human-readable document number
    /// * `currency` - Document currency
    /// * `date` - Document (and booking) date
    pub fn new(kind: DocumentKind, number: impl Into<String>, currency: Currency, date: NaiveDate) -> Self {
        Self {
            id: DocumentId::new(),
            number: number.into(),
            kind,
            party: None,
            currency,
            date,
            due_date: None,
            scope: None,
            line_items: Vec::new(),
            distribution: Vec::new(),
            subtotal: Decimal::ZERO,
            tax: Decimal::ZERO,
            total: Decimal::ZERO,
            paid: Decimal::ZERO,
            balance: Decimal::ZERO,
            exchange_rate: None,
            base_currency_total: None,
            gl_journal: None,
            posted_at: None,
            payment_status: PaymentStatus::Unpaid,
        }
    }

    pub fn with_party(mut self, party: impl Into<String>) -> Self {
        self.party = Some(party.into());
        self
    }

    pub fn with_due_date(mut self, due_date: NaiveDate) -> Self {
        self.due_date = Some(due_date);
        self
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    /// Adds a line item and refreshes totals
    pub fn with_line_item(mut self, item: LineItem) -> Self {
        self.line_items.push(item);
        self.refresh_totals();
        self
    }

    pub fn with_distribution(mut self, line: GlDistributionLine) -> Self {
        self.distribution.push(line);
        self
    }

    /// Totals computed from line items in the document currency
    pub fn compute_totals(&self) -> TaxedAmount {
        self.line_items
            .iter()
            .map(LineItem::amounts)
            .fold(TaxedAmount::zero(), TaxedAmount::accumulate)
    }

    /// Recomputes subtotal, tax, total and balance from line items
    pub fn refresh_totals(&mut self) {
        let totals = self.compute_totals();
        self.subtotal = totals.subtotal;
        self.tax = totals.tax;
        self.total = totals.total;
        self.balance = round2(self.total - self.paid);
    }

    /// Applies the settled amount (document currency) and updates the status
    pub fn apply_settlement(&mut self, paid: Decimal) {
        self.paid = round2(paid);
        self.refresh_totals();
        self.payment_status = PaymentStatus::from_amounts(self.paid, self.balance);
    }

    pub fn is_posted(&self) -> bool {
        self.gl_journal.is_some()
    }

    /// Clears the posting link so the document can be amended and re-posted
    ///
    /// Returns the previous entry id. The entry itself stays in the ledger.
    pub fn unpost(&mut self) -> Option<JournalEntryId> {
        self.posted_at = None;
        self.exchange_rate = None;
        self.base_currency_total = None;
        self.gl_journal.take()
    }

    /// Booking rate, `1` when the document was booked in base currency
    pub fn booking_rate(&self) -> Decimal {
        self.exchange_rate.unwrap_or(Decimal::ONE)
    }

    /// Date from which overdue days are counted
    pub fn aging_date(&self) -> NaiveDate {
        self.due_date.unwrap_or(self.date)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn invoice() -> Document {
        Document::new(
            DocumentKind::CustomerInvoice,
            "INV-0001",
            Currency::AED,
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
        )
        .with_line_item(LineItem::new("Consulting", dec!(1), dec!(100.00)).with_tax_rate(dec!(5)))
    }

    #[test]
    fn test_totals_from_line_items() {
        let doc = invoice().with_line_item(LineItem::new("Travel", dec!(2), dec!(12.50)));

        assert_eq!(doc.subtotal, dec!(125.00));
        assert_eq!(doc.tax, dec!(5.00));
        assert_eq!(doc.total, dec!(130.00));
        assert_eq!(doc.balance, dec!(130.00));
    }

    #[test]
    fn test_tax_is_rounded_per_line() {
        let doc = Document::new(
            DocumentKind::SupplierInvoice,
            "BILL-7",
            Currency::AED,
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
        )
        .with_line_item(LineItem::new("A", dec!(1), dec!(0.10)).with_tax_rate(dec!(5)))
        .with_line_item(LineItem::new("B", dec!(1), dec!(0.10)).with_tax_rate(dec!(5)));

        // 0.005 rounds up to 0.01 on each line
        assert_eq!(doc.tax, dec!(0.02));
        assert_eq!(doc.total, dec!(0.22));
    }

    #[test]
    fn test_settlement_status() {
        let mut doc = invoice();

        doc.apply_settlement(dec!(70.00));
        assert_eq!(doc.balance, dec!(35.00));
        assert_eq!(doc.payment_status, PaymentStatus::PartiallyPaid);

        doc.apply_settlement(dec!(105.00));
        assert_eq!(doc.balance, dec!(0.00));
        assert_eq!(doc.payment_status, PaymentStatus::Paid);

        doc.apply_settlement(Decimal::ZERO);
        assert_eq!(doc.payment_status, PaymentStatus::Unpaid);
    }

    #[test]
    fn test_unpost_clears_booking_fields() {
        let mut doc = invoice();
        let entry = JournalEntryId::new();
        doc.gl_journal = Some(entry);
        doc.exchange_rate = Some(dec!(3.67));
        doc.posted_at = Some(Utc::now());

        assert_eq!(doc.unpost(), Some(entry));
        assert!(!doc.is_posted());
        assert!(doc.exchange_rate.is_none());
        assert_eq!(doc.booking_rate(), Decimal::ONE);
    }

    #[test]
    fn test_control_roles() {
        assert_eq!(DocumentKind::CustomerInvoice.control_role(), AccountRole::Receivable);
        assert_eq!(DocumentKind::SupplierInvoice.control_role(), AccountRole::Payable);
    }

    #[test]
    fn test_status_text_round_trip() {
        for status in [PaymentStatus::Unpaid, PaymentStatus::PartiallyPaid, PaymentStatus::Paid] {
            assert_eq!(status.as_str().parse::<PaymentStatus>().unwrap(), status);
        }
    }
}
