//! Payments and their allocations against documents

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use core_kernel::{round2, AllocationId, Currency, DocumentId, JournalEntryId, PaymentId};

use crate::document::DocumentKind;
use crate::error::LedgerError;

/// Direction of the cash movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PaymentDirection {
    /// Cash received from a customer
    Received,
    /// Cash paid to a supplier
    Made,
}

impl PaymentDirection {
    /// Document kind this direction settles
    pub fn settles(&self) -> DocumentKind {
        match self {
            PaymentDirection::Received => DocumentKind::CustomerInvoice,
            PaymentDirection::Made => DocumentKind::SupplierInvoice,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentDirection::Received => "RECEIVED",
            PaymentDirection::Made => "MADE",
        }
    }
}

impl FromStr for PaymentDirection {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RECEIVED" => Ok(PaymentDirection::Received),
            "MADE" => Ok(PaymentDirection::Made),
            other => Err(LedgerError::validation(format!("unknown payment direction {other}"))),
        }
    }
}

/// Part of a payment applied to one document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub id: AllocationId,
    pub document_id: DocumentId,
    /// Allocated amount in payment currency
    pub amount: Decimal,
    /// Rate converting payment currency into the document currency,
    /// captured at allocation time
    pub invoice_exchange_rate: Option<Decimal>,
    /// Set when the engine looked the invoice rate up rather than the caller
    #[serde(default)]
    pub invoice_rate_resolved: bool,
}

impl Allocation {
    pub fn new(document_id: DocumentId, amount: Decimal) -> Self {
        Self {
            id: AllocationId::new(),
            document_id,
            amount,
            invoice_exchange_rate: None,
            invoice_rate_resolved: false,
        }
    }

    pub fn with_invoice_rate(mut self, rate: Decimal) -> Self {
        self.invoice_exchange_rate = Some(rate);
        self
    }
}

/// Shape of a payment's settlement instruction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum PaymentTarget {
    /// The whole amount settles one document
    SingleInvoice(DocumentId),
    /// Explicit per-document allocations
    MultiAllocation(Vec<Allocation>),
}

/// Cash received or paid
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub number: String,
    pub direction: PaymentDirection,
    pub amount: Decimal,
    pub currency: Currency,
    pub date: NaiveDate,
    /// Bank account code; the configured `BANK` account when absent
    pub bank_account_code: Option<String>,
    /// Settlement rate, payment currency to base currency
    pub payment_fx_rate: Option<Decimal>,
    /// Set when the engine looked the settlement rate up rather than the caller
    #[serde(default)]
    pub payment_fx_rate_resolved: bool,
    pub scope: Option<String>,
    pub target: PaymentTarget,
    pub gl_journal: Option<JournalEntryId>,
    pub posted_at: Option<DateTime<Utc>>,
}

impl Payment {
    /// Creates an unposted payment
    pub fn new(
        direction: PaymentDirection,
        number: impl Into<String>,
        amount: Decimal,
        currency: Currency,
        date: NaiveDate,
        target: PaymentTarget,
    ) -> Self {
        Self {
            id: PaymentId::new(),
            number: number.into(),
            direction,
            amount,
            currency,
            date,
            bank_account_code: None,
            payment_fx_rate: None,
            payment_fx_rate_resolved: false,
            scope: None,
            target,
            gl_journal: None,
            posted_at: None,
        }
    }

    pub fn with_bank_account(mut self, code: impl Into<String>) -> Self {
        self.bank_account_code = Some(code.into());
        self
    }

    pub fn with_fx_rate(mut self, rate: Decimal) -> Self {
        self.payment_fx_rate = Some(rate);
        self
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    /// Allocations of this payment
    ///
    /// A single-invoice payment yields one allocation of the full amount whose
    /// id is derived from the payment id, so it is stable across calls.
    pub fn allocations(&self) -> Vec<Allocation> {
        match &self.target {
            PaymentTarget::SingleInvoice(document_id) => vec![Allocation {
                id: AllocationId::from_uuid(*self.id.as_uuid()),
                document_id: *document_id,
                amount: self.amount,
                invoice_exchange_rate: None,
                invoice_rate_resolved: false,
            }],
            PaymentTarget::MultiAllocation(allocations) => allocations.clone(),
        }
    }

    /// Sum of allocated amounts in payment currency
    pub fn allocated_total(&self) -> Decimal {
        round2(self.allocations().iter().map(|a| a.amount).sum())
    }

    /// Records invoice rates resolved at posting time on multi-allocations
    pub fn capture_invoice_rates(&mut self, rates: &[(AllocationId, Decimal)]) {
        if let PaymentTarget::MultiAllocation(allocations) = &mut self.target {
            for allocation in allocations.iter_mut() {
                if allocation.invoice_exchange_rate.is_some() {
                    continue;
                }
                if let Some((_, rate)) = rates.iter().find(|(id, _)| *id == allocation.id) {
                    allocation.invoice_exchange_rate = Some(*rate);
                    allocation.invoice_rate_resolved = true;
                }
            }
        }
    }

    pub fn is_posted(&self) -> bool {
        self.gl_journal.is_some()
    }

    /// Records a settlement rate looked up at posting time
    pub fn record_resolved_rate(&mut self, rate: Decimal) {
        self.payment_fx_rate = Some(rate);
        self.payment_fx_rate_resolved = true;
    }

    /// Clears the posting link so the payment can be amended and re-posted
    ///
    /// Rates the engine resolved are dropped so a re-post looks them up again
    /// for the (possibly amended) payment date; caller-supplied rates stay.
    pub fn unpost(&mut self) -> Option<JournalEntryId> {
        if self.payment_fx_rate_resolved {
            self.payment_fx_rate = None;
            self.payment_fx_rate_resolved = false;
        }
        if let PaymentTarget::MultiAllocation(allocations) = &mut self.target {
            for allocation in allocations.iter_mut().filter(|a| a.invoice_rate_resolved) {
                allocation.invoice_exchange_rate = None;
                allocation.invoice_rate_resolved = false;
            }
        }
        self.posted_at = None;
        self.gl_journal.take()
    }
}

/// An allocation of a posted payment, as used to recompute a document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettledAllocation {
    pub payment_id: PaymentId,
    pub payment_currency: Currency,
    pub payment_date: NaiveDate,
    pub allocation: Allocation,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 4, 10).unwrap()
    }

    #[test]
    fn test_single_invoice_allocation_is_stable() {
        let document = DocumentId::new();
        let payment = Payment::new(
            PaymentDirection::Received,
            "RCPT-1",
            dec!(70.00),
            Currency::AED,
            date(),
            PaymentTarget::SingleInvoice(document),
        );

        let first = payment.allocations();
        let second = payment.allocations();
        assert_eq!(first, second);
        assert_eq!(first[0].document_id, document);
        assert_eq!(first[0].amount, dec!(70.00));
        assert_eq!(payment.allocated_total(), dec!(70.00));
    }

    #[test]
    fn test_capture_keeps_existing_rates() {
        let fixed = Allocation::new(DocumentId::new(), dec!(10)).with_invoice_rate(dec!(0.5));
        let open = Allocation::new(DocumentId::new(), dec!(20));
        let mut payment = Payment::new(
            PaymentDirection::Made,
            "PMT-1",
            dec!(30),
            Currency::USD,
            date(),
            PaymentTarget::MultiAllocation(vec![fixed.clone(), open.clone()]),
        );

        payment.capture_invoice_rates(&[(fixed.id, dec!(9)), (open.id, dec!(0.92))]);

        let allocations = payment.allocations();
        assert_eq!(allocations[0].invoice_exchange_rate, Some(dec!(0.5)));
        assert_eq!(allocations[1].invoice_exchange_rate, Some(dec!(0.92)));
    }

    #[test]
    fn test_unpost_drops_only_resolved_rates() {
        let supplied = Allocation::new(DocumentId::new(), dec!(10)).with_invoice_rate(dec!(0.5));
        let open = Allocation::new(DocumentId::new(), dec!(20));
        let mut payment = Payment::new(
            PaymentDirection::Received,
            "RCPT-2",
            dec!(30),
            Currency::USD,
            date(),
            PaymentTarget::MultiAllocation(vec![supplied.clone(), open.clone()]),
        );
        payment.capture_invoice_rates(&[(open.id, dec!(0.92))]);
        payment.record_resolved_rate(dec!(3.67));
        payment.gl_journal = Some(JournalEntryId::new());
        payment.posted_at = Some(Utc::now());

        assert!(payment.unpost().is_some());

        assert!(payment.payment_fx_rate.is_none());
        let allocations = payment.allocations();
        assert_eq!(allocations[0].invoice_exchange_rate, Some(dec!(0.5)));
        assert!(allocations[1].invoice_exchange_rate.is_none());
        assert!(!allocations[1].invoice_rate_resolved);
    }

    #[test]
    fn test_unpost_keeps_supplied_settlement_rate() {
        let mut payment = Payment::new(
            PaymentDirection::Made,
            "PMT-2",
            dec!(30),
            Currency::USD,
            date(),
            PaymentTarget::SingleInvoice(DocumentId::new()),
        )
        .with_fx_rate(dec!(3.70));
        payment.gl_journal = Some(JournalEntryId::new());

        payment.unpost();

        assert_eq!(payment.payment_fx_rate, Some(dec!(3.70)));
        assert!(payment.posted_at.is_none());
    }

    #[test]
    fn test_direction_settles_matching_kind() {
        assert_eq!(PaymentDirection::Received.settles(), DocumentKind::CustomerInvoice);
        assert_eq!(PaymentDirection::Made.settles(), DocumentKind::SupplierInvoice);
    }
}
