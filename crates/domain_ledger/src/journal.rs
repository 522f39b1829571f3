//! Journal entries and lines
//!
//! Entries are built as a [`JournalDraft`] and turned into an immutable,
//! posted [`JournalEntry`] by [`JournalDraft::post`], which is the only place
//! the balance invariant is checked. Nothing mutates an entry once posted;
//! corrections are new entries (see [`JournalDraft::mirror_of`]).

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use core_kernel::{
    round2, Currency, DocumentId, JournalEntryId, JournalLineId, PaymentId, TaxFilingId,
};

use crate::error::LedgerError;

/// Dimensional annotation of a journal line (department, project, document...)
///
/// Opaque to the engine; carried through posting and reversal unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Segment(BTreeMap<String, String>);

impl Segment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a dimension value
    pub fn with(mut self, dimension: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(dimension.into(), value.into());
        self
    }

    pub fn get(&self, dimension: &str) -> Option<&str> {
        self.0.get(dimension).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }
}

/// Debit or credit side of a line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EntrySide {
    Debit,
    Credit,
}

impl EntrySide {
    pub fn opposite(&self) -> Self {
        match self {
            EntrySide::Debit => EntrySide::Credit,
            EntrySide::Credit => EntrySide::Debit,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EntrySide::Debit => "DEBIT",
            EntrySide::Credit => "CREDIT",
        }
    }
}

impl FromStr for EntrySide {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DEBIT" => Ok(EntrySide::Debit),
            "CREDIT" => Ok(EntrySide::Credit),
            other => Err(LedgerError::validation(format!("unknown entry side {other}"))),
        }
    }
}

/// What produced an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum EntrySource {
    Document(DocumentId),
    Payment(PaymentId),
    Reversal(JournalEntryId),
    CorporateTax(TaxFilingId),
}

impl EntrySource {
    pub fn kind(&self) -> &'static str {
        match self {
            EntrySource::Document(_) => "document",
            EntrySource::Payment(_) => "payment",
            EntrySource::Reversal(_) => "reversal",
            EntrySource::CorporateTax(_) => "corporate_tax",
        }
    }

    pub fn reference(&self) -> uuid::Uuid {
        match self {
            EntrySource::Document(id) => *id.as_uuid(),
            EntrySource::Payment(id) => *id.as_uuid(),
            EntrySource::Reversal(id) => *id.as_uuid(),
            EntrySource::CorporateTax(id) => *id.as_uuid(),
        }
    }

    /// Rebuilds a source from its stored kind and reference
    pub fn from_parts(kind: &str, reference: uuid::Uuid) -> Result<Self, LedgerError> {
        match kind {
            "document" => Ok(EntrySource::Document(reference.into())),
            "payment" => Ok(EntrySource::Payment(reference.into())),
            "reversal" => Ok(EntrySource::Reversal(reference.into())),
            "corporate_tax" => Ok(EntrySource::CorporateTax(reference.into())),
            other => Err(LedgerError::validation(format!("unknown entry source {other}"))),
        }
    }
}

impl fmt::Display for EntrySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.reference())
    }
}

/// A single line of a journal entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalLine {
    pub id: JournalLineId,
    pub account_code: String,
    pub segment: Segment,
    pub debit: Decimal,
    pub credit: Decimal,
    pub memo: Option<String>,
}

impl JournalLine {
    /// Side carrying the non-zero amount (debit when both are zero)
    pub fn side(&self) -> EntrySide {
        if self.credit > Decimal::ZERO {
            EntrySide::Credit
        } else {
            EntrySide::Debit
        }
    }

    pub fn amount(&self) -> Decimal {
        self.debit + self.credit
    }
}

/// One atomic accounting event, always in the ledger's base currency
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: JournalEntryId,
    pub date: NaiveDate,
    pub currency: Currency,
    pub memo: String,
    pub posted: bool,
    pub fiscal_period: Option<String>,
    /// Opaque organisation partition key
    pub scope: Option<String>,
    pub source: EntrySource,
    /// Entry this one mirrors, for reversals
    pub reverses: Option<JournalEntryId>,
    pub lines: Vec<JournalLine>,
    pub created_at: DateTime<Utc>,
}

impl JournalEntry {
    pub fn total_debit(&self) -> Decimal {
        round2(self.lines.iter().map(|l| l.debit).sum())
    }

    pub fn total_credit(&self) -> Decimal {
        round2(self.lines.iter().map(|l| l.credit).sum())
    }

    pub fn is_balanced(&self) -> bool {
        self.total_debit() == self.total_credit()
    }

    /// Lines posted to an account
    pub fn lines_for<'a>(&'a self, account_code: &'a str) -> impl Iterator<Item = &'a JournalLine> + 'a {
        self.lines.iter().filter(move |l| l.account_code == account_code)
    }
}

/// A line of a draft, before rounding and validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftLine {
    pub account_code: String,
    pub side: EntrySide,
    pub amount: Decimal,
    pub segment: Segment,
    pub memo: Option<String>,
}

impl DraftLine {
    pub fn new(account_code: impl Into<String>, side: EntrySide, amount: Decimal) -> Self {
        Self {
            account_code: account_code.into(),
            side,
            amount,
            segment: Segment::new(),
            memo: None,
        }
    }

    pub fn with_segment(mut self, segment: Segment) -> Self {
        self.segment = segment;
        self
    }

    pub fn with_memo(mut self, memo: impl Into<String>) -> Self {
        self.memo = Some(memo.into());
        self
    }
}

/// Builder for a journal entry
#[derive(Debug, Clone)]
pub struct JournalDraft {
    pub date: NaiveDate,
    pub currency: Currency,
    pub memo: String,
    pub source: EntrySource,
    pub scope: Option<String>,
    pub fiscal_period: Option<String>,
    pub reverses: Option<JournalEntryId>,
    pub lines: Vec<DraftLine>,
}

impl JournalDraft {
    pub fn new(date: NaiveDate, currency: Currency, memo: impl Into<String>, source: EntrySource) -> Self {
        Self {
            date,
            currency,
            memo: memo.into(),
            source,
            scope: None,
            fiscal_period: None,
            reverses: None,
            lines: Vec::new(),
        }
    }

    pub fn scope(mut self, scope: Option<String>) -> Self {
        self.scope = scope;
        self
    }

    pub fn fiscal_period(mut self, period: impl Into<String>) -> Self {
        self.fiscal_period = Some(period.into());
        self
    }

    /// Adds a debit line
    pub fn debit(mut self, account_code: impl Into<String>, amount: Decimal) -> Self {
        self.lines.push(DraftLine::new(account_code, EntrySide::Debit, amount));
        self
    }

    /// Adds a credit line
    pub fn credit(mut self, account_code: impl Into<String>, amount: Decimal) -> Self {
        self.lines.push(DraftLine::new(account_code, EntrySide::Credit, amount));
        self
    }

    /// Adds a custom line
    pub fn line(mut self, line: DraftLine) -> Self {
        self.lines.push(line);
        self
    }

    pub fn push(&mut self, line: DraftLine) {
        self.lines.push(line);
    }

    /// Rounded debit and credit totals
    pub fn totals(&self) -> (Decimal, Decimal) {
        let mut debits = Decimal::ZERO;
        let mut credits = Decimal::ZERO;
        for line in &self.lines {
            match line.side {
                EntrySide::Debit => debits += round2(line.amount),
                EntrySide::Credit => credits += round2(line.amount),
            }
        }
        (round2(debits), round2(credits))
    }

    /// Builds the mirror of a posted entry: same accounts and segments, sides swapped
    pub fn mirror_of(entry: &JournalEntry, date: NaiveDate) -> Self {
        let mut draft = JournalDraft::new(
            date,
            entry.currency,
            format!("Reversal of {}: {}", entry.id, entry.memo),
            EntrySource::Reversal(entry.id),
        )
        .scope(entry.scope.clone());
        draft.fiscal_period = entry.fiscal_period.clone();
        draft.reverses = Some(entry.id);

        for line in &entry.lines {
            let mut mirrored = DraftLine::new(line.account_code.clone(), line.side().opposite(), line.amount())
                .with_segment(line.segment.clone());
            mirrored.memo = line.memo.clone();
            draft.push(mirrored);
        }
        draft
    }

    /// Validates the draft and produces a posted entry
    ///
    /// Every amount is rounded with `round2`; negative amounts are rejected and
    /// the debit total must equal the credit total exactly.
    pub fn post(self) -> Result<JournalEntry, LedgerError> {
        if self.lines.is_empty() {
            return Err(LedgerError::validation("journal entry has no lines"));
        }
        if let Some(line) = self.lines.iter().find(|l| l.amount < Decimal::ZERO) {
            return Err(LedgerError::validation(format!(
                "negative amount {} on account {}",
                line.amount, line.account_code
            )));
        }

        let (debits, credits) = self.totals();
        if debits != credits {
            return Err(LedgerError::Unbalanced { debits, credits });
        }
        if debits.is_zero() {
            return Err(LedgerError::validation("journal entry has no value"));
        }

        let lines = self
            .lines
            .into_iter()
            .map(|line| {
                let amount = round2(line.amount);
                let (debit, credit) = match line.side {
                    EntrySide::Debit => (amount, Decimal::ZERO),
                    EntrySide::Credit => (Decimal::ZERO, amount),
                };
                JournalLine {
                    id: JournalLineId::new(),
                    account_code: line.account_code,
                    segment: line.segment,
                    debit,
                    credit,
                    memo: line.memo,
                }
            })
            .collect();

        Ok(JournalEntry {
            id: JournalEntryId::new(),
            date: self.date,
            currency: self.currency,
            memo: self.memo,
            posted: true,
            fiscal_period: self.fiscal_period,
            scope: self.scope,
            source: self.source,
            reverses: self.reverses,
            lines,
            created_at: Utc::now(),
        })
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn posted_entries_always_balance(amounts in proptest::collection::vec(1i64..10_000_000i64, 1..8)) {
            let total: i64 = amounts.iter().sum();
            let mut draft = JournalDraft::new(
                NaiveDate::from_ymd_opt(2024, 6, 30).unwrap(),
                Currency::USD,
                "Split",
                EntrySource::Document(DocumentId::new()),
            )
            .debit("1100", Decimal::new(total, 2));
            for amount in &amounts {
                draft = draft.credit("4000", Decimal::new(*amount, 2));
            }

            let entry = draft.post().unwrap();
            prop_assert!(entry.is_balanced());

            let reversal = JournalDraft::mirror_of(&entry, entry.date).post().unwrap();
            prop_assert_eq!(reversal.total_debit(), entry.total_credit());
            prop_assert_eq!(reversal.total_credit(), entry.total_debit());
        }
    }
}
