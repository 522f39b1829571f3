//! Corporate tax rules and period filings

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use core_kernel::{round2, JournalEntryId, Rate, TaxFilingId};

use crate::error::LedgerError;

/// Corporate tax rule for a country
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorporateTaxRule {
    /// Country code (e.g. "AE")
    pub country: String,
    /// Rate in percent applied above the threshold
    pub rate_percent: Decimal,
    /// Profit exempt from tax
    #[serde(default)]
    pub threshold: Decimal,
}

impl CorporateTaxRule {
    pub fn new(country: impl Into<String>, rate_percent: Decimal, threshold: Decimal) -> Self {
        Self {
            country: country.into(),
            rate_percent,
            threshold,
        }
    }

    /// Applies the rule to a period profit
    ///
    /// No tax is due when profit is not positive or does not exceed the
    /// threshold; otherwise `tax = round2((profit - threshold) * rate / 100)`.
    pub fn compute(&self, profit: Decimal) -> TaxComputation {
        let profit = round2(profit);
        if profit <= Decimal::ZERO || profit <= self.threshold {
            return TaxComputation {
                profit,
                taxable_base: Decimal::ZERO,
                tax: Decimal::ZERO,
            };
        }

        let taxable_base = round2(profit - self.threshold);
        TaxComputation {
            profit,
            taxable_base,
            tax: Rate::from_percentage(self.rate_percent).apply(taxable_base),
        }
    }
}

/// Result of a corporate tax computation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TaxComputation {
    pub profit: Decimal,
    pub taxable_base: Decimal,
    pub tax: Decimal,
}

impl TaxComputation {
    pub fn is_taxable(&self) -> bool {
        self.tax > Decimal::ZERO
    }
}

/// Identity of a tax period
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaxPeriodKey {
    pub country: String,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub scope: Option<String>,
}

impl TaxPeriodKey {
    pub fn new(
        country: impl Into<String>,
        period_start: NaiveDate,
        period_end: NaiveDate,
        scope: Option<String>,
    ) -> Self {
        Self {
            country: country.into(),
            period_start,
            period_end,
            scope,
        }
    }

    /// Stable text form, also used as the lock key
    pub fn lock_key(&self) -> String {
        format!(
            "filing:{}:{}:{}:{}",
            self.country,
            self.period_start,
            self.period_end,
            self.scope.as_deref().unwrap_or("")
        )
    }
}

impl fmt::Display for TaxPeriodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}..{}", self.country, self.period_start, self.period_end)?;
        if let Some(scope) = &self.scope {
            write!(f, " [{scope}]")?;
        }
        Ok(())
    }
}

/// Lifecycle of a filing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FilingState {
    Accrued,
    /// Locked against further accrual or reversal
    Filed,
    Reversed,
}

impl FilingState {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilingState::Accrued => "ACCRUED",
            FilingState::Filed => "FILED",
            FilingState::Reversed => "REVERSED",
        }
    }
}

impl fmt::Display for FilingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilingState {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACCRUED" => Ok(FilingState::Accrued),
            "FILED" => Ok(FilingState::Filed),
            "REVERSED" => Ok(FilingState::Reversed),
            other => Err(LedgerError::validation(format!("unknown filing state {other}"))),
        }
    }
}

/// Corporate tax filing for one period
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorporateTaxFiling {
    pub id: TaxFilingId,
    pub key: TaxPeriodKey,
    pub state: FilingState,
    pub computation: TaxComputation,
    pub accrual_entry: Option<JournalEntryId>,
    pub reversal_entry: Option<JournalEntryId>,
    pub accrued_at: DateTime<Utc>,
    pub filed_at: Option<DateTime<Utc>>,
    pub reversed_at: Option<DateTime<Utc>>,
}

impl CorporateTaxFiling {
    /// A new accrued filing
    pub fn accrued(
        id: TaxFilingId,
        key: TaxPeriodKey,
        computation: TaxComputation,
        entry: JournalEntryId,
    ) -> Self {
        Self {
            id,
            key,
            state: FilingState::Accrued,
            computation,
            accrual_entry: Some(entry),
            reversal_entry: None,
            accrued_at: Utc::now(),
            filed_at: None,
            reversed_at: None,
        }
    }

    /// Re-accrues on the same row after a reversal
    pub fn reaccrue(&mut self, computation: TaxComputation, entry: JournalEntryId) {
        self.state = FilingState::Accrued;
        self.computation = computation;
        self.accrual_entry = Some(entry);
        self.reversal_entry = None;
        self.accrued_at = Utc::now();
        self.filed_at = None;
        self.reversed_at = None;
    }

    /// ACCRUED -> FILED
    pub fn file(&mut self) -> Result<(), LedgerError> {
        match self.state {
            FilingState::Accrued => {
                self.state = FilingState::Filed;
                self.filed_at = Some(Utc::now());
                Ok(())
            }
            other => Err(LedgerError::invalid_transition(other, FilingState::Filed)),
        }
    }

    /// Records the reversal entry and moves to REVERSED
    pub fn mark_reversed(&mut self, reversal: JournalEntryId) {
        self.state = FilingState::Reversed;
        self.reversal_entry = Some(reversal);
        self.reversed_at = Some(Utc::now());
    }

    pub fn is_locked(&self) -> bool {
        self.state == FilingState::Filed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn key() -> TaxPeriodKey {
        TaxPeriodKey::new(
            "AE",
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
            None,
        )
    }

    #[test]
    fn test_profit_below_threshold_is_untaxed() {
        let rule = CorporateTaxRule::new("AE", dec!(9), dec!(1200));
        let result = rule.compute(dec!(1000));
        assert_eq!(result.tax, Decimal::ZERO);
        assert!(!result.is_taxable());
    }

    #[test]
    fn test_profit_equal_to_threshold_is_untaxed() {
        let rule = CorporateTaxRule::new("AE", dec!(9), dec!(1000));
        assert_eq!(rule.compute(dec!(1000)).tax, Decimal::ZERO);
    }

    #[test]
    fn test_tax_on_excess_over_threshold() {
        let rule = CorporateTaxRule::new("AE", dec!(9), dec!(1000));
        let result = rule.compute(dec!(1500));
        assert_eq!(result.taxable_base, dec!(500.00));
        assert_eq!(result.tax, dec!(45.00));
    }

    #[test]
    fn test_loss_is_untaxed() {
        let rule = CorporateTaxRule::new("AE", dec!(9), Decimal::ZERO);
        assert_eq!(rule.compute(dec!(-250)).tax, Decimal::ZERO);
    }

    #[test]
    fn test_filing_transitions() {
        let mut filing = CorporateTaxFiling::accrued(
            TaxFilingId::new(),
            key(),
            TaxComputation::default(),
            JournalEntryId::new(),
        );
        filing.file().unwrap();
        assert!(filing.is_locked());
        assert!(filing.filed_at.is_some());

        let err = filing.file().unwrap_err();
        assert!(matches!(err, LedgerError::InvalidTransition { .. }));
    }

    #[test]
    fn test_lock_key_includes_scope() {
        let mut scoped = key();
        scoped.scope = Some("org-1".into());
        assert_ne!(key().lock_key(), scoped.lock_key());
        assert!(scoped.to_string().contains("org-1"));
    }
}
