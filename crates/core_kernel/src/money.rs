//! Currency codes and fixed-point rounding
//!
//! All monetary values are `rust_decimal::Decimal`. Every amount that is
//! persisted or compared by the ledger passes through [`round2`] first, so
//! independently computed subtotal, tax and total fields can never drift apart
//! by a cent.

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// Currency codes following ISO 4217
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    USD,
    EUR,
    GBP,
    JPY,
    CHF,
    INR,
    AUD,
    CAD,
    SGD,
    HKD,
    AED,
    SAR,
    QAR,
}

impl Currency {
    /// Returns the number of decimal places for this currency
    pub fn decimal_places(&self) -> u32 {
        match self {
            Currency::JPY => 0,
            _ => 2,
        }
    }

    /// Returns the ISO 4217 code
    pub fn code(&self) -> &'static str {
        match self {
            Currency::USD => "USD",
            Currency::EUR => "EUR",
            Currency::GBP => "GBP",
            Currency::JPY => "JPY",
            Currency::CHF => "CHF",
            Currency::INR => "INR",
            Currency::AUD => "AUD",
            Currency::CAD => "CAD",
            Currency::SGD => "SGD",
            Currency::HKD => "HKD",
            Currency::AED => "AED",
            Currency::SAR => "SAR",
            Currency::QAR => "QAR",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl FromStr for Currency {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "USD" => Ok(Currency::USD),
            "EUR" => Ok(Currency::EUR),
            "GBP" => Ok(Currency::GBP),
            "JPY" => Ok(Currency::JPY),
            "CHF" => Ok(Currency::CHF),
            "INR" => Ok(Currency::INR),
            "AUD" => Ok(Currency::AUD),
            "CAD" => Ok(Currency::CAD),
            "SGD" => Ok(Currency::SGD),
            "HKD" => Ok(Currency::HKD),
            "AED" => Ok(Currency::AED),
            "SAR" => Ok(Currency::SAR),
            "QAR" => Ok(Currency::QAR),
            other => Err(CoreError::UnknownCurrency(other.to_string())),
        }
    }
}

/// Rounds an amount to 2 decimal places, half away from zero
///
/// This is the single rounding rule of the ledger: `0.005 -> 0.01`,
/// `-0.005 -> -0.01`.
pub fn round2(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Subtotal, tax and total of a priced quantity, each independently rounded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TaxedAmount {
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
}

impl TaxedAmount {
    /// Zero amounts
    pub fn zero() -> Self {
        Self::default()
    }

    /// Adds another taxed amount component-wise, re-rounding each field
    pub fn accumulate(self, other: TaxedAmount) -> Self {
        Self {
            subtotal: round2(self.subtotal + other.subtotal),
            tax: round2(self.tax + other.tax),
            total: round2(self.total + other.total),
        }
    }
}

/// Computes `(subtotal, tax, total)` for `quantity * unit_price` at an optional
/// tax rate expressed in percent
///
/// `tax = round2(subtotal * rate / 100)`; an absent rate means no tax.
pub fn amount_with_tax(
    quantity: Decimal,
    unit_price: Decimal,
    rate_percent: Option<Decimal>,
) -> TaxedAmount {
    let subtotal = round2(quantity * unit_price);
    let tax = match rate_percent {
        Some(rate) => Rate::from_percentage(rate).apply(subtotal),
        None => Decimal::ZERO,
    };

    TaxedAmount {
        subtotal,
        tax,
        total: round2(subtotal + tax),
    }
}

/// A percentage rate (VAT, corporate tax)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Rate {
    /// The rate in percent (e.g., 5 for 5%)
    percent: Decimal,
}

impl Rate {
    /// Creates a rate from a percentage (e.g., 9 for 9%)
    pub fn from_percentage(percent: Decimal) -> Self {
        Self { percent }
    }

    /// Returns the rate as a percentage
    pub fn as_percentage(&self) -> Decimal {
        self.percent
    }

    /// Returns the rate as a decimal fraction
    pub fn as_decimal(&self) -> Decimal {
        self.percent / dec!(100)
    }

    /// Applies this rate to an amount, rounded with [`round2`]
    pub fn apply(&self, amount: Decimal) -> Decimal {
        round2(amount * self.percent / dec!(100))
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.percent.normalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round2_half_up() {
        assert_eq!(round2(dec!(1.005)), dec!(1.01));
        assert_eq!(round2(dec!(1.004)), dec!(1.00));
        assert_eq!(round2(dec!(2.675)), dec!(2.68));
        assert_eq!(round2(dec!(-1.005)), dec!(-1.01));
    }

    #[test]
    fn test_amount_with_tax() {
        let amount = amount_with_tax(dec!(1), dec!(100.00), Some(dec!(5)));
        assert_eq!(amount.subtotal, dec!(100.00));
        assert_eq!(amount.tax, dec!(5.00));
        assert_eq!(amount.total, dec!(105.00));
    }

    #[test]
    fn test_amount_without_rate_has_no_tax() {
        let amount = amount_with_tax(dec!(3), dec!(9.99), None);
        assert_eq!(amount.subtotal, dec!(29.97));
        assert_eq!(amount.tax, Decimal::ZERO);
        assert_eq!(amount.total, dec!(29.97));
    }

    #[test]
    fn test_tax_rounds_independently() {
        // 33.33 * 5% = 1.6665
        let amount = amount_with_tax(dec!(1), dec!(33.33), Some(dec!(5)));
        assert_eq!(amount.tax, dec!(1.67));
        assert_eq!(amount.total, dec!(35.00));
    }

    #[test]
    fn test_currency_parsing() {
        assert_eq!("aed".parse::<Currency>().unwrap(), Currency::AED);
        assert_eq!(" USD ".parse::<Currency>().unwrap(), Currency::USD);
        assert!(matches!("XYZ".parse::<Currency>(), Err(CoreError::UnknownCurrency(_))));
    }

    #[test]
    fn test_rate_display() {
        assert_eq!(Rate::from_percentage(dec!(9.00)).to_string(), "9%");
        assert_eq!(Rate::from_percentage(dec!(9)).as_decimal(), dec!(0.09));
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn round2_is_idempotent(mantissa in -1_000_000_000i64..1_000_000_000i64, scale in 0u32..6u32) {
            let value = Decimal::new(mantissa, scale);
            let once = round2(value);
            prop_assert_eq!(round2(once), once);
            prop_assert!(once.scale() <= 2);
        }

        #[test]
        fn total_is_subtotal_plus_tax(
            qty in 1i64..1_000i64,
            price_minor in 0i64..10_000_000i64,
            rate in 0i64..30i64
        ) {
            let amount = amount_with_tax(
                Decimal::from(qty),
                Decimal::new(price_minor, 2),
                Some(Decimal::from(rate)),
            );
            prop_assert_eq!(amount.total, amount.subtotal + amount.tax);
        }
    }
}
