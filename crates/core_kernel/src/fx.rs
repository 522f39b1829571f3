//! Exchange rates, currency conversion and FX gain/loss
//!
//! Rates are read from a [`RateSource`] (an externally maintained, read-mostly
//! rate table). Resolution never substitutes a default: when no rate can be
//! found the caller gets [`FxError::RateNotFound`].

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::CoreError;
use crate::money::{round2, Currency};
use crate::ports::{DomainPort, PortError};

/// Number of decimal places kept on exchange rates
pub const RATE_SCALE: u32 = 6;

/// Kind of rate published by the rate table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RateType {
    /// Daily spot rate
    #[default]
    Spot,
    /// Period average rate
    Average,
    /// Period closing rate
    Closing,
}

impl RateType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateType::Spot => "SPOT",
            RateType::Average => "AVERAGE",
            RateType::Closing => "CLOSING",
        }
    }
}

impl fmt::Display for RateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RateType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SPOT" => Ok(RateType::Spot),
            "AVERAGE" => Ok(RateType::Average),
            "CLOSING" => Ok(RateType::Closing),
            other => Err(CoreError::UnknownRateType(other.to_string())),
        }
    }
}

/// A published exchange rate: 1 unit of `from` = `rate` units of `to`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeRate {
    pub from: Currency,
    pub to: Currency,
    pub rate_date: NaiveDate,
    pub rate_type: RateType,
    pub rate: Decimal,
}

/// Errors raised while resolving or applying exchange rates
#[derive(Debug, Error)]
pub enum FxError {
    #[error("No {rate_type} rate from {from} to {to} on or before {date}")]
    RateNotFound {
        from: Currency,
        to: Currency,
        date: NaiveDate,
        rate_type: RateType,
    },

    #[error("Invalid rate {rate} from {from} to {to}")]
    InvalidRate {
        from: Currency,
        to: Currency,
        rate: Decimal,
    },

    #[error("Rate source error: {0}")]
    Source(#[from] PortError),
}

/// Port for reading the rate table
#[async_trait]
pub trait RateSource: DomainPort {
    /// The rate published exactly for `date`
    async fn rate_on(
        &self,
        from: Currency,
        to: Currency,
        date: NaiveDate,
        rate_type: RateType,
    ) -> Result<Option<ExchangeRate>, PortError>;

    /// The most recent rate with `rate_date <= date`
    async fn latest_rate_on_or_before(
        &self,
        from: Currency,
        to: Currency,
        date: NaiveDate,
        rate_type: RateType,
    ) -> Result<Option<ExchangeRate>, PortError>;
}

/// Resolves the rate converting `from` into `to` on `date`
///
/// Look-up order:
/// 1. exact rate for `date`
/// 2. most recent rate dated on or before `date`
/// 3. inverse (`1 / rate`) of the most recent reverse pair on or before `date`
///
/// Same-currency pairs resolve to `1.000000` without touching the source.
pub async fn resolve_exchange_rate(
    source: &dyn RateSource,
    from: Currency,
    to: Currency,
    date: NaiveDate,
    rate_type: RateType,
) -> Result<Decimal, FxError> {
    if from == to {
        return Ok(Decimal::new(1_000_000, RATE_SCALE));
    }

    if let Some(exact) = source.rate_on(from, to, date, rate_type).await? {
        return checked_rate(from, to, exact.rate);
    }

    if let Some(previous) = source.latest_rate_on_or_before(from, to, date, rate_type).await? {
        debug!(%from, %to, %date, rate_date = %previous.rate_date, "Using most recent prior rate");
        return checked_rate(from, to, previous.rate);
    }

    if let Some(reverse) = source.latest_rate_on_or_before(to, from, date, rate_type).await? {
        debug!(%from, %to, %date, rate_date = %reverse.rate_date, "Using inverse of reverse pair");
        let reverse_rate = checked_rate(to, from, reverse.rate)?;
        let inverse = Decimal::ONE
            .checked_div(reverse_rate)
            .ok_or(FxError::InvalidRate { from: to, to: from, rate: reverse_rate })?;
        return Ok(inverse.round_dp(RATE_SCALE));
    }

    Err(FxError::RateNotFound { from, to, date, rate_type })
}

fn checked_rate(from: Currency, to: Currency, rate: Decimal) -> Result<Decimal, FxError> {
    if rate <= Decimal::ZERO {
        return Err(FxError::InvalidRate { from, to, rate });
    }
    Ok(rate)
}

/// Converts `amount` from one currency to another: `round2(amount * rate)`
pub async fn convert_amount(
    source: &dyn RateSource,
    amount: Decimal,
    from: Currency,
    to: Currency,
    date: NaiveDate,
    rate_type: RateType,
) -> Result<Decimal, FxError> {
    let rate = resolve_exchange_rate(source, from, to, date, rate_type).await?;
    Ok(round2(amount * rate))
}

/// Classification of an FX difference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FxDirection {
    Gain,
    Loss,
}

/// Absolute FX difference between two legs and its direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FxGainLoss {
    pub amount: Decimal,
    pub direction: FxDirection,
}

impl FxGainLoss {
    /// Builds a gain/loss from a signed base-currency difference
    ///
    /// A zero difference is reported as a gain of zero.
    pub fn from_difference(difference: Decimal) -> Self {
        let direction = if difference >= Decimal::ZERO {
            FxDirection::Gain
        } else {
            FxDirection::Loss
        };
        Self {
            amount: round2(difference.abs()),
            direction,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }
}

/// Compares the base-currency value of an original and a settlement leg
///
/// Both legs are converted with their own rate and rounded; a non-negative
/// `settlement - original` difference is a gain.
pub fn calculate_fx_gain_loss(
    original_amount: Decimal,
    original_rate: Decimal,
    settlement_amount: Decimal,
    settlement_rate: Decimal,
) -> FxGainLoss {
    let original_base = round2(original_amount * original_rate);
    let settlement_base = round2(settlement_amount * settlement_rate);
    FxGainLoss::from_difference(settlement_base - original_base)
}

type RateKey = (Currency, Currency, RateType);

/// In-memory rate table
///
/// Suitable for tests and for deployments with a fixed, preloaded rate set.
#[derive(Debug, Default)]
pub struct StaticRateTable {
    rates: RwLock<HashMap<RateKey, BTreeMap<NaiveDate, Decimal>>>,
}

impl StaticRateTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a rate while building the table
    pub fn with_rate(
        mut self,
        from: Currency,
        to: Currency,
        date: NaiveDate,
        rate_type: RateType,
        rate: Decimal,
    ) -> Self {
        self.rates
            .get_mut()
            .entry((from, to, rate_type))
            .or_default()
            .insert(date, rate);
        self
    }

    /// Publishes (or replaces) a rate
    pub async fn insert(&self, rate: ExchangeRate) {
        self.rates
            .write()
            .await
            .entry((rate.from, rate.to, rate.rate_type))
            .or_default()
            .insert(rate.rate_date, rate.rate);
    }
}

impl DomainPort for StaticRateTable {}

#[async_trait]
impl RateSource for StaticRateTable {
    async fn rate_on(
        &self,
        from: Currency,
        to: Currency,
        date: NaiveDate,
        rate_type: RateType,
    ) -> Result<Option<ExchangeRate>, PortError> {
        let rates = self.rates.read().await;
        Ok(rates
            .get(&(from, to, rate_type))
            .and_then(|series| series.get(&date))
            .map(|rate| ExchangeRate { from, to, rate_date: date, rate_type, rate: *rate }))
    }

    async fn latest_rate_on_or_before(
        &self,
        from: Currency,
        to: Currency,
        date: NaiveDate,
        rate_type: RateType,
    ) -> Result<Option<ExchangeRate>, PortError> {
        let rates = self.rates.read().await;
        Ok(rates
            .get(&(from, to, rate_type))
            .and_then(|series| series.range(..=date).next_back())
            .map(|(rate_date, rate)| ExchangeRate {
                from,
                to,
                rate_date: *rate_date,
                rate_type,
                rate: *rate,
            }))
    }
}
