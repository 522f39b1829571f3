//! Core Kernel - Foundational types and utilities for the general ledger engine
//!
//! This crate provides the building blocks shared by the ledger domain and its
//! infrastructure adapters:
//! - Currency codes and the single rounding rule (`round2`) used for every amount
//! - Exchange-rate resolution, currency conversion and FX gain/loss
//! - Strongly typed identifiers
//! - Port error and health-check infrastructure for adapters

pub mod money;
pub mod fx;
pub mod identifiers;
pub mod ports;
pub mod error;

pub use money::{Currency, Rate, TaxedAmount, round2, amount_with_tax};
pub use fx::{
    RateType, ExchangeRate, RateSource, StaticRateTable, FxError,
    FxDirection, FxGainLoss, resolve_exchange_rate, convert_amount, calculate_fx_gain_loss,
};
pub use identifiers::{
    JournalEntryId, JournalLineId, DocumentId, PaymentId, AllocationId, TaxFilingId,
};
pub use ports::{PortError, DomainPort, HealthCheckable, HealthCheckResult, AdapterHealth};
pub use error::CoreError;
