//! Repository implementations for ledger tables
//!
//! Repositories hold the SQL and the row <-> domain mapping. They take a
//! `&mut PgConnection` so the same query runs inside a ledger transaction
//! (`&mut *tx`) or on a pooled connection (`&mut *pool.acquire().await?`).
//!
//! Row structs mirror the table columns; enum columns are stored as their
//! upper-case text form and parsed back with [`parse_column`].

pub mod accounts;
pub mod journal;
pub mod documents;
pub mod payments;
pub mod filings;
pub mod rates;

pub use accounts::{AccountRepository, AccountRow};
pub use journal::{JournalRepository, JournalEntryRow, JournalLineRow, PostedLineRow};
pub use documents::DocumentRepository;
pub use payments::{PaymentRepository, SettledAllocationRow};
pub use filings::{FilingRepository, FilingRow};
pub use rates::{ExchangeRateRow, RateRepository};

use std::fmt::Display;
use std::str::FromStr;

use crate::error::DatabaseError;

/// Parses a text column into a domain enum or code
pub(crate) fn parse_column<T>(column: &str, value: &str) -> Result<T, DatabaseError>
where
    T: FromStr,
    T::Err: Display,
{
    value.parse().map_err(|e| DatabaseError::corrupt(column, e))
}
