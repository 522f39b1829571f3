//! Port Adapters
//!
//! PostgreSQL implementations of the ports the ledger services depend on.
//! Each adapter:
//! - Implements the port trait (`LedgerStore`, `RateSource`)
//! - Uses the repository layer for SQL
//! - Translates `DatabaseError` into `PortError` at the boundary
//!
//! # Usage
//!
//! ```rust,ignore
//! use infra_db::adapters::{PgLedgerStore, PgRateTable};
//!
//! let store = PgLedgerStore::new(pool.clone());
//! let rates = PgRateTable::new(pool);
//! ```

pub mod ledger;
pub mod rates;

pub use ledger::{PgLedgerStore, PgLedgerTransaction};
pub use rates::PgRateTable;
