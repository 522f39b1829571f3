//! Infrastructure Database Layer
//!
//! This crate provides the PostgreSQL persistence for the general ledger,
//! using SQLx.
//!
//! # Architecture
//!
//! The crate follows the repository pattern: `repositories` holds the SQL
//! and row mapping, `adapters` implements the domain ports on top of it.
//!
//! # Schema
//!
//! Migrations under `migrations/` are embedded in the binary and applied by
//! [`run_migrations`] or by [`create_pool`] when `run_migrations` is set.
//! Journal tables are append-only; documents and payments keep their full
//! body as JSONB next to the columns the ledger queries.
//!
//! # Example
//!
//! ```rust,ignore
//! use infra_db::{create_pool, DatabaseConfig, PgLedgerStore, PgRateTable};
//!
//! let pool = create_pool(DatabaseConfig::new("postgres://localhost/ledger")).await?;
//! let store = PgLedgerStore::new(pool.clone());
//! let rates = PgRateTable::new(pool);
//! ```

pub mod pool;
pub mod error;
pub mod repositories;
pub mod adapters;

pub use pool::{DatabasePool, DatabaseConfig, create_pool, create_pool_from_url, run_migrations};
pub use error::DatabaseError;
pub use adapters::{PgLedgerStore, PgLedgerTransaction, PgRateTable};
