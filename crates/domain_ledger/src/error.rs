//! Ledger domain errors

use rust_decimal::Decimal;
use thiserror::Error;

use core_kernel::{FxError, PortError};

use crate::account::AccountRole;

/// Errors that can occur in the ledger domain
///
/// Validation failures (`EmptyDocument`, `ZeroTotal`, `MissingDistribution`,
/// `MissingAccount`, ...) are caller errors and are never retried. `Unbalanced`
/// is an internal invariant violation detected before commit.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Document has no line items
    #[error("Document {0} has no line items")]
    EmptyDocument(String),

    /// Document totals round to zero
    #[error("Document {0} total rounds to 0.00")]
    ZeroTotal(String),

    /// Document has no GL distribution lines
    #[error("Document {0} has no GL distribution lines")]
    MissingDistribution(String),

    /// No account configured for a role
    #[error("No ledger account configured for role {0}")]
    MissingAccount(AccountRole),

    /// Account code not present in the chart of accounts
    #[error("Unknown ledger account: {0}")]
    UnknownAccount(String),

    /// No corporate tax rule for a country
    #[error("No corporate tax rule configured for {0}")]
    MissingTaxRule(String),

    /// Other invalid input
    #[error("Validation error: {0}")]
    Validation(String),

    /// Exchange-rate failure, including `RateNotFound`
    #[error(transparent)]
    Fx(#[from] FxError),

    /// Tax period is filed and locked
    #[error("Tax period {0} is filed and locked")]
    PeriodLocked(String),

    /// Entry debits and credits differ
    #[error("Unbalanced journal entry: debits={debits}, credits={credits}")]
    Unbalanced {
        debits: Decimal,
        credits: Decimal,
    },

    /// Lifecycle transition not allowed
    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// Referenced record does not exist
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Persistence failure
    #[error("Store error: {0}")]
    Store(#[from] PortError),
}

impl LedgerError {
    pub fn validation(message: impl Into<String>) -> Self {
        LedgerError::Validation(message.into())
    }

    pub fn invalid_transition(from: impl ToString, to: impl ToString) -> Self {
        LedgerError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        LedgerError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Returns true for caller errors that must be fixed before re-invoking
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            LedgerError::EmptyDocument(_)
                | LedgerError::ZeroTotal(_)
                | LedgerError::MissingDistribution(_)
                | LedgerError::MissingAccount(_)
                | LedgerError::UnknownAccount(_)
                | LedgerError::MissingTaxRule(_)
                | LedgerError::Validation(_)
        )
    }

    /// Returns true when no exchange rate could be resolved
    pub fn is_rate_not_found(&self) -> bool {
        matches!(self, LedgerError::Fx(FxError::RateNotFound { .. }))
    }
}
