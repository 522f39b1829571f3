//! Core error types used across the system

use thiserror::Error;

use crate::fx::FxError;

/// Core error type for the kernel
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Unknown currency code: {0}")]
    UnknownCurrency(String),

    #[error("Unknown rate type: {0}")]
    UnknownRateType(String),

    #[error("FX error: {0}")]
    Fx(#[from] FxError),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl CoreError {
    pub fn validation(message: impl Into<String>) -> Self {
        CoreError::Validation(message.into())
    }
}
