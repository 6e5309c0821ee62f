//! Error types for the core record model.

use thiserror::Error;

/// Validation errors for record contents.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("invalid currency code {0:?}: expected three ASCII letters")]
    InvalidCurrency(String),

    #[error("invalid amount {0}: must be finite and greater than zero")]
    InvalidAmount(f64),

    #[error("source and target currency are both {0}")]
    SameCurrency(String),
}
