//! Request validation.
//!
//! Stores accept whatever they are given; these checks belong to whoever
//! produces records.

use crate::error::ValidationError;
use crate::record::ConversionRequest;

/// Check a currency code: exactly three ASCII letters.
pub fn validate_currency(code: &str) -> Result<(), ValidationError> {
    if code.len() == 3 && code.bytes().all(|b| b.is_ascii_alphabetic()) {
        Ok(())
    } else {
        Err(ValidationError::InvalidCurrency(code.to_string()))
    }
}

/// Validate a request's currencies and amount.
pub fn validate_request(request: &ConversionRequest) -> Result<(), ValidationError> {
    validate_currency(&request.from)?;
    validate_currency(&request.to)?;

    if request.from.eq_ignore_ascii_case(&request.to) {
        return Err(ValidationError::SameCurrency(request.from.to_ascii_uppercase()));
    }

    if !request.amount.is_finite() || request.amount <= 0.0 {
        return Err(ValidationError::InvalidAmount(request.amount));
    }

    Ok(())
}
