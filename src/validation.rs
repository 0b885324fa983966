//! Argument validation utilities shared by handlers and the stream manager.

use crate::types::{Error, Result};

/// Validate that a string is not empty.
pub fn validate_non_empty(s: &str, field: &str) -> Result<()> {
    if s.is_empty() {
        return Err(Error::validation(format!("{} cannot be empty", field)));
    }
    Ok(())
}

/// Validate that a value is finite and strictly positive.
pub fn validate_positive(n: f64, field: &str) -> Result<()> {
    if !n.is_finite() || n <= 0.0 {
        return Err(Error::validation(format!(
            "{} must be a positive number, got {}",
            field, n
        )));
    }
    Ok(())
}

/// Validate that a value lies in `[min, max]`.
pub fn validate_range(n: f64, min: f64, max: f64, field: &str) -> Result<()> {
    if !n.is_finite() || n < min || n > max {
        return Err(Error::validation(format!(
            "{} must be between {} and {}, got {}",
            field, min, max, n
        )));
    }
    Ok(())
}
