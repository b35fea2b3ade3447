//! Error types for the core crate.

use thiserror::Error;

/// A specialized Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// The error type for core operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    /// Error in date calculations or invalid date.
    #[error("Invalid date: {message}")]
    InvalidDate {
        /// Description of the date error.
        message: String,
    },

    /// A tenor string could not be parsed.
    #[error("Invalid tenor: {text}")]
    InvalidTenor {
        /// The offending tenor text.
        text: String,
    },
}

impl CoreError {
    /// Creates an invalid date error.
    #[must_use]
    pub fn invalid_date(message: impl Into<String>) -> Self {
        Self::InvalidDate {
            message: message.into(),
        }
    }

    /// Creates an invalid tenor error.
    #[must_use]
    pub fn invalid_tenor(text: impl Into<String>) -> Self {
        Self::InvalidTenor { text: text.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoreError::invalid_date("2025-02-30");
        assert!(format!("{err}").contains("2025-02-30"));

        let err = CoreError::invalid_tenor("13Q");
        assert!(format!("{err}").contains("13Q"));
    }
}
