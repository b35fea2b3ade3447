//! Error types for mathematical operations.

use thiserror::Error;

/// A specialized Result type for mathematical operations.
pub type MathResult<T> = Result<T, MathError>;

/// Errors that can occur during mathematical operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MathError {
    /// Least-squares solver failed to converge.
    #[error("Convergence failed after {iterations} iterations (residual: {residual:.2e})")]
    ConvergenceFailed {
        /// Number of iterations attempted.
        iterations: usize,
        /// Final residual norm.
        residual: f64,
    },

    /// Matrix is singular (not invertible).
    #[error("Singular matrix: cannot solve normal equations")]
    SingularMatrix,

    /// Insufficient data points for operation.
    #[error("Insufficient data: need at least {required}, got {actual}")]
    InsufficientData {
        /// Minimum required points.
        required: usize,
        /// Actual number of points.
        actual: usize,
    },

    /// Invalid input parameter.
    #[error("Invalid input: {reason}")]
    InvalidInput {
        /// Description of the invalid input.
        reason: String,
    },

    /// Knot abscissae are not strictly increasing.
    #[error("Knots not strictly increasing at index {index}: {prev} >= {current}")]
    NonIncreasingKnots {
        /// Index of the violation.
        index: usize,
        /// Previous knot x.
        prev: f64,
        /// Current knot x.
        current: f64,
    },
}

impl MathError {
    /// Creates a convergence failed error.
    #[must_use]
    pub fn convergence_failed(iterations: usize, residual: f64) -> Self {
        Self::ConvergenceFailed {
            iterations,
            residual,
        }
    }

    /// Creates an invalid input error.
    #[must_use]
    pub fn invalid_input(reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            reason: reason.into(),
        }
    }

    /// Creates an insufficient data error.
    #[must_use]
    pub fn insufficient_data(required: usize, actual: usize) -> Self {
        Self::InsufficientData { required, actual }
    }

    /// Creates a non-increasing knots error.
    #[must_use]
    pub fn non_increasing_knots(index: usize, prev: f64, current: f64) -> Self {
        Self::NonIncreasingKnots {
            index,
            prev,
            current,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MathError::convergence_failed(100, 1e-6);
        assert!(err.to_string().contains("100 iterations"));

        let err = MathError::non_increasing_knots(3, 2.0, 1.5);
        assert!(err.to_string().contains("index 3"));
    }
}
