//! Error types for curve construction and calibration.

use thiserror::Error;

use crate::curve_type::CurveType;

/// A specialized Result type for curve operations.
pub type CurveResult<T> = Result<T, CurveError>;

/// Error types for curve construction and calibration.
#[derive(Error, Debug, Clone)]
pub enum CurveError {
    /// A description did not resolve to a known curve type.
    #[error("Unknown curve type: '{description}'")]
    UnknownCurveType {
        /// The unresolved description text.
        description: String,
    },

    /// A curve type tag is not valid for the requested operation.
    #[error("Invalid curve type {curve_type} for {operation}")]
    InvalidCurveType {
        /// The offending curve type.
        curve_type: CurveType,
        /// The operation that rejected it.
        operation: String,
    },

    /// Attempt to add a second knot at an existing x-value.
    #[error("Duplicate knot at x = {x}")]
    DuplicateKnot {
        /// The duplicated abscissa.
        x: f64,
    },

    /// Attempt to perturb the base rate's implicitly-flat spread curve.
    #[error("Base rate {base_rate} carries an implicitly flat spread; cannot add knots")]
    BaseRateIsFlat {
        /// The base rate curve type.
        base_rate: CurveType,
    },

    /// A knot placement's structural precondition is unmet.
    #[error("Missing required instrument: {requirement}")]
    MissingRequiredInstrument {
        /// Description of the missing instrument class.
        requirement: String,
    },

    /// The instrument set is internally inconsistent for one build.
    #[error("Inconsistent instrument set: {reason}")]
    InconsistentInstrumentSet {
        /// Description of the inconsistency.
        reason: String,
    },

    /// A clone graph cycle was detected without a registered escape.
    #[error("Cyclic dependency while cloning {type_name}")]
    CyclicDependency {
        /// Type name of the object whose clone was re-entered.
        type_name: String,
    },

    /// The solver exhausted its budget without meeting tolerance.
    #[error(
        "Calibration did not converge after {iterations} iterations (residual rms: {residual:.3e})"
    )]
    CalibrationDidNotConverge {
        /// Iterations consumed.
        iterations: usize,
        /// Final residual RMS.
        residual: f64,
    },

    /// An operation was invoked in the wrong lifecycle state.
    #[error("Invalid state for {operation}: model is {state}")]
    InvalidState {
        /// The rejected operation.
        operation: String,
        /// The current lifecycle state.
        state: String,
    },

    /// Propagated mathematical error.
    #[error(transparent)]
    Math(#[from] strata_math::MathError),

    /// Propagated core error.
    #[error(transparent)]
    Core(#[from] strata_core::CoreError),
}

impl CurveError {
    /// Creates an unknown curve type error.
    #[must_use]
    pub fn unknown_curve_type(description: impl Into<String>) -> Self {
        Self::UnknownCurveType {
            description: description.into(),
        }
    }

    /// Creates an invalid curve type error.
    #[must_use]
    pub fn invalid_curve_type(curve_type: CurveType, operation: impl Into<String>) -> Self {
        Self::InvalidCurveType {
            curve_type,
            operation: operation.into(),
        }
    }

    /// Creates a duplicate knot error.
    #[must_use]
    pub fn duplicate_knot(x: f64) -> Self {
        Self::DuplicateKnot { x }
    }

    /// Creates a base-rate-is-flat error.
    #[must_use]
    pub fn base_rate_is_flat(base_rate: CurveType) -> Self {
        Self::BaseRateIsFlat { base_rate }
    }

    /// Creates a missing required instrument error.
    #[must_use]
    pub fn missing_required_instrument(requirement: impl Into<String>) -> Self {
        Self::MissingRequiredInstrument {
            requirement: requirement.into(),
        }
    }

    /// Creates an inconsistent instrument set error.
    #[must_use]
    pub fn inconsistent_instrument_set(reason: impl Into<String>) -> Self {
        Self::InconsistentInstrumentSet {
            reason: reason.into(),
        }
    }

    /// Creates a cyclic dependency error.
    #[must_use]
    pub fn cyclic_dependency(type_name: impl Into<String>) -> Self {
        Self::CyclicDependency {
            type_name: type_name.into(),
        }
    }

    /// Creates a calibration did-not-converge error.
    #[must_use]
    pub fn did_not_converge(iterations: usize, residual: f64) -> Self {
        Self::CalibrationDidNotConverge {
            iterations,
            residual,
        }
    }

    /// Creates an invalid state error.
    #[must_use]
    pub fn invalid_state(operation: impl Into<String>, state: impl Into<String>) -> Self {
        Self::InvalidState {
            operation: operation.into(),
            state: state.into(),
        }
    }
}
