//! # Strata Math
//!
//! Numerical machinery for the Strata curve construction library.
//!
//! This crate provides:
//!
//! - **Interpolation**: knot-based interpolation strategies exposing both
//!   values and knot sensitivities ([`interpolation::KnotInterpolator`])
//! - **Extrapolation**: flat and straight-line boundary strategies
//! - **Optimization**: a damped Gauss-Newton (Levenberg-Marquardt)
//!   least-squares driver ([`optimization::LevenbergMarquardt`])
//!
//! The interpolators here operate on borrowed knot slices rather than owned
//! data: the calibration loop mutates knot values every iteration, and
//! slice-based evaluation avoids rebuilding an interpolator object each time.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod extrapolation;
pub mod interpolation;
pub mod optimization;

pub use error::{MathError, MathResult};
pub use extrapolation::ExtrapolationMethod;
pub use interpolation::{InterpolationMethod, KnotInterpolator};
pub use optimization::{LeastSquaresProblem, LevenbergMarquardt, LmConfig, LmReport};
