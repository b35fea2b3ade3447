//! Knot-based interpolation strategies for curve construction.
//!
//! # Available Methods
//!
//! - [`StraightLine`]: piecewise linear
//! - [`NaturalCubic`]: natural cubic spline
//! - [`MonotoneConvex`]: shape-preserving monotone cubic (Fritsch-Carlson
//!   slope limiting)
//! - [`TensionSpline`]: hyperbolic-tension spline
//!
//! # Knot sensitivities
//!
//! Calibration needs the partial derivative of an interpolated value with
//! respect to each knot ordinate, not just the value itself. Every strategy
//! therefore implements [`KnotInterpolator::knot_derivative`] together with
//! [`KnotInterpolator::supporting_range`], the index window of knots that can
//! influence a query point. Outside that window the derivative is exactly
//! zero, which is what lets gradient accumulation touch only a handful of
//! Jacobian slots per cash flow.
//!
//! Strategies are stateless over borrowed `(xs, ys)` slices so the solver can
//! mutate knot ordinates in place between evaluations.

mod cubic_spline;
mod monotone_convex;
mod straight_line;
mod tension;

pub use cubic_spline::NaturalCubic;
pub use monotone_convex::MonotoneConvex;
pub use straight_line::StraightLine;
pub use tension::TensionSpline;

use serde::{Deserialize, Serialize};

use crate::error::{MathError, MathResult};

/// Trait for knot-based interpolation strategies.
///
/// Implementations evaluate a piecewise function defined by knots
/// `(xs[i], ys[i])` with `xs` strictly increasing and `xs.len() >= 2`.
/// Queries are expected to lie within `[xs[0], xs[n-1]]`; extrapolation is a
/// separate strategy (see [`crate::extrapolation`]).
pub trait KnotInterpolator: Send + Sync {
    /// Returns the interpolated value at `x`.
    fn value(&self, xs: &[f64], ys: &[f64], x: f64) -> MathResult<f64>;

    /// Returns the inclusive index range of knots that can influence the
    /// value at `x`. Knots outside this range have exactly zero sensitivity.
    fn supporting_range(&self, xs: &[f64], x: f64) -> (usize, usize);

    /// Returns `d value(x) / d ys[knot]`.
    ///
    /// The default implementation is a central difference confined to the
    /// supporting range; strategies with a cheap closed form override it.
    fn knot_derivative(&self, xs: &[f64], ys: &[f64], x: f64, knot: usize) -> MathResult<f64> {
        let (lo, hi) = self.supporting_range(xs, x);
        if knot < lo || knot > hi {
            return Ok(0.0);
        }
        let h = 1e-6 * (1.0 + ys[knot].abs());
        let mut bumped = ys.to_vec();
        bumped[knot] = ys[knot] + h;
        let up = self.value(xs, &bumped, x)?;
        bumped[knot] = ys[knot] - h;
        let down = self.value(xs, &bumped, x)?;
        Ok((up - down) / (2.0 * h))
    }
}

/// Interpolation method selector.
///
/// Maps to a static strategy instance; curves store the selector and
/// dispatch through [`InterpolationMethod::interpolator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum InterpolationMethod {
    /// Piecewise linear interpolation.
    StraightLine,
    /// Natural cubic spline.
    NaturalCubic,
    /// Shape-preserving monotone cubic.
    #[default]
    MonotoneConvex,
    /// Hyperbolic-tension spline.
    HyperbolicTension,
}

static STRAIGHT_LINE: StraightLine = StraightLine;
static NATURAL_CUBIC: NaturalCubic = NaturalCubic;
static MONOTONE_CONVEX: MonotoneConvex = MonotoneConvex;
static HYPERBOLIC_TENSION: TensionSpline = TensionSpline::standard();

impl InterpolationMethod {
    /// Returns the strategy instance for this method.
    #[must_use]
    pub fn interpolator(self) -> &'static dyn KnotInterpolator {
        match self {
            Self::StraightLine => &STRAIGHT_LINE,
            Self::NaturalCubic => &NATURAL_CUBIC,
            Self::MonotoneConvex => &MONOTONE_CONVEX,
            Self::HyperbolicTension => &HYPERBOLIC_TENSION,
        }
    }
}

impl std::fmt::Display for InterpolationMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::StraightLine => "Straight Line",
            Self::NaturalCubic => "Natural Cubic",
            Self::MonotoneConvex => "Monotone Convex",
            Self::HyperbolicTension => "Hyperbolic Tension",
        };
        write!(f, "{name}")
    }
}

/// Validates knot slices: matching lengths, at least two points, strictly
/// increasing abscissae.
pub(crate) fn validate_knots(xs: &[f64], ys: &[f64]) -> MathResult<()> {
    if xs.len() != ys.len() {
        return Err(MathError::invalid_input(format!(
            "knot slices must have equal length: {} vs {}",
            xs.len(),
            ys.len()
        )));
    }
    if xs.len() < 2 {
        return Err(MathError::insufficient_data(2, xs.len()));
    }
    for i in 1..xs.len() {
        if xs[i] <= xs[i - 1] {
            return Err(MathError::non_increasing_knots(i, xs[i - 1], xs[i]));
        }
    }
    Ok(())
}

/// Returns the segment index `i` such that the query lies in
/// `[xs[i], xs[i+1]]`, clamped to valid segments at the boundaries.
pub(crate) fn segment_index(xs: &[f64], x: f64) -> usize {
    let idx = xs.partition_point(|&v| v <= x);
    idx.clamp(1, xs.len() - 1) - 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_segment_index() {
        let xs = [0.0, 1.0, 2.0, 3.0];
        assert_eq!(segment_index(&xs, -0.5), 0);
        assert_eq!(segment_index(&xs, 0.0), 0);
        assert_eq!(segment_index(&xs, 0.5), 0);
        assert_eq!(segment_index(&xs, 1.0), 1);
        assert_eq!(segment_index(&xs, 2.5), 2);
        assert_eq!(segment_index(&xs, 3.0), 2);
        assert_eq!(segment_index(&xs, 9.0), 2);
    }

    #[test]
    fn test_validate_knots() {
        assert!(validate_knots(&[0.0, 1.0], &[1.0, 2.0]).is_ok());
        assert!(validate_knots(&[0.0], &[1.0]).is_err());
        assert!(validate_knots(&[0.0, 0.0], &[1.0, 2.0]).is_err());
        assert!(validate_knots(&[0.0, 1.0], &[1.0]).is_err());
    }

    #[test]
    fn test_all_methods_pass_through_knots() {
        let xs = vec![0.25, 0.5, 1.0, 2.0, 5.0];
        let ys = vec![0.002, 0.011, 0.028, 0.061, 0.17];

        for method in [
            InterpolationMethod::StraightLine,
            InterpolationMethod::NaturalCubic,
            InterpolationMethod::MonotoneConvex,
            InterpolationMethod::HyperbolicTension,
        ] {
            let interp = method.interpolator();
            for (x, y) in xs.iter().zip(ys.iter()) {
                assert_relative_eq!(
                    interp.value(&xs, &ys, *x).unwrap(),
                    *y,
                    epsilon = 1e-9,
                    max_relative = 1e-9
                );
            }
        }
    }

    #[test]
    fn test_knot_derivative_matches_bump() {
        // The analytic overrides must agree with a plain central difference.
        let xs = vec![0.0, 1.0, 2.0, 4.0];
        let ys = vec![0.0, 0.03, 0.05, 0.08];
        let x = 1.4;

        for method in [
            InterpolationMethod::StraightLine,
            InterpolationMethod::NaturalCubic,
            InterpolationMethod::MonotoneConvex,
            InterpolationMethod::HyperbolicTension,
        ] {
            let interp = method.interpolator();
            let (lo, hi) = interp.supporting_range(&xs, x);
            for knot in lo..=hi {
                let analytic = interp.knot_derivative(&xs, &ys, x, knot).unwrap();
                let h = 1e-6;
                let mut up = ys.clone();
                up[knot] += h;
                let mut down = ys.clone();
                down[knot] -= h;
                let numeric = (interp.value(&xs, &up, x).unwrap()
                    - interp.value(&xs, &down, x).unwrap())
                    / (2.0 * h);
                assert_relative_eq!(analytic, numeric, epsilon = 1e-5);
            }
        }
    }

    #[test]
    fn test_derivative_zero_outside_support() {
        let xs = vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0];
        let ys = vec![0.0, 0.01, 0.02, 0.03, 0.04, 0.05];

        let interp = InterpolationMethod::StraightLine.interpolator();
        // Query in segment [0,1]; knot 4 cannot influence it.
        assert_eq!(interp.knot_derivative(&xs, &ys, 0.5, 4).unwrap(), 0.0);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Interpolated values never escape the knot ordinate range for
            /// the shape-preserving strategies.
            #[test]
            fn monotone_convex_stays_in_hull(
                gaps in proptest::collection::vec(0.05f64..2.0, 2..8),
                ys in proptest::collection::vec(-0.05f64..0.15, 8),
                q in 0.0f64..1.0,
            ) {
                let mut xs = vec![0.0];
                for gap in &gaps {
                    xs.push(xs.last().unwrap() + gap);
                }
                let ys = &ys[..xs.len()];
                let x = xs[0] + q * (xs[xs.len() - 1] - xs[0]);

                let v = MonotoneConvex.value(&xs, ys, x).unwrap();
                let lo = ys.iter().cloned().fold(f64::INFINITY, f64::min);
                let hi = ys.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
                prop_assert!(v >= lo - 1e-12 && v <= hi + 1e-12);
            }
        }
    }
}
