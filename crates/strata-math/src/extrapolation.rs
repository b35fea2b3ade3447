//! Extrapolation strategies for queries outside the knot range.

use serde::{Deserialize, Serialize};

use crate::error::MathResult;

/// Extrapolation method applied outside `[xs[0], xs[n-1]]`.
///
/// Left and right extrapolation are configured independently on a curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ExtrapolationMethod {
    /// Constant continuation of the boundary knot value.
    #[default]
    Flat,
    /// Linear continuation of the boundary segment's secant slope.
    StraightLine,
}

impl ExtrapolationMethod {
    /// Returns the extrapolated value at `x`, where `x < xs[0]` when `left`
    /// and `x > xs[n-1]` otherwise.
    ///
    /// Degenerate single-knot curves extrapolate flat from that knot.
    pub fn value(&self, xs: &[f64], ys: &[f64], x: f64, left: bool) -> MathResult<f64> {
        let n = xs.len();
        if n == 1 {
            return Ok(ys[0]);
        }
        match self {
            Self::Flat => Ok(if left { ys[0] } else { ys[n - 1] }),
            Self::StraightLine => {
                let (i, j) = if left { (0, 1) } else { (n - 2, n - 1) };
                let w = (x - xs[i]) / (xs[j] - xs[i]);
                Ok(ys[i] * (1.0 - w) + ys[j] * w)
            }
        }
    }

    /// Returns the inclusive knot index range with nonzero sensitivity.
    #[must_use]
    pub fn supporting_range(&self, n: usize, left: bool) -> (usize, usize) {
        if n == 1 {
            return (0, 0);
        }
        match self {
            Self::Flat => {
                if left {
                    (0, 0)
                } else {
                    (n - 1, n - 1)
                }
            }
            Self::StraightLine => {
                if left {
                    (0, 1)
                } else {
                    (n - 2, n - 1)
                }
            }
        }
    }

    /// Returns `d value(x) / d ys[knot]` for an extrapolated query.
    #[must_use]
    pub fn knot_derivative(&self, xs: &[f64], x: f64, knot: usize, left: bool) -> f64 {
        let n = xs.len();
        if n == 1 {
            return if knot == 0 { 1.0 } else { 0.0 };
        }
        match self {
            Self::Flat => {
                let anchor = if left { 0 } else { n - 1 };
                if knot == anchor {
                    1.0
                } else {
                    0.0
                }
            }
            Self::StraightLine => {
                let (i, j) = if left { (0, 1) } else { (n - 2, n - 1) };
                let w = (x - xs[i]) / (xs[j] - xs[i]);
                if knot == i {
                    1.0 - w
                } else if knot == j {
                    w
                } else {
                    0.0
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_flat() {
        let xs = [1.0, 2.0, 3.0];
        let ys = [0.5, 0.6, 0.7];
        assert_relative_eq!(
            ExtrapolationMethod::Flat.value(&xs, &ys, 0.0, true).unwrap(),
            0.5
        );
        assert_relative_eq!(
            ExtrapolationMethod::Flat
                .value(&xs, &ys, 10.0, false)
                .unwrap(),
            0.7
        );
    }

    #[test]
    fn test_straight_line_extends_secant() {
        let xs = [1.0, 2.0, 3.0];
        let ys = [0.5, 0.6, 0.8];
        // Right: slope 0.2 per unit
        assert_relative_eq!(
            ExtrapolationMethod::StraightLine
                .value(&xs, &ys, 4.0, false)
                .unwrap(),
            1.0
        );
        // Left: slope 0.1 per unit
        assert_relative_eq!(
            ExtrapolationMethod::StraightLine
                .value(&xs, &ys, 0.0, true)
                .unwrap(),
            0.4
        );
    }

    #[test]
    fn test_knot_derivative() {
        let xs = [1.0, 2.0, 3.0];
        let d0 = ExtrapolationMethod::StraightLine.knot_derivative(&xs, 0.0, 0, true);
        let d1 = ExtrapolationMethod::StraightLine.knot_derivative(&xs, 0.0, 1, true);
        assert_relative_eq!(d0, 2.0);
        assert_relative_eq!(d1, -1.0);
        assert_relative_eq!(d0 + d1, 1.0);
    }

    #[test]
    fn test_single_knot_flat() {
        let xs = [0.0];
        let ys = [0.25];
        assert_relative_eq!(
            ExtrapolationMethod::StraightLine
                .value(&xs, &ys, 5.0, false)
                .unwrap(),
            0.25
        );
    }
}
