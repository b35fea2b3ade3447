//! Natural cubic spline interpolation.

use super::{segment_index, validate_knots, KnotInterpolator};
use crate::error::MathResult;

/// Natural cubic spline (zero second derivative at both ends).
///
/// The spline coefficients are recomputed from the knot slices on each
/// evaluation; curves in this workspace carry at most a few dozen knots, so
/// the tridiagonal solve is cheap compared to rebuilding owned interpolator
/// state every solver iteration.
///
/// A natural spline's true knot dependence is global, but it decays fast;
/// sensitivities are reported over the bracketing knots plus one neighbor on
/// each side, which is the window the calibration Jacobian visits.
#[derive(Debug, Clone, Copy, Default)]
pub struct NaturalCubic;

/// Solves for the spline's second derivatives at the knots.
fn second_derivatives(xs: &[f64], ys: &[f64]) -> Vec<f64> {
    let n = xs.len();
    let mut m = vec![0.0; n];
    if n < 3 {
        return m;
    }

    // Thomas algorithm on the natural-spline tridiagonal system.
    let mut sub = vec![0.0; n];
    let mut diag = vec![0.0; n];
    let mut sup = vec![0.0; n];
    let mut rhs = vec![0.0; n];

    diag[0] = 1.0;
    diag[n - 1] = 1.0;
    for i in 1..n - 1 {
        let h0 = xs[i] - xs[i - 1];
        let h1 = xs[i + 1] - xs[i];
        sub[i] = h0 / 6.0;
        diag[i] = (h0 + h1) / 3.0;
        sup[i] = h1 / 6.0;
        rhs[i] = (ys[i + 1] - ys[i]) / h1 - (ys[i] - ys[i - 1]) / h0;
    }

    for i in 1..n {
        let w = sub[i] / diag[i - 1];
        diag[i] -= w * sup[i - 1];
        rhs[i] -= w * rhs[i - 1];
    }
    m[n - 1] = rhs[n - 1] / diag[n - 1];
    for i in (0..n - 1).rev() {
        m[i] = (rhs[i] - sup[i] * m[i + 1]) / diag[i];
    }
    m
}

impl KnotInterpolator for NaturalCubic {
    fn value(&self, xs: &[f64], ys: &[f64], x: f64) -> MathResult<f64> {
        validate_knots(xs, ys)?;
        let m = second_derivatives(xs, ys);
        let i = segment_index(xs, x);
        let h = xs[i + 1] - xs[i];
        let a = (xs[i + 1] - x) / h;
        let b = (x - xs[i]) / h;
        Ok(a * ys[i]
            + b * ys[i + 1]
            + ((a * a * a - a) * m[i] + (b * b * b - b) * m[i + 1]) * h * h / 6.0)
    }

    fn supporting_range(&self, xs: &[f64], x: f64) -> (usize, usize) {
        let i = segment_index(xs, x);
        (i.saturating_sub(1), (i + 2).min(xs.len() - 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_reproduces_line() {
        // A spline through collinear points is the line itself.
        let xs = vec![0.0, 1.0, 2.0, 3.0];
        let ys = vec![1.0, 2.0, 3.0, 4.0];
        for x in [0.3, 1.5, 2.9] {
            assert_relative_eq!(
                NaturalCubic.value(&xs, &ys, x).unwrap(),
                1.0 + x,
                epsilon = 1e-12
            );
        }
    }

    #[test]
    fn test_natural_boundary() {
        // Curvature vanishes at the ends: near-boundary behavior is close
        // to linear in the first/last segments.
        let xs = vec![0.0, 1.0, 2.0, 3.0];
        let ys = vec![0.0, 0.5, 0.1, 0.4];
        let m = second_derivatives(&xs, &ys);
        assert_relative_eq!(m[0], 0.0);
        assert_relative_eq!(m[3], 0.0);
    }

    #[test]
    fn test_smoothness_between_knots() {
        let xs = vec![0.0, 1.0, 2.0, 4.0];
        let ys = vec![0.0, 0.03, 0.05, 0.08];
        // Continuity across a knot
        let left = NaturalCubic.value(&xs, &ys, 1.0 - 1e-9).unwrap();
        let right = NaturalCubic.value(&xs, &ys, 1.0 + 1e-9).unwrap();
        assert_relative_eq!(left, right, epsilon = 1e-6);
    }
}
