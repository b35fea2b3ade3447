//! Piecewise linear interpolation.

use super::{segment_index, validate_knots, KnotInterpolator};
use crate::error::MathResult;

/// Piecewise linear interpolation between knots.
///
/// The fastest strategy and the only one whose knot sensitivities are exact
/// barycentric weights; often used for spread curves where smoothness matters
/// less than locality.
#[derive(Debug, Clone, Copy, Default)]
pub struct StraightLine;

impl KnotInterpolator for StraightLine {
    fn value(&self, xs: &[f64], ys: &[f64], x: f64) -> MathResult<f64> {
        validate_knots(xs, ys)?;
        let i = segment_index(xs, x);
        let w = (x - xs[i]) / (xs[i + 1] - xs[i]);
        Ok(ys[i] * (1.0 - w) + ys[i + 1] * w)
    }

    fn supporting_range(&self, xs: &[f64], x: f64) -> (usize, usize) {
        let i = segment_index(xs, x);
        (i, i + 1)
    }

    fn knot_derivative(&self, xs: &[f64], ys: &[f64], x: f64, knot: usize) -> MathResult<f64> {
        validate_knots(xs, ys)?;
        let i = segment_index(xs, x);
        let w = (x - xs[i]) / (xs[i + 1] - xs[i]);
        if knot == i {
            Ok(1.0 - w)
        } else if knot == i + 1 {
            Ok(w)
        } else {
            Ok(0.0)
        }
    }
}
