//! Knot points and piecewise curves.
//!
//! A [`PiecewiseCurve`] is an ordered set of [`KnotPoint`]s with a pluggable
//! interpolation method between the first and last knot and left/right
//! extrapolation outside that range. Fixed knots (like the mandatory `(0,0)`
//! anchor) are excluded from the solver's unknown vector; non-fixed knot
//! ordinates are what calibration mutates in place.

use serde::{Deserialize, Serialize};

use strata_math::{ExtrapolationMethod, InterpolationMethod};

use crate::error::{CurveError, CurveResult};
use crate::instruments::InstrumentId;

/// A single curve control point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KnotPoint {
    /// Abscissa (flow time in years).
    pub x: f64,
    /// Ordinate (meaning fixed by the model's formulation).
    pub y: f64,
    /// Fixed knots are invisible to the solver.
    pub fixed: bool,
    /// Non-owning back-reference to the originating instrument.
    pub instrument: Option<InstrumentId>,
}

impl KnotPoint {
    /// Creates a free (solver-visible) knot point.
    #[must_use]
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            fixed: false,
            instrument: None,
        }
    }

    /// Creates a fixed knot point.
    #[must_use]
    pub fn fixed(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            fixed: true,
            instrument: None,
        }
    }

    /// Attaches the originating instrument reference.
    #[must_use]
    pub fn with_instrument(mut self, id: InstrumentId) -> Self {
        self.instrument = Some(id);
        self
    }
}

/// An ordered, interpolated piecewise function over knot points.
///
/// Knot abscissae are strictly increasing; every curve is created with the
/// fixed `(0, 0)` anchor so there is always at least one knot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PiecewiseCurve {
    xs: Vec<f64>,
    ys: Vec<f64>,
    fixed: Vec<bool>,
    instruments: Vec<Option<InstrumentId>>,
    interpolation: InterpolationMethod,
    left_extrapolation: ExtrapolationMethod,
    right_extrapolation: ExtrapolationMethod,
}

impl PiecewiseCurve {
    /// Creates a curve holding only the fixed `(0, 0)` anchor.
    #[must_use]
    pub fn new(
        interpolation: InterpolationMethod,
        left_extrapolation: ExtrapolationMethod,
        right_extrapolation: ExtrapolationMethod,
    ) -> Self {
        Self {
            xs: vec![0.0],
            ys: vec![0.0],
            fixed: vec![true],
            instruments: vec![None],
            interpolation,
            left_extrapolation,
            right_extrapolation,
        }
    }

    /// Creates a curve with the default method set (monotone convex between
    /// knots, flat on both sides).
    #[must_use]
    pub fn standard() -> Self {
        Self::new(
            InterpolationMethod::MonotoneConvex,
            ExtrapolationMethod::Flat,
            ExtrapolationMethod::Flat,
        )
    }

    /// Returns the interpolation method.
    #[must_use]
    pub fn interpolation(&self) -> InterpolationMethod {
        self.interpolation
    }

    /// Number of knot points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.xs.len()
    }

    /// A curve always holds its anchor, so this is never true; provided for
    /// container-convention completeness.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.xs.is_empty()
    }

    /// Returns the knot at `index`.
    #[must_use]
    pub fn knot(&self, index: usize) -> KnotPoint {
        KnotPoint {
            x: self.xs[index],
            y: self.ys[index],
            fixed: self.fixed[index],
            instrument: self.instruments[index],
        }
    }

    /// Returns the knot abscissae.
    #[must_use]
    pub fn knot_times(&self) -> &[f64] {
        &self.xs
    }

    /// First knot abscissa.
    #[must_use]
    pub fn first_x(&self) -> f64 {
        self.xs[0]
    }

    /// Last knot abscissa.
    #[must_use]
    pub fn last_x(&self) -> f64 {
        *self.xs.last().expect("curve holds the anchor")
    }

    /// Adds a knot point, keeping abscissae sorted.
    ///
    /// # Errors
    ///
    /// Returns `CurveError::DuplicateKnot` if a knot already exists at `x`.
    pub fn add_knot_point(&mut self, knot: KnotPoint) -> CurveResult<()> {
        match self
            .xs
            .binary_search_by(|probe| probe.partial_cmp(&knot.x).expect("finite knot x"))
        {
            Ok(_) => Err(CurveError::duplicate_knot(knot.x)),
            Err(pos) => {
                self.xs.insert(pos, knot.x);
                self.ys.insert(pos, knot.y);
                self.fixed.insert(pos, knot.fixed);
                self.instruments.insert(pos, knot.instrument);
                Ok(())
            }
        }
    }

    /// Evaluates the curve at `x`, extrapolating outside the knot range.
    pub fn evaluate(&self, x: f64) -> CurveResult<f64> {
        let n = self.xs.len();
        if n == 1 {
            return Ok(self.ys[0]);
        }
        if x < self.xs[0] {
            return Ok(self.left_extrapolation.value(&self.xs, &self.ys, x, true)?);
        }
        if x > self.xs[n - 1] {
            return Ok(self
                .right_extrapolation
                .value(&self.xs, &self.ys, x, false)?);
        }
        Ok(self
            .interpolation
            .interpolator()
            .value(&self.xs, &self.ys, x)?)
    }

    /// Number of non-fixed (solver-visible) knots.
    #[must_use]
    pub fn unknown_count(&self) -> usize {
        self.fixed.iter().filter(|f| !**f).count()
    }

    /// Returns the non-fixed knot ordinates in abscissa order.
    #[must_use]
    pub fn variables(&self) -> Vec<f64> {
        self.ys
            .iter()
            .zip(self.fixed.iter())
            .filter(|(_, fixed)| !**fixed)
            .map(|(y, _)| *y)
            .collect()
    }

    /// Installs non-fixed knot ordinates from a flat slice.
    ///
    /// # Errors
    ///
    /// Returns `CurveError::InvalidState` on length mismatch.
    pub fn set_variables(&mut self, values: &[f64]) -> CurveResult<()> {
        if values.len() != self.unknown_count() {
            return Err(CurveError::invalid_state(
                "set_variables",
                format!(
                    "expected {} values, got {}",
                    self.unknown_count(),
                    values.len()
                ),
            ));
        }
        let mut it = values.iter();
        for (y, fixed) in self.ys.iter_mut().zip(self.fixed.iter()) {
            if !*fixed {
                *y = *it.next().expect("length checked");
            }
        }
        Ok(())
    }

    /// Adds per-unknown shifts to the non-fixed knot ordinates.
    ///
    /// # Errors
    ///
    /// Returns `CurveError::InvalidState` on length mismatch.
    pub fn apply_shifts(&mut self, shifts: &[f64]) -> CurveResult<()> {
        if shifts.len() != self.unknown_count() {
            return Err(CurveError::invalid_state(
                "apply_shifts",
                format!(
                    "expected {} shifts, got {}",
                    self.unknown_count(),
                    shifts.len()
                ),
            ));
        }
        let mut it = shifts.iter();
        for (y, fixed) in self.ys.iter_mut().zip(self.fixed.iter()) {
            if !*fixed {
                *y += *it.next().expect("length checked");
            }
        }
        Ok(())
    }

    /// Accumulates `multiplier * d evaluate(x) / d y_k` into the gradient
    /// slot of every non-fixed knot `k` that influences `x`.
    ///
    /// `gradient` is the slice of this curve's unknowns, in abscissa order.
    pub fn accumulate_gradient(
        &self,
        x: f64,
        multiplier: f64,
        gradient: &mut [f64],
    ) -> CurveResult<()> {
        let n = self.xs.len();
        debug_assert_eq!(gradient.len(), self.unknown_count());
        if n == 1 || multiplier == 0.0 {
            return Ok(());
        }

        let (lo, hi, extrapolating_left) = if x < self.xs[0] {
            let (lo, hi) = self.left_extrapolation.supporting_range(n, true);
            (lo, hi, Some(true))
        } else if x > self.xs[n - 1] {
            let (lo, hi) = self.right_extrapolation.supporting_range(n, false);
            (lo, hi, Some(false))
        } else {
            let (lo, hi) = self
                .interpolation
                .interpolator()
                .supporting_range(&self.xs, x);
            (lo, hi, None)
        };

        for k in lo..=hi {
            if self.fixed[k] {
                continue;
            }
            let derivative = match extrapolating_left {
                Some(left) => self
                    .left_right(left)
                    .knot_derivative(&self.xs, x, k, left),
                None => self
                    .interpolation
                    .interpolator()
                    .knot_derivative(&self.xs, &self.ys, x, k)?,
            };
            if derivative != 0.0 {
                let slot = self.unknown_slot(k);
                gradient[slot] += multiplier * derivative;
            }
        }
        Ok(())
    }

    /// Integrates the curve over `[a, b]` (used by the instantaneous-forward
    /// formulation). Composite Simpson per knot interval.
    pub fn integral(&self, a: f64, b: f64) -> CurveResult<f64> {
        self.integrate_with(a, b, |x| self.evaluate(x))
    }

    /// Accumulates `multiplier * d integral(a, b) / d y_k` for non-fixed
    /// knots, sampling the knot sensitivity under the same quadrature as
    /// [`PiecewiseCurve::integral`].
    pub fn accumulate_integral_gradient(
        &self,
        a: f64,
        b: f64,
        multiplier: f64,
        gradient: &mut [f64],
    ) -> CurveResult<()> {
        if multiplier == 0.0 {
            return Ok(());
        }
        for k in 0..self.xs.len() {
            if self.fixed[k] {
                continue;
            }
            let sensitivity = self.integrate_with(a, b, |x| self.point_derivative(x, k))?;
            if sensitivity != 0.0 {
                let slot = self.unknown_slot(k);
                gradient[slot] += multiplier * sensitivity;
            }
        }
        Ok(())
    }

    fn left_right(&self, left: bool) -> ExtrapolationMethod {
        if left {
            self.left_extrapolation
        } else {
            self.right_extrapolation
        }
    }

    /// Maps a knot index to its slot among the non-fixed knots.
    fn unknown_slot(&self, knot: usize) -> usize {
        self.fixed[..knot].iter().filter(|f| !**f).count()
    }

    /// Derivative of the curve value at `x` with respect to knot `k`.
    fn point_derivative(&self, x: f64, k: usize) -> CurveResult<f64> {
        let n = self.xs.len();
        if n == 1 {
            return Ok(if k == 0 { 1.0 } else { 0.0 });
        }
        if x < self.xs[0] {
            return Ok(self.left_extrapolation.knot_derivative(&self.xs, x, k, true));
        }
        if x > self.xs[n - 1] {
            return Ok(self
                .right_extrapolation
                .knot_derivative(&self.xs, x, k, false));
        }
        Ok(self
            .interpolation
            .interpolator()
            .knot_derivative(&self.xs, &self.ys, x, k)?)
    }

    /// Composite Simpson over knot-interval pieces of `[a, b]`.
    fn integrate_with<F>(&self, a: f64, b: f64, mut f: F) -> CurveResult<f64>
    where
        F: FnMut(f64) -> CurveResult<f64>,
    {
        if (b - a).abs() < 1e-15 {
            return Ok(0.0);
        }
        let (lo, hi, sign) = if a <= b { (a, b, 1.0) } else { (b, a, -1.0) };

        // Break the range at interior knots so each Simpson piece is smooth.
        let mut cuts = vec![lo];
        for &x in &self.xs {
            if x > lo && x < hi {
                cuts.push(x);
            }
        }
        cuts.push(hi);

        let mut total = 0.0;
        for pair in cuts.windows(2) {
            let (p, q) = (pair[0], pair[1]);
            let mid = 0.5 * (p + q);
            total += (q - p) / 6.0 * (f(p)? + 4.0 * f(mid)? + f(q)?);
        }
        Ok(sign * total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    fn linear_curve() -> PiecewiseCurve {
        let mut curve = PiecewiseCurve::new(
            InterpolationMethod::StraightLine,
            ExtrapolationMethod::Flat,
            ExtrapolationMethod::Flat,
        );
        curve.add_knot_point(KnotPoint::new(1.0, 0.02)).unwrap();
        curve.add_knot_point(KnotPoint::new(2.0, 0.04)).unwrap();
        curve
    }

    #[test]
    fn test_anchor_present() {
        let curve = PiecewiseCurve::standard();
        assert_eq!(curve.len(), 1);
        assert!(curve.knot(0).fixed);
        assert_eq!(curve.unknown_count(), 0);
    }

    #[test]
    fn test_duplicate_knot_rejected() {
        let mut curve = PiecewiseCurve::standard();
        curve.add_knot_point(KnotPoint::new(1.0, 0.02)).unwrap();
        let err = curve.add_knot_point(KnotPoint::new(1.0, 0.03)).unwrap_err();
        assert!(matches!(err, CurveError::DuplicateKnot { .. }));
        // The anchor itself is also protected.
        assert!(curve.add_knot_point(KnotPoint::new(0.0, 0.1)).is_err());
    }

    #[test]
    fn test_insertion_keeps_sorted() {
        let mut curve = PiecewiseCurve::standard();
        for x in [3.0, 1.0, 2.0, 0.5] {
            curve.add_knot_point(KnotPoint::new(x, x)).unwrap();
        }
        let times = curve.knot_times();
        for pair in times.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }

    #[test]
    fn test_evaluate_interpolates_and_extrapolates() {
        let curve = linear_curve();
        assert_relative_eq!(curve.evaluate(1.5).unwrap(), 0.03);
        // Flat beyond the last knot
        assert_relative_eq!(curve.evaluate(5.0).unwrap(), 0.04);
        // Anchor pins the left end
        assert_relative_eq!(curve.evaluate(0.0).unwrap(), 0.0);
    }

    #[test]
    fn test_unknowns_exclude_fixed() {
        let mut curve = linear_curve();
        curve.add_knot_point(KnotPoint::fixed(3.0, 0.05)).unwrap();
        assert_eq!(curve.len(), 4);
        assert_eq!(curve.unknown_count(), 2);
        assert_eq!(curve.variables(), vec![0.02, 0.04]);
    }

    #[test]
    fn test_apply_shifts() {
        let mut curve = linear_curve();
        curve.apply_shifts(&[0.01, -0.01]).unwrap();
        assert_eq!(curve.variables(), vec![0.03, 0.03]);
        assert!(curve.apply_shifts(&[0.0]).is_err());
    }

    #[test]
    fn test_gradient_barycentric_weights() {
        let curve = linear_curve();
        let mut grad = vec![0.0; 2];
        curve.accumulate_gradient(1.25, 2.0, &mut grad).unwrap();
        // x=1.25 sits a quarter of the way from knot@1 to knot@2
        assert_relative_eq!(grad[0], 2.0 * 0.75);
        assert_relative_eq!(grad[1], 2.0 * 0.25);
    }

    #[test]
    fn test_gradient_skips_fixed_anchor() {
        let curve = linear_curve();
        let mut grad = vec![0.0; 2];
        // x=0.5 lies between the fixed anchor and the first free knot; only
        // the free knot receives sensitivity.
        curve.accumulate_gradient(0.5, 1.0, &mut grad).unwrap();
        assert_relative_eq!(grad[0], 0.5);
        assert_relative_eq!(grad[1], 0.0);
    }

    #[test]
    fn test_integral_of_linear_curve() {
        let curve = linear_curve();
        // Piecewise-linear: 0..1 averages 0.01, 1..2 averages 0.03
        assert_relative_eq!(curve.integral(0.0, 2.0).unwrap(), 0.04, epsilon = 1e-12);
        assert_relative_eq!(
            curve.integral(2.0, 0.0).unwrap(),
            -0.04,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_integral_gradient_matches_bump() {
        let curve = linear_curve();
        let mut grad = vec![0.0; 2];
        curve
            .accumulate_integral_gradient(0.0, 2.0, 1.0, &mut grad)
            .unwrap();

        let h = 1e-6;
        for slot in 0..2 {
            let mut up = curve.clone();
            let mut vars = up.variables();
            vars[slot] += h;
            up.set_variables(&vars).unwrap();
            let mut down = curve.clone();
            let mut vars = down.variables();
            vars[slot] -= h;
            down.set_variables(&vars).unwrap();
            let numeric =
                (up.integral(0.0, 2.0).unwrap() - down.integral(0.0, 2.0).unwrap()) / (2.0 * h);
            assert_relative_eq!(grad[slot], numeric, epsilon = 1e-8);
        }
    }

    proptest! {
        #[test]
        fn prop_insertions_stay_sorted(xs in proptest::collection::vec(0.01f64..30.0, 1..12)) {
            let mut curve = PiecewiseCurve::standard();
            for x in xs {
                // Duplicates are rejected, everything else must keep order.
                let _ = curve.add_knot_point(KnotPoint::new(x, 0.01));
                let times = curve.knot_times();
                for pair in times.windows(2) {
                    prop_assert!(pair[0] < pair[1]);
                }
            }
        }
    }
}
