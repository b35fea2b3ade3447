//! Tenor spread surface.
//!
//! The surface holds one spread curve per rate-index tenor, each expressing
//! that tenor's spread over the base-rate curve in minus-log discount-factor
//! ratio space. Cross-tenor queries go through a pluggable
//! [`TssInterpolation`] strategy; the base rate's own spread is implicitly
//! flat zero and never materialized as a curve.

mod tss;

pub use tss::{BasicTss, BucketedTss, TenorCurveMap, TolerantStraightLineTss, TssInterpolation};

use strata_math::{ExtrapolationMethod, InterpolationMethod};

use crate::curve_type::CurveType;
use crate::error::{CurveError, CurveResult};
use crate::knots::{KnotPoint, PiecewiseCurve};

/// A collection of per-tenor spread curves over a base-rate curve.
#[derive(Debug, Clone)]
pub struct TenorSpreadSurface {
    base_rate: CurveType,
    curves: TenorCurveMap,
    spread_interpolation: InterpolationMethod,
    tss: Box<dyn TssInterpolation>,
    finalized: bool,
}

impl TenorSpreadSurface {
    /// Creates an empty surface over the given base rate.
    ///
    /// # Errors
    ///
    /// Returns `InvalidCurveType` unless the base rate is a tenor or
    /// `Discount`.
    pub fn new(base_rate: CurveType, tss: Box<dyn TssInterpolation>) -> CurveResult<Self> {
        if !base_rate.is_tenor() && base_rate != CurveType::Discount {
            return Err(CurveError::invalid_curve_type(base_rate, "surface base rate"));
        }
        Ok(Self {
            base_rate,
            curves: TenorCurveMap::new(),
            spread_interpolation: InterpolationMethod::StraightLine,
            tss,
            finalized: false,
        })
    }

    /// Sets the interpolation method used inside each spread curve.
    #[must_use]
    pub fn with_spread_interpolation(mut self, method: InterpolationMethod) -> Self {
        self.spread_interpolation = method;
        self
    }

    /// The surface's base rate.
    #[must_use]
    pub fn base_rate(&self) -> CurveType {
        self.base_rate
    }

    /// Tenor curve types present on the surface, ascending.
    pub fn tenor_keys(&self) -> impl Iterator<Item = CurveType> + '_ {
        self.curves.keys().copied()
    }

    /// Returns the spread curve for a tenor, if present.
    #[must_use]
    pub fn curve(&self, tenor: CurveType) -> Option<&PiecewiseCurve> {
        self.curves.get(&tenor)
    }

    /// Number of tenor curves.
    #[must_use]
    pub fn curve_count(&self) -> usize {
        self.curves.len()
    }

    /// Adds a knot point to a tenor's spread curve, creating the curve (with
    /// its fixed anchor) on first use. Any structural change invalidates the
    /// interpolator until the next [`TenorSpreadSurface::finalize`].
    ///
    /// # Errors
    ///
    /// - `InvalidCurveType` if `tenor` is not a tenor tag
    /// - `BaseRateIsFlat` for a non-anchor knot on the base rate's own curve
    /// - `DuplicateKnot` from the target curve
    pub fn add_knot_point(&mut self, tenor: CurveType, knot: KnotPoint) -> CurveResult<()> {
        if !tenor.is_tenor() {
            return Err(CurveError::invalid_curve_type(tenor, "surface knot"));
        }
        if tenor == self.base_rate {
            // The base rate's spread is identically zero; its anchor is
            // implicit and anything else is an error.
            if knot.x == 0.0 && knot.y == 0.0 {
                return Ok(());
            }
            return Err(CurveError::base_rate_is_flat(self.base_rate));
        }

        let spread_interpolation = self.spread_interpolation;
        let curve = self.curves.entry(tenor).or_insert_with(|| {
            PiecewiseCurve::new(
                spread_interpolation,
                ExtrapolationMethod::Flat,
                ExtrapolationMethod::Flat,
            )
        });
        curve.add_knot_point(knot)?;
        self.finalized = false;
        Ok(())
    }

    /// Precomputes the interpolator's bucket structure. Must run after the
    /// last structural change and before the first query.
    pub fn finalize(&mut self) -> CurveResult<()> {
        let tenors: Vec<f64> = self
            .curves
            .keys()
            .map(|ct| ct.year_fraction())
            .collect::<CurveResult<_>>()?;
        self.tss.finalize(&tenors);
        self.finalized = true;
        Ok(())
    }

    /// Whether [`TenorSpreadSurface::finalize`] has run since the last
    /// structural change.
    #[must_use]
    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Interpolated spread at `(tenor, flow_time)`.
    ///
    /// Zero when the query tenor resolves to the base rate, or when the
    /// surface is empty.
    ///
    /// # Errors
    ///
    /// `InvalidState` if the surface has not been finalized.
    pub fn interpolate(&self, tenor: f64, flow_time: f64) -> CurveResult<f64> {
        self.require_finalized("interpolate")?;
        if self.is_base_tenor(tenor) || self.curves.is_empty() {
            return Ok(0.0);
        }
        self.tss.interpolate(&self.curves, tenor, flow_time)
    }

    /// Accumulates spread sensitivities into the surface's slice of the
    /// model gradient (ascending tenor order, one sub-range per curve).
    ///
    /// # Errors
    ///
    /// `InvalidState` if the surface has not been finalized.
    pub fn accumulate_gradient(
        &self,
        tenor: f64,
        flow_time: f64,
        multiplier: f64,
        gradient: &mut [f64],
        filter: Option<CurveType>,
    ) -> CurveResult<()> {
        self.require_finalized("accumulate_gradient")?;
        if self.is_base_tenor(tenor) || self.curves.is_empty() || multiplier == 0.0 {
            return Ok(());
        }
        self.tss
            .accumulate_gradient(&self.curves, tenor, flow_time, multiplier, gradient, filter)
    }

    /// Total unknowns across all tenor curves.
    #[must_use]
    pub fn unknown_count(&self) -> usize {
        self.curves.values().map(PiecewiseCurve::unknown_count).sum()
    }

    /// Unknowns of one tenor's curve (zero when absent).
    #[must_use]
    pub fn unknown_count_for(&self, tenor: CurveType) -> usize {
        self.curves
            .get(&tenor)
            .map_or(0, PiecewiseCurve::unknown_count)
    }

    /// Gradient-slice offset of a tenor's curve within the surface range.
    #[must_use]
    pub fn offset_of(&self, tenor: CurveType) -> usize {
        self.curves
            .iter()
            .take_while(|(key, _)| **key < tenor)
            .map(|(_, curve)| curve.unknown_count())
            .sum()
    }

    /// Flattened surface unknowns in ascending tenor order.
    #[must_use]
    pub fn variables(&self) -> Vec<f64> {
        self.curves
            .values()
            .flat_map(PiecewiseCurve::variables)
            .collect()
    }

    /// Installs flattened surface unknowns.
    pub fn set_variables(&mut self, values: &[f64]) -> CurveResult<()> {
        self.for_each_slice(values, PiecewiseCurve::set_variables)
    }

    /// Adds per-unknown shifts across all tenor curves.
    pub fn apply_shifts(&mut self, shifts: &[f64]) -> CurveResult<()> {
        self.for_each_slice(shifts, PiecewiseCurve::apply_shifts)
    }

    fn for_each_slice(
        &mut self,
        values: &[f64],
        apply: impl Fn(&mut PiecewiseCurve, &[f64]) -> CurveResult<()>,
    ) -> CurveResult<()> {
        if values.len() != self.unknown_count() {
            return Err(CurveError::invalid_state(
                "surface variables",
                format!(
                    "expected {} values, got {}",
                    self.unknown_count(),
                    values.len()
                ),
            ));
        }
        let mut offset = 0;
        for curve in self.curves.values_mut() {
            let count = curve.unknown_count();
            apply(curve, &values[offset..offset + count])?;
            offset += count;
        }
        Ok(())
    }

    fn is_base_tenor(&self, tenor: f64) -> bool {
        self.base_rate.is_tenor() && CurveType::from_year_fraction(tenor) == self.base_rate
    }

    fn require_finalized(&self, operation: &str) -> CurveResult<()> {
        if self.finalized {
            Ok(())
        } else {
            Err(CurveError::invalid_state(operation, "surface not finalized"))
        }
    }
}
