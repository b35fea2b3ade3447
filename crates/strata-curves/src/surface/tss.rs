//! Tenor-surface interpolation strategies.
//!
//! A [`TssInterpolation`] answers spread queries *between* the surface's
//! tenor curves: given a query tenor that need not sit exactly on a curve,
//! it decides which curve (or blend of curves) supplies the spread and how
//! gradient mass routes into the per-curve slices of the unknown vector.
//!
//! Strategies precompute their bucket structure in `finalize`; the surface
//! re-finalizes after any structural change.

use std::collections::BTreeMap;
use std::fmt;

use crate::curve_type::CurveType;
use crate::error::CurveResult;
use crate::knots::PiecewiseCurve;
use crate::model::filter_allows;

/// Map of tenor curves keyed (and therefore ordered) by curve type.
pub type TenorCurveMap = BTreeMap<CurveType, PiecewiseCurve>;

/// Strategy interpolating spread values between tenor curves.
pub trait TssInterpolation: Send + Sync + fmt::Debug {
    /// Precomputes bucket structure from the surface's tenor year fractions
    /// (ascending). Must be called before the first query and again after
    /// any structural change to the surface.
    fn finalize(&mut self, tenors: &[f64]);

    /// Interpolated spread at `(tenor, flow_time)`.
    fn interpolate(
        &self,
        curves: &TenorCurveMap,
        tenor: f64,
        flow_time: f64,
    ) -> CurveResult<f64>;

    /// Routes `multiplier` into the gradient slots of the curve(s) the query
    /// resolves to. `gradient` spans all surface unknowns in ascending tenor
    /// order; a `filter` naming a different curve makes the routing a no-op.
    fn accumulate_gradient(
        &self,
        curves: &TenorCurveMap,
        tenor: f64,
        flow_time: f64,
        multiplier: f64,
        gradient: &mut [f64],
        filter: Option<CurveType>,
    ) -> CurveResult<()>;

    /// Clones the strategy behind the trait object.
    fn boxed_clone(&self) -> Box<dyn TssInterpolation>;
}

impl Clone for Box<dyn TssInterpolation> {
    fn clone(&self) -> Self {
        self.boxed_clone()
    }
}

/// Returns the `index`-th tenor curve in ascending order.
fn nth_curve(curves: &TenorCurveMap, index: usize) -> (&CurveType, &PiecewiseCurve) {
    curves
        .iter()
        .nth(index)
        .expect("bucket index within surface")
}

/// Gradient-slice offset of the `index`-th curve: the unknown counts of all
/// preceding curves in ascending tenor order.
fn offset_of_index(curves: &TenorCurveMap, index: usize) -> usize {
    curves
        .values()
        .take(index)
        .map(PiecewiseCurve::unknown_count)
        .sum()
}

/// Routes a multiplier into one curve's gradient slice.
fn route_into_curve(
    curves: &TenorCurveMap,
    index: usize,
    flow_time: f64,
    multiplier: f64,
    gradient: &mut [f64],
    filter: Option<CurveType>,
) -> CurveResult<()> {
    let (key, curve) = nth_curve(curves, index);
    if !filter_allows(filter, *key) {
        return Ok(());
    }
    let offset = offset_of_index(curves, index);
    let slice = &mut gradient[offset..offset + curve.unknown_count()];
    curve.accumulate_gradient(flow_time, multiplier, slice)
}

/// Midpoints between adjacent tenors; bucket `k` covers
/// `(midpoint[k-1], midpoint[k]]` with a sentinel far-right bucket on the
/// longest tenor.
fn bucket_midpoints(tenors: &[f64]) -> Vec<f64> {
    tenors.windows(2).map(|w| 0.5 * (w[0] + w[1])).collect()
}

fn bucket_index(tenors: &[f64], midpoints: &[f64], tenor: f64) -> usize {
    if tenors.is_empty() {
        return 0;
    }
    midpoints
        .partition_point(|&m| m < tenor)
        .min(tenors.len() - 1)
}

/// Basic bucketing: snap the query tenor to the nearest curve's bucket and
/// evaluate that curve only. No blending.
#[derive(Debug, Clone, Default)]
pub struct BasicTss {
    tenors: Vec<f64>,
    midpoints: Vec<f64>,
}

impl BasicTss {
    /// Creates an unfinalized strategy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl TssInterpolation for BasicTss {
    fn finalize(&mut self, tenors: &[f64]) {
        self.tenors = tenors.to_vec();
        self.midpoints = bucket_midpoints(tenors);
    }

    fn interpolate(
        &self,
        curves: &TenorCurveMap,
        tenor: f64,
        flow_time: f64,
    ) -> CurveResult<f64> {
        let index = bucket_index(&self.tenors, &self.midpoints, tenor);
        nth_curve(curves, index).1.evaluate(flow_time)
    }

    fn accumulate_gradient(
        &self,
        curves: &TenorCurveMap,
        tenor: f64,
        flow_time: f64,
        multiplier: f64,
        gradient: &mut [f64],
        filter: Option<CurveType>,
    ) -> CurveResult<()> {
        let index = bucket_index(&self.tenors, &self.midpoints, tenor);
        route_into_curve(curves, index, flow_time, multiplier, gradient, filter)
    }

    fn boxed_clone(&self) -> Box<dyn TssInterpolation> {
        Box::new(self.clone())
    }
}

/// Bucketed interpolation.
///
/// Behaviorally identical to [`BasicTss`]; both names are retained as
/// distinct selectable strategies for configuration compatibility.
#[derive(Debug, Clone, Default)]
pub struct BucketedTss {
    tenors: Vec<f64>,
    midpoints: Vec<f64>,
}

impl BucketedTss {
    /// Creates an unfinalized strategy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl TssInterpolation for BucketedTss {
    fn finalize(&mut self, tenors: &[f64]) {
        self.tenors = tenors.to_vec();
        self.midpoints = bucket_midpoints(tenors);
    }

    fn interpolate(
        &self,
        curves: &TenorCurveMap,
        tenor: f64,
        flow_time: f64,
    ) -> CurveResult<f64> {
        let index = bucket_index(&self.tenors, &self.midpoints, tenor);
        nth_curve(curves, index).1.evaluate(flow_time)
    }

    fn accumulate_gradient(
        &self,
        curves: &TenorCurveMap,
        tenor: f64,
        flow_time: f64,
        multiplier: f64,
        gradient: &mut [f64],
        filter: Option<CurveType>,
    ) -> CurveResult<()> {
        let index = bucket_index(&self.tenors, &self.midpoints, tenor);
        route_into_curve(curves, index, flow_time, multiplier, gradient, filter)
    }

    fn boxed_clone(&self) -> Box<dyn TssInterpolation> {
        Box::new(self.clone())
    }
}

/// Tolerant straight-line interpolation.
///
/// Snaps to a tenor curve when the query is within a tolerance window of its
/// tenor, otherwise blends the two bracketing curves linearly. The window is
/// `min(half inter-tenor gap × rounding fraction, max tolerance in days)`.
/// Configured extra tenors act as additional snap candidates: a query within
/// tolerance of an override point takes the blend weight computed at that
/// point.
#[derive(Debug, Clone)]
pub struct TolerantStraightLineTss {
    rounding_fraction: f64,
    max_tolerance_days: f64,
    extra_tenors: Vec<f64>,
    tenors: Vec<f64>,
}

impl TolerantStraightLineTss {
    /// Default rounding fraction of the half inter-tenor gap.
    pub const DEFAULT_ROUNDING_FRACTION: f64 = 0.2;
    /// Default tolerance cap in calendar days.
    pub const DEFAULT_MAX_TOLERANCE_DAYS: f64 = 5.0;

    /// Creates a strategy with the default tolerance window.
    #[must_use]
    pub fn new() -> Self {
        Self {
            rounding_fraction: Self::DEFAULT_ROUNDING_FRACTION,
            max_tolerance_days: Self::DEFAULT_MAX_TOLERANCE_DAYS,
            extra_tenors: Vec::new(),
            tenors: Vec::new(),
        }
    }

    /// Sets the rounding fraction.
    #[must_use]
    pub fn with_rounding_fraction(mut self, fraction: f64) -> Self {
        self.rounding_fraction = fraction;
        self
    }

    /// Sets the tolerance cap in days.
    #[must_use]
    pub fn with_max_tolerance_days(mut self, days: f64) -> Self {
        self.max_tolerance_days = days;
        self
    }

    /// Adds extra tenor override points.
    #[must_use]
    pub fn with_extra_tenors(mut self, tenors: Vec<f64>) -> Self {
        self.extra_tenors = tenors;
        self
    }

    /// Resolves a query tenor to a snap index or a blend of the bracketing
    /// curves.
    fn resolve(&self, tenor: f64) -> Resolution {
        let n = self.tenors.len();
        if n <= 1 {
            return Resolution::Snap(0);
        }
        if tenor <= self.tenors[0] {
            return Resolution::Snap(0);
        }
        if tenor >= self.tenors[n - 1] {
            return Resolution::Snap(n - 1);
        }

        let k = self.tenors.partition_point(|&t| t <= tenor) - 1;
        let gap = self.tenors[k + 1] - self.tenors[k];
        let tolerance = (0.5 * gap * self.rounding_fraction)
            .min(self.max_tolerance_days / 365.0);

        if tenor - self.tenors[k] <= tolerance {
            return Resolution::Snap(k);
        }
        if self.tenors[k + 1] - tenor <= tolerance {
            return Resolution::Snap(k + 1);
        }

        // Extra tenor override points shift the blend weight.
        let mut blend_point = tenor;
        for &extra in &self.extra_tenors {
            if extra > self.tenors[k]
                && extra < self.tenors[k + 1]
                && (tenor - extra).abs() <= tolerance
            {
                blend_point = extra;
            }
        }

        let weight = (blend_point - self.tenors[k]) / gap;
        Resolution::Blend(k, weight)
    }
}

impl Default for TolerantStraightLineTss {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of tolerant tenor resolution.
enum Resolution {
    /// Use curve `index` exactly.
    Snap(usize),
    /// Blend curves `index` and `index + 1` with the given right-hand weight.
    Blend(usize, f64),
}

impl TssInterpolation for TolerantStraightLineTss {
    fn finalize(&mut self, tenors: &[f64]) {
        self.tenors = tenors.to_vec();
    }

    fn interpolate(
        &self,
        curves: &TenorCurveMap,
        tenor: f64,
        flow_time: f64,
    ) -> CurveResult<f64> {
        match self.resolve(tenor) {
            Resolution::Snap(index) => nth_curve(curves, index).1.evaluate(flow_time),
            Resolution::Blend(index, weight) => {
                let lo = nth_curve(curves, index).1.evaluate(flow_time)?;
                let hi = nth_curve(curves, index + 1).1.evaluate(flow_time)?;
                Ok(lo * (1.0 - weight) + hi * weight)
            }
        }
    }

    fn accumulate_gradient(
        &self,
        curves: &TenorCurveMap,
        tenor: f64,
        flow_time: f64,
        multiplier: f64,
        gradient: &mut [f64],
        filter: Option<CurveType>,
    ) -> CurveResult<()> {
        match self.resolve(tenor) {
            Resolution::Snap(index) => {
                route_into_curve(curves, index, flow_time, multiplier, gradient, filter)
            }
            Resolution::Blend(index, weight) => {
                route_into_curve(
                    curves,
                    index,
                    flow_time,
                    multiplier * (1.0 - weight),
                    gradient,
                    filter,
                )?;
                route_into_curve(
                    curves,
                    index + 1,
                    flow_time,
                    multiplier * weight,
                    gradient,
                    filter,
                )
            }
        }
    }

    fn boxed_clone(&self) -> Box<dyn TssInterpolation> {
        Box::new(self.clone())
    }
}
