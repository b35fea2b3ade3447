//! Multi-curve model family.
//!
//! A model composes a base-rate curve, optionally a discount-spread curve,
//! and a tenor spread surface into discount-factor queries, and exposes the
//! flattened unknown vector to the calibration solver. Three variants cover
//! the family:
//!
//! - [`SingleCurveModel`]: one curve answers every query (curve-type filters
//!   are ignored, the classic single-curve world)
//! - [`MultiCurveModel`]: a base-rate curve plus a tenor spread surface;
//!   discounting reads the base curve
//! - [`MultiTenorModel`]: additionally carries a discount-spread curve when
//!   the base rate is not the discounting curve itself
//!
//! # Lifecycle
//!
//! `Uninitialized → KnotsPlaced → Solving → Finalized`. Knot placement is
//! only valid before [`CurveModel::finalize`]; variable updates only while
//! `Solving`; [`CurveModel::finish_calibration`] seals the model and drops
//! its instrument references.

mod formulation;
mod multi_curve;
mod multi_tenor;
mod single;

pub use formulation::Formulation;
pub use multi_curve::MultiCurveModel;
pub use multi_tenor::MultiTenorModel;
pub use single::SingleCurveModel;

use std::fmt;

use strata_core::{Date, DayCount};

use crate::curve_type::CurveType;
use crate::error::{CurveError, CurveResult};
use crate::instruments::CalibrationInstruments;
use crate::knots::KnotPoint;

/// Calibration lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelState {
    /// No knots placed yet.
    Uninitialized,
    /// At least one knot placed; placement still open.
    KnotsPlaced,
    /// Finalized for solving; variables may be updated.
    Solving,
    /// Calibration finished; read-only.
    Finalized,
}

impl fmt::Display for ModelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Uninitialized => "Uninitialized",
            Self::KnotsPlaced => "KnotsPlaced",
            Self::Solving => "Solving",
            Self::Finalized => "Finalized",
        };
        write!(f, "{name}")
    }
}

/// Flow time of a date: ACT/365F year fraction from the reference date.
///
/// Every time axis in the workspace (knot abscissae, instrument times) uses
/// this single convention so model and instruments agree.
#[must_use]
pub fn flow_time(reference_date: Date, date: Date) -> f64 {
    DayCount::Act365Fixed.year_fraction(reference_date, date)
}

/// Returns whether a gradient break-out filter admits contributions from
/// `curve_type`. `None` and `AllTenors` admit everything.
#[must_use]
pub fn filter_allows(filter: Option<CurveType>, curve_type: CurveType) -> bool {
    match filter {
        None | Some(CurveType::AllTenors) => true,
        Some(ct) => ct == curve_type,
    }
}

/// Derived quantities cached by `finish_calibration`.
///
/// Computed best-effort at finish time; a failure is stored, not swallowed,
/// and surfaces when the value is first read.
#[derive(Debug, Clone)]
pub struct DerivedQuantities {
    /// Aggregate residual change for a +1bp parallel shift of all unknowns.
    pub bpv: CurveResult<f64>,
    /// Aggregate residual change for a +1bp shift of the base-curve unknowns.
    pub rate_derivative: CurveResult<f64>,
}

/// The multi-curve model contract consumed by instruments, knot placement,
/// and the calibration driver.
pub trait CurveModel: Send + Sync {
    /// Valuation date all flow times are measured from.
    fn reference_date(&self) -> Date;

    /// The model's base rate (a tenor, or `Discount`).
    fn base_rate(&self) -> CurveType;

    /// Current lifecycle state.
    fn state(&self) -> ModelState;

    /// The base curve's value-space formulation.
    fn formulation(&self) -> Formulation;

    /// Flow time of a date under the model's convention.
    fn flow_time(&self, date: Date) -> f64 {
        flow_time(self.reference_date(), date)
    }

    /// Adds a knot point, routing by curve type.
    ///
    /// Valid only while knots are being placed.
    ///
    /// # Errors
    ///
    /// `InvalidState` outside placement; `InvalidCurveType`,
    /// `BaseRateIsFlat`, or `DuplicateKnot` from the routed target.
    fn add_knot_point(&mut self, curve_type: CurveType, knot: KnotPoint) -> CurveResult<()>;

    /// Seals knot placement and prepares spread-surface interpolation.
    ///
    /// Must be called exactly once, after the last knot and before solving.
    fn finalize(&mut self) -> CurveResult<()>;

    /// Discount factor at `flow_time` off the discounting spine.
    fn discount_factor(&self, flow_time: f64) -> CurveResult<f64>;

    /// Discount factor at `flow_time` for the given index tenor (year
    /// fraction). The single-curve default ignores the tenor.
    fn tenor_discount_factor(&self, flow_time: f64, tenor: f64) -> CurveResult<f64> {
        let _ = tenor;
        self.discount_factor(flow_time)
    }

    /// Discount factor read directly off one spine of the model.
    ///
    /// # Errors
    ///
    /// `InvalidCurveType` for tags that name no spine (`Null`, `AllTenors`).
    fn spine_discount_factor(&self, flow_time: f64, curve_type: CurveType) -> CurveResult<f64>;

    /// Accumulates `multiplier * d DF(flow_time) / d unknowns` into the
    /// model-wide gradient slice.
    fn accumulate_discount_factor_gradient(
        &self,
        flow_time: f64,
        multiplier: f64,
        gradient: &mut [f64],
        filter: Option<CurveType>,
    ) -> CurveResult<()>;

    /// Accumulates `multiplier * d TDF(flow_time, tenor) / d unknowns`.
    /// The single-curve default ignores the tenor.
    fn accumulate_tenor_discount_factor_gradient(
        &self,
        flow_time: f64,
        tenor: f64,
        multiplier: f64,
        gradient: &mut [f64],
        filter: Option<CurveType>,
    ) -> CurveResult<()> {
        let _ = tenor;
        self.accumulate_discount_factor_gradient(flow_time, multiplier, gradient, filter)
    }

    /// Number of unknowns, optionally restricted to one curve.
    fn unknown_count(&self, filter: Option<CurveType>) -> usize;

    /// Flattened unknown vector: base curve first, then (where present) the
    /// discount-spread curve, then spread-surface curves in ascending tenor
    /// order.
    fn variables(&self) -> Vec<f64>;

    /// Installs the flattened unknown vector.
    fn set_variables(&mut self, values: &[f64]) -> CurveResult<()>;

    /// Adds per-unknown shifts to the flattened unknown vector.
    fn apply_shifts(&mut self, shifts: &[f64]) -> CurveResult<()>;

    /// Attaches the calibration instrument collection (shared handles) for
    /// later derived-quantity computation.
    fn attach_instruments(&mut self, instruments: CalibrationInstruments);

    /// The attached instruments, if any.
    fn attached_instruments(&self) -> Option<&CalibrationInstruments>;

    /// Finishes calibration: computes cached derived quantities best-effort,
    /// drops instrument references, seals the model. Irreversible.
    fn finish_calibration(&mut self) -> CurveResult<()>;

    /// Cached derived quantities, present after `finish_calibration`.
    fn derived_quantities(&self) -> Option<&DerivedQuantities>;

    /// BPV cached at finish time; a failure captured there surfaces here.
    ///
    /// # Errors
    ///
    /// `InvalidState` before `finish_calibration`, or the captured error.
    fn bpv(&self) -> CurveResult<f64> {
        match self.derived_quantities() {
            Some(derived) => derived.bpv.clone(),
            None => Err(CurveError::invalid_state("bpv", self.state().to_string())),
        }
    }

    /// Rate derivative cached at finish time.
    ///
    /// # Errors
    ///
    /// `InvalidState` before `finish_calibration`, or the captured error.
    fn rate_derivative(&self) -> CurveResult<f64> {
        match self.derived_quantities() {
            Some(derived) => derived.rate_derivative.clone(),
            None => Err(CurveError::invalid_state(
                "rate_derivative",
                self.state().to_string(),
            )),
        }
    }
}

/// Guards an operation against invalid lifecycle states.
pub(crate) fn require_state(
    actual: ModelState,
    allowed: &[ModelState],
    operation: &str,
) -> CurveResult<()> {
    if allowed.contains(&actual) {
        Ok(())
    } else {
        Err(CurveError::invalid_state(operation, actual.to_string()))
    }
}

/// Computes the cached derived quantities for `finish_calibration`.
///
/// Both are plain parallel-bump numbers: total residual change for a +1bp
/// shift of the chosen unknowns. Errors are captured, not raised.
pub(crate) fn compute_derived<M>(model: &M, instruments: &CalibrationInstruments) -> DerivedQuantities
where
    M: CurveModel + Clone,
{
    const BUMP: f64 = 1e-4;

    let total = model.unknown_count(None);
    let base = model.unknown_count(Some(model.base_rate()));

    let shifted_total = residual_sum_shifted(model, instruments, &vec![BUMP; total]);
    let mut base_shifts = vec![0.0; total];
    for shift in base_shifts.iter_mut().take(base) {
        *shift = BUMP;
    }
    let shifted_base = residual_sum_shifted(model, instruments, &base_shifts);
    let unshifted = residual_sum(model, instruments);

    DerivedQuantities {
        bpv: match (&unshifted, &shifted_total) {
            (Ok(a), Ok(b)) => Ok(b - a),
            (Err(e), _) | (_, Err(e)) => Err(e.clone()),
        },
        rate_derivative: match (&unshifted, &shifted_base) {
            (Ok(a), Ok(b)) => Ok(b - a),
            (Err(e), _) | (_, Err(e)) => Err(e.clone()),
        },
    }
}

fn residual_sum<M: CurveModel>(model: &M, instruments: &CalibrationInstruments) -> CurveResult<f64> {
    let mut total = 0.0;
    for instrument in instruments.iter() {
        total += instrument.residual(model)?;
    }
    Ok(total)
}

fn residual_sum_shifted<M>(
    model: &M,
    instruments: &CalibrationInstruments,
    shifts: &[f64],
) -> CurveResult<f64>
where
    M: CurveModel + Clone,
{
    let mut shifted = model.clone();
    shifted.apply_shifts(shifts)?;
    residual_sum(&shifted, instruments)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_display() {
        assert_eq!(ModelState::Solving.to_string(), "Solving");
    }

    #[test]
    fn test_filter_allows() {
        assert!(filter_allows(None, CurveType::M3));
        assert!(filter_allows(Some(CurveType::AllTenors), CurveType::M6));
        assert!(filter_allows(Some(CurveType::M3), CurveType::M3));
        assert!(!filter_allows(Some(CurveType::M3), CurveType::M6));
    }

    #[test]
    fn test_flow_time() {
        let reference = Date::from_ymd(2025, 1, 1).unwrap();
        let one_year = Date::from_ymd(2026, 1, 1).unwrap();
        assert!((flow_time(reference, one_year) - 1.0).abs() < 1e-12);
    }
}
