//! Knot-point placement (KPP) strategies.
//!
//! A placement strategy runs in two phases over one calibration build:
//!
//! 1. [`KnotPlacement::select_instruments`] filters the instrument
//!    collection by removal (futures/FRA interplay, cash selection windows,
//!    redundant swaps, degenerate basis swaps, duplicates)
//! 2. [`KnotPlacement::create_knot_points`] maps each surviving instrument
//!    to `(curve type, time, initial value)` knots on the model
//!
//! The strategies encode the most idiosyncratic rules of the engine; their
//! selection semantics are pinned by tests rather than left to intuition.

mod grid;
mod multi_tenor;
mod single_curve;
mod tables;

pub use grid::SparseInstrumentGrid;
pub use multi_tenor::{MultiTenorDefaultKpp, MultiTenorStripperKpp, TenorSurfacePrecedence};
pub use single_curve::{
    CashSelection, SingleCurveDefaultKpp, SingleCurveStripperKpp, PLACEHOLDER_KNOT_VALUE,
};
pub use tables::{BestFitKpp, FixedKpp};

use strata_core::CurrencyPair;

use crate::curve_type::CurveType;
use crate::error::{CurveError, CurveResult};
use crate::instruments::{CalibrationInstrument, CalibrationInstruments, InstrumentKind};
use crate::model::CurveModel;

/// The two-phase knot placement contract.
pub trait KnotPlacement: Send + Sync {
    /// Filters the instrument collection by removal. Model-type aware.
    fn select_instruments(
        &self,
        instruments: &mut CalibrationInstruments,
        model: &dyn CurveModel,
    ) -> CurveResult<()>;

    /// Places knots for the surviving instruments.
    fn create_knot_points(
        &self,
        instruments: &CalibrationInstruments,
        model: &mut dyn CurveModel,
    ) -> CurveResult<()>;

    /// Per-instrument residual weights for the least-squares objective, in
    /// collection order. `None` means equal weights.
    fn residual_weights(&self, instruments: &CalibrationInstruments) -> Option<Vec<f64>> {
        let _ = instruments;
        None
    }
}

/// Initial knot ordinate for an instrument-driven base-curve knot.
pub(crate) fn seed_value(model: &dyn CurveModel, rate: f64, time: f64) -> f64 {
    model.formulation().initial_knot_value(rate, time)
}

/// Verifies that every cross-currency instrument in the build references the
/// same currency pair.
pub(crate) fn check_currency_pair_consistency(
    instruments: &CalibrationInstruments,
) -> CurveResult<()> {
    let mut seen: Option<CurrencyPair> = None;
    for instrument in instruments.iter() {
        if instrument.kind() != InstrumentKind::CrossCurrencySwap {
            continue;
        }
        let pair = instrument.currency_pair().ok_or_else(|| {
            CurveError::inconsistent_instrument_set(format!(
                "cross-currency instrument '{}' carries no currency pair",
                instrument.description()
            ))
        })?;
        match seen {
            None => seen = Some(pair),
            Some(first) if first != pair => {
                return Err(CurveError::inconsistent_instrument_set(format!(
                    "cross-currency instruments reference both {first} and {pair}"
                )));
            }
            Some(_) => {}
        }
    }
    Ok(())
}

/// Whether a basis swap's maturity is a (calendar-slack) integer multiple of
/// its non-reference leg tenor, and at least that long.
pub(crate) fn maturity_is_tenor_multiple(maturity_yf: f64, tenor_yf: f64) -> bool {
    if tenor_yf <= 0.0 || maturity_yf < tenor_yf * (1.0 - 0.05) {
        return false;
    }
    let ratio = maturity_yf / tenor_yf;
    (ratio - ratio.round()).abs() <= 0.05
}

/// The curve a tenor-projecting instrument's knot belongs to: the base curve
/// for the base tenor, otherwise the instrument's tenor spread curve.
pub(crate) fn tenor_target(
    instrument: &dyn CalibrationInstrument,
    base_rate: CurveType,
) -> CurveType {
    match instrument.index_tenor() {
        Some(tenor) if tenor != base_rate => tenor,
        _ => base_rate,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruments::CrossCurrencyBasisSwap;
    use std::sync::Arc;
    use strata_core::{Currency, Date};

    #[test]
    fn test_maturity_multiple() {
        assert!(maturity_is_tenor_multiple(1.0, 0.25));
        assert!(maturity_is_tenor_multiple(0.5, 0.25));
        assert!(!maturity_is_tenor_multiple(0.6, 0.25));
        // Shorter than the tenor itself
        assert!(!maturity_is_tenor_multiple(0.2, 0.25));
        // Calendar slack: 11.9 months against 3M still counts as 4 periods
        assert!(maturity_is_tenor_multiple(0.99, 0.25));
    }

    #[test]
    fn test_currency_pair_consistency() {
        let reference = Date::from_ymd(2025, 6, 16).unwrap();
        let maturity = reference.add_years(2).unwrap();
        let eurusd = CurrencyPair::new(Currency::EUR, Currency::USD);
        let gbpusd = CurrencyPair::new(Currency::GBP, Currency::USD);

        let mut instruments = CalibrationInstruments::new();
        instruments.push(Arc::new(
            CrossCurrencyBasisSwap::par(reference, maturity, 0.001, CurveType::M3, eurusd)
                .unwrap(),
        ));
        assert!(check_currency_pair_consistency(&instruments).is_ok());

        instruments.push(Arc::new(
            CrossCurrencyBasisSwap::par(reference, maturity, 0.002, CurveType::M3, gbpusd)
                .unwrap(),
        ));
        let err = check_currency_pair_consistency(&instruments).unwrap_err();
        assert!(matches!(err, CurveError::InconsistentInstrumentSet { .. }));
    }
}
