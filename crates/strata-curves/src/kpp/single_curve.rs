//! Single-curve knot placement strategies.

use std::sync::Arc;

use log::debug;
use strata_core::{Date, DayCount};

use crate::curve_type::CurveType;
use crate::error::{CurveError, CurveResult};
use crate::instruments::{
    CalibrationInstrument, CalibrationInstruments, Deposit, InstrumentId, InstrumentKind,
};
use crate::knots::KnotPoint;
use crate::model::{flow_time, CurveModel};

use super::{check_currency_pair_consistency, maturity_is_tenor_multiple, seed_value, KnotPlacement};

/// Placeholder initial knot value used by the default single-curve
/// placement. Deliberately far from any plausible solution: curves placed
/// this way are for callers that overwrite or re-seed values before solving.
pub const PLACEHOLDER_KNOT_VALUE: f64 = 200.0;

/// Default single-curve placement: one knot per instrument at its last
/// relevant time, seeded with [`PLACEHOLDER_KNOT_VALUE`]. No filtering.
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleCurveDefaultKpp;

impl KnotPlacement for SingleCurveDefaultKpp {
    fn select_instruments(
        &self,
        instruments: &mut CalibrationInstruments,
        _model: &dyn CurveModel,
    ) -> CurveResult<()> {
        if instruments.is_empty() {
            return Err(CurveError::missing_required_instrument(
                "single-curve placement needs at least one instrument",
            ));
        }
        Ok(())
    }

    fn create_knot_points(
        &self,
        instruments: &CalibrationInstruments,
        model: &mut dyn CurveModel,
    ) -> CurveResult<()> {
        let base = model.base_rate();
        for (index, instrument) in instruments.iter().enumerate() {
            model.add_knot_point(
                base,
                KnotPoint::new(instrument.last_relevant_time(), PLACEHOLDER_KNOT_VALUE)
                    .with_instrument(InstrumentId(index)),
            )?;
        }
        Ok(())
    }
}

/// Cash-instrument selection policy for the single-curve stripper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CashSelection {
    /// Keep only cash whose index tenor equals the base rate.
    #[default]
    BaseRate,
    /// Keep cash maturing before the bracketing pair around the first
    /// futures/FRA start, replace the pair (and everything beyond) with one
    /// synthetic cash instrument ending exactly at that start date, its rate
    /// log-linearly interpolated in zero space between the pair.
    FutureStartLinear,
    /// Keep cash up to and including the first cash instrument maturing on
    /// or after the first futures/FRA start date.
    FutureStartBlending,
}

/// Futures-aware single-curve stripper.
///
/// Selection rules, in order:
///
/// 1. drop futures whose fixing date is on or before the value date
/// 2. drop all FRAs if any live futures remain, otherwise keep only FRAs on
///    the base tenor
/// 3. apply the [`CashSelection`] policy to deposits
/// 4. drop swaps maturing before the later of the last futures end and the
///    last FRA end
/// 5. drop tenor basis swaps with identical legs, and (optionally) those
///    whose maturity is not a multiple of (or is shorter than) their
///    non-reference leg tenor
/// 6. de-duplicate cash/cross-currency/tenor-basis instruments sharing an
///    end date, keeping the first occurrence
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleCurveStripperKpp {
    cash_selection: CashSelection,
    basis_multiple_only: bool,
}

impl SingleCurveStripperKpp {
    /// Creates a stripper with the given cash selection policy.
    #[must_use]
    pub fn new(cash_selection: CashSelection) -> Self {
        Self {
            cash_selection,
            basis_multiple_only: false,
        }
    }

    /// Also drops basis swaps whose maturity is not a multiple of their
    /// non-reference leg tenor.
    #[must_use]
    pub fn with_basis_multiple_only(mut self, enabled: bool) -> Self {
        self.basis_multiple_only = enabled;
        self
    }

    /// Earliest start date among futures and FRAs, if any survive.
    fn first_derivative_start(instruments: &CalibrationInstruments) -> Option<Date> {
        instruments
            .iter()
            .filter(|i| matches!(i.kind(), InstrumentKind::Future | InstrumentKind::Fra))
            .map(|i| i.start_date())
            .min()
    }

    /// Applies the cash selection policy.
    fn select_cash(
        &self,
        instruments: &mut CalibrationInstruments,
        model: &dyn CurveModel,
    ) -> CurveResult<()> {
        match self.cash_selection {
            CashSelection::BaseRate => {
                let base = model.base_rate();
                instruments.retain(|i| {
                    i.kind() != InstrumentKind::Deposit || i.index_tenor() == Some(base)
                });
                Ok(())
            }
            CashSelection::FutureStartLinear => self.select_cash_future_start_linear(instruments, model),
            CashSelection::FutureStartBlending => {
                let Some(first_start) = Self::first_derivative_start(instruments) else {
                    return Ok(());
                };
                // Keep cash up to and including the first one maturing on or
                // after the derivative start.
                let mut boundary_seen = false;
                instruments.retain(|i| {
                    if i.kind() != InstrumentKind::Deposit {
                        return true;
                    }
                    if boundary_seen {
                        return false;
                    }
                    if i.end_date() >= first_start {
                        boundary_seen = true;
                    }
                    true
                });
                Ok(())
            }
        }
    }

    /// `FutureStartLinear`: synthesize one cash instrument ending exactly at
    /// the first futures/FRA start via log-linear zero-rate interpolation
    /// between the surrounding cash points.
    fn select_cash_future_start_linear(
        &self,
        instruments: &mut CalibrationInstruments,
        model: &dyn CurveModel,
    ) -> CurveResult<()> {
        let Some(first_start) = Self::first_derivative_start(instruments) else {
            return Ok(());
        };

        let reference = model.reference_date();
        let mut cash: Vec<Arc<dyn CalibrationInstrument>> =
            instruments.of_kind(InstrumentKind::Deposit);
        cash.sort_by_key(|i| i.end_date());

        let Some(upper) = cash.iter().find(|i| i.end_date() >= first_start) else {
            // Every cash point matures before the derivative strip begins;
            // nothing to synthesize.
            return Ok(());
        };
        let upper = Arc::clone(upper);
        let lower = cash
            .iter()
            .rev()
            .find(|i| i.end_date() < first_start)
            .map(Arc::clone);

        // Log-discount coordinates of the bracketing points; a missing lower
        // bracket degenerates to the curve anchor (t = 0, ln DF = 0).
        let log_df = |instrument: &Arc<dyn CalibrationInstrument>| -> (f64, f64) {
            let t = flow_time(reference, instrument.end_date());
            let tau = DayCount::Act365Fixed.year_fraction(reference, instrument.end_date());
            let df = 1.0 / (1.0 + instrument.rate() * tau);
            (t, df.ln())
        };
        let (t_hi, ln_hi) = log_df(&upper);
        let (t_lo, ln_lo) = lower.as_ref().map_or((0.0, 0.0), |l| log_df(l));

        let t_star = flow_time(reference, first_start);
        let weight = (t_star - t_lo) / (t_hi - t_lo);
        let ln_star = ln_lo + (ln_hi - ln_lo) * weight;
        let tau_star = DayCount::Act365Fixed.year_fraction(reference, first_start);
        let rate_star = ((-ln_star).exp() - 1.0) / tau_star;

        debug!(
            "FutureStartLinear: synthesizing cash to {first_start} at {:.4}%",
            rate_star * 100.0
        );

        // Drop the bracketing pair and everything beyond the derivative
        // start; append the synthetic point.
        let lower_end = lower.as_ref().map(|l| l.end_date());
        instruments.retain(|i| {
            if i.kind() != InstrumentKind::Deposit {
                return true;
            }
            if Some(i.end_date()) == lower_end || i.end_date() >= first_start {
                return false;
            }
            true
        });
        instruments.push(Arc::new(Deposit::new(
            reference,
            reference,
            first_start,
            rate_star,
            DayCount::Act365Fixed,
            model.base_rate(),
        )));
        Ok(())
    }
}

impl KnotPlacement for SingleCurveStripperKpp {
    fn select_instruments(
        &self,
        instruments: &mut CalibrationInstruments,
        model: &dyn CurveModel,
    ) -> CurveResult<()> {
        let value_date = model.reference_date();
        check_currency_pair_consistency(instruments)?;

        // 1. Expired futures.
        instruments.retain(|i| {
            i.kind() != InstrumentKind::Future
                || i.fixing_date().map_or(true, |fixing| fixing > value_date)
        });

        // 2. FRAs yield to live futures; otherwise only base-tenor FRAs.
        let has_futures = instruments.contains_kind(InstrumentKind::Future);
        let base = model.base_rate();
        instruments.retain(|i| {
            if i.kind() != InstrumentKind::Fra {
                return true;
            }
            if has_futures {
                return false;
            }
            i.index_tenor() == Some(base)
        });

        // 3. Cash selection policy.
        self.select_cash(instruments, model)?;

        // 4. Swaps maturing inside the derivative strip are redundant.
        let derivative_cutoff = instruments
            .iter()
            .filter(|i| matches!(i.kind(), InstrumentKind::Future | InstrumentKind::Fra))
            .map(|i| i.end_date())
            .max();
        if let Some(cutoff) = derivative_cutoff {
            instruments.retain(|i| i.kind() != InstrumentKind::Swap || i.end_date() >= cutoff);
        }

        // 5. Degenerate and off-cycle basis swaps.
        let reference = model.reference_date();
        let multiple_only = self.basis_multiple_only;
        let mut basis_error = None;
        instruments.retain(|i| {
            if i.kind() != InstrumentKind::TenorBasisSwap {
                return true;
            }
            let Some(basis) = i
                .as_any()
                .downcast_ref::<crate::instruments::TenorBasisSwap>()
            else {
                basis_error = Some(CurveError::inconsistent_instrument_set(format!(
                    "instrument '{}' reports TenorBasisSwap but is not one",
                    i.description()
                )));
                return false;
            };
            if basis.legs_identical() {
                return false;
            }
            if multiple_only {
                let maturity_yf = flow_time(reference, i.end_date());
                let tenor_yf = basis
                    .other_tenor()
                    .year_fraction()
                    .unwrap_or(f64::INFINITY);
                return maturity_is_tenor_multiple(maturity_yf, tenor_yf);
            }
            true
        });
        if let Some(err) = basis_error {
            return Err(err);
        }

        // 6. End-date de-duplication over cash / cross-currency / basis.
        let mut seen_ends: Vec<Date> = Vec::new();
        instruments.retain(|i| {
            if !matches!(
                i.kind(),
                InstrumentKind::Deposit
                    | InstrumentKind::CrossCurrencySwap
                    | InstrumentKind::TenorBasisSwap
            ) {
                return true;
            }
            if seen_ends.contains(&i.end_date()) {
                return false;
            }
            seen_ends.push(i.end_date());
            true
        });

        if instruments.is_empty() {
            return Err(CurveError::missing_required_instrument(
                "no instruments remain after stripper selection",
            ));
        }
        debug!("stripper selection kept {} instruments", instruments.len());
        Ok(())
    }

    fn create_knot_points(
        &self,
        instruments: &CalibrationInstruments,
        model: &mut dyn CurveModel,
    ) -> CurveResult<()> {
        let base = model.base_rate();
        for (index, instrument) in instruments.iter().enumerate() {
            let time = instrument.last_relevant_time();
            let value = seed_value(model, instrument.rate(), time);
            model.add_knot_point(
                base,
                KnotPoint::new(time, value).with_instrument(InstrumentId(index)),
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruments::{Fra, RateFuture, Swap, TenorBasisSwap};
    use crate::model::SingleCurveModel;
    use approx::assert_relative_eq;

    fn reference() -> Date {
        Date::from_ymd(2025, 6, 16).unwrap()
    }

    fn model() -> SingleCurveModel {
        SingleCurveModel::new(reference(), CurveType::M3)
    }

    fn cash(months: i32, rate: f64) -> Arc<dyn CalibrationInstrument> {
        let end = reference().add_months(months).unwrap();
        Arc::new(Deposit::new(
            reference(),
            reference(),
            end,
            rate,
            DayCount::Act360,
            CurveType::M3,
        ))
    }

    fn cash_with_tenor(tenor: CurveType, rate: f64) -> Arc<dyn CalibrationInstrument> {
        Arc::new(Deposit::spot(reference(), tenor, rate, DayCount::Act360).unwrap())
    }

    fn future(start_days: i64, price: f64) -> Arc<dyn CalibrationInstrument> {
        let start = reference().add_days(start_days);
        Arc::new(RateFuture::new(
            reference(),
            start.add_days(-2),
            start,
            start.add_days(91),
            price,
            0.0,
            DayCount::Act360,
            CurveType::M3,
        ))
    }

    fn swap(years: i32, rate: f64) -> Arc<dyn CalibrationInstrument> {
        Arc::new(
            Swap::par(
                reference(),
                reference().add_years(years).unwrap(),
                rate,
                CurveType::M3,
            )
            .unwrap(),
        )
    }

    fn fra(start_m: i32, end_m: i32, tenor: CurveType) -> Arc<dyn CalibrationInstrument> {
        Arc::new(
            Fra::from_months(reference(), start_m, end_m, 0.02, DayCount::Act360, tenor).unwrap(),
        )
    }

    #[test]
    fn test_default_kpp_places_placeholder_knots() {
        let mut instruments = CalibrationInstruments::new()
            .with(cash(1, 0.01))
            .with(swap(2, 0.02));
        let mut model = model();
        let kpp = SingleCurveDefaultKpp;
        kpp.select_instruments(&mut instruments, &model).unwrap();
        kpp.create_knot_points(&instruments, &mut model).unwrap();

        // Anchor + one knot per instrument.
        assert_eq!(model.base_curve().len(), 3);
        let knot = model.base_curve().knot(1);
        assert_relative_eq!(knot.y, PLACEHOLDER_KNOT_VALUE);
        assert_eq!(knot.instrument, Some(InstrumentId(0)));
        assert!(!knot.fixed);
    }

    #[test]
    fn test_default_kpp_requires_instruments() {
        let mut instruments = CalibrationInstruments::new();
        let err = SingleCurveDefaultKpp
            .select_instruments(&mut instruments, &model())
            .unwrap_err();
        assert!(matches!(err, CurveError::MissingRequiredInstrument { .. }));
    }

    #[test]
    fn test_fras_removed_when_futures_present() {
        let mut instruments = CalibrationInstruments::new()
            .with(cash(1, 0.01))
            .with(future(90, 98.5))
            .with(fra(6, 9, CurveType::M3));
        SingleCurveStripperKpp::new(CashSelection::BaseRate)
            .select_instruments(&mut instruments, &model())
            .unwrap();
        assert!(!instruments.contains_kind(InstrumentKind::Fra));
        assert!(instruments.contains_kind(InstrumentKind::Future));
    }

    #[test]
    fn test_fras_kept_only_on_base_tenor_without_futures() {
        let mut instruments = CalibrationInstruments::new()
            .with(cash(1, 0.01))
            .with(fra(3, 6, CurveType::M3))
            .with(fra(6, 12, CurveType::M6));
        SingleCurveStripperKpp::new(CashSelection::BaseRate)
            .select_instruments(&mut instruments, &model())
            .unwrap();
        let fras = instruments.of_kind(InstrumentKind::Fra);
        assert_eq!(fras.len(), 1);
        assert_eq!(fras[0].index_tenor(), Some(CurveType::M3));
    }

    #[test]
    fn test_expired_futures_removed() {
        let mut instruments = CalibrationInstruments::new()
            .with(cash(1, 0.01))
            .with(future(-10, 99.0))
            .with(future(90, 98.5));
        SingleCurveStripperKpp::new(CashSelection::BaseRate)
            .select_instruments(&mut instruments, &model())
            .unwrap();
        assert_eq!(instruments.of_kind(InstrumentKind::Future).len(), 1);
    }

    #[test]
    fn test_cash_base_rate_selection() {
        let mut instruments = CalibrationInstruments::new()
            .with(cash_with_tenor(CurveType::M1, 0.01))
            .with(cash_with_tenor(CurveType::M3, 0.012))
            .with(cash_with_tenor(CurveType::M6, 0.015));
        SingleCurveStripperKpp::new(CashSelection::BaseRate)
            .select_instruments(&mut instruments, &model())
            .unwrap();
        let cash = instruments.of_kind(InstrumentKind::Deposit);
        assert_eq!(cash.len(), 1);
        assert_eq!(cash[0].index_tenor(), Some(CurveType::M3));
    }

    #[test]
    fn test_cash_future_start_linear_synthesizes() {
        // Cash at 1M/3M/6M, future starting at ~0.4y: the 3M and 6M points
        // are consumed into one synthetic deposit ending at the future start.
        let future_start_days = 146; // ~0.4 years
        let mut instruments = CalibrationInstruments::new()
            .with(cash(1, 0.01))
            .with(cash(3, 0.012))
            .with(cash(6, 0.015))
            .with(future(future_start_days, 98.5));
        SingleCurveStripperKpp::new(CashSelection::FutureStartLinear)
            .select_instruments(&mut instruments, &model())
            .unwrap();

        let cash_left = instruments.of_kind(InstrumentKind::Deposit);
        assert_eq!(cash_left.len(), 2);
        // Original 1M point survives.
        assert_eq!(cash_left[0].end_date(), reference().add_months(1).unwrap());
        // The synthetic ends exactly at the future start.
        let synthetic = &cash_left[1];
        assert_eq!(synthetic.end_date(), reference().add_days(future_start_days));

        // Its rate lies in zero space between the 3M and 6M implied zeros.
        let zero = |rate: f64, months: i32| -> f64 {
            let end = reference().add_months(months).unwrap();
            let tau = DayCount::Act360.year_fraction(reference(), end);
            let t = flow_time(reference(), end);
            -(1.0 / (1.0 + rate * tau)).ln() / t
        };
        let z3 = zero(0.012, 3);
        let z6 = zero(0.015, 6);
        let t_star = flow_time(reference(), synthetic.end_date());
        let tau_star =
            DayCount::Act365Fixed.year_fraction(reference(), synthetic.end_date());
        let z_star = (1.0 + synthetic.rate() * tau_star).ln() / t_star;
        assert!(
            z_star > z3.min(z6) && z_star < z3.max(z6),
            "synthetic zero {z_star} outside [{z3}, {z6}]"
        );
    }

    #[test]
    fn test_cash_future_start_blending_keeps_boundary() {
        let mut instruments = CalibrationInstruments::new()
            .with(cash(1, 0.01))
            .with(cash(3, 0.012))
            .with(cash(6, 0.015))
            .with(cash(9, 0.016))
            .with(future(146, 98.5));
        SingleCurveStripperKpp::new(CashSelection::FutureStartBlending)
            .select_instruments(&mut instruments, &model())
            .unwrap();

        let cash_left = instruments.of_kind(InstrumentKind::Deposit);
        // 1M and 3M precede the start; 6M is the first maturing on/after it
        // and is kept; 9M is dropped.
        assert_eq!(cash_left.len(), 3);
        assert_eq!(
            cash_left.last().unwrap().end_date(),
            reference().add_months(6).unwrap()
        );
    }

    #[test]
    fn test_swaps_inside_derivative_strip_removed() {
        let mut instruments = CalibrationInstruments::new()
            .with(cash(1, 0.01))
            .with(future(90, 98.5))
            .with(swap(1, 0.015)) // matures before the future's end? no: 1y > ~0.5y
            .with(swap(5, 0.02));
        // Make the strip extend past one year with a far future.
        let mut with_far = instruments.clone();
        with_far.push(future(400, 98.0));

        SingleCurveStripperKpp::new(CashSelection::BaseRate)
            .select_instruments(&mut with_far, &model())
            .unwrap();
        let swaps = with_far.of_kind(InstrumentKind::Swap);
        assert_eq!(swaps.len(), 1);
        assert_eq!(swaps[0].end_date(), reference().add_years(5).unwrap());
    }

    #[test]
    fn test_identical_leg_basis_swaps_removed() {
        let maturity = reference().add_years(2).unwrap();
        let mut instruments = CalibrationInstruments::new()
            .with(cash(1, 0.01))
            .with(Arc::new(
                TenorBasisSwap::par(reference(), maturity, 0.001, CurveType::M3, CurveType::M3)
                    .unwrap(),
            ))
            .with(Arc::new(
                TenorBasisSwap::par(reference(), maturity, 0.001, CurveType::M3, CurveType::M6)
                    .unwrap(),
            ));
        SingleCurveStripperKpp::new(CashSelection::BaseRate)
            .select_instruments(&mut instruments, &model())
            .unwrap();
        assert_eq!(instruments.of_kind(InstrumentKind::TenorBasisSwap).len(), 1);
    }

    #[test]
    fn test_basis_multiple_only_filter() {
        // 20-month maturity is not a whole multiple of a 6M leg.
        let mut instruments = CalibrationInstruments::new()
            .with(cash(1, 0.01))
            .with(Arc::new(
                TenorBasisSwap::par(
                    reference(),
                    reference().add_months(20).unwrap(),
                    0.001,
                    CurveType::M3,
                    CurveType::M6,
                )
                .unwrap(),
            ))
            .with(Arc::new(
                TenorBasisSwap::par(
                    reference(),
                    reference().add_months(24).unwrap(),
                    0.001,
                    CurveType::M3,
                    CurveType::M6,
                )
                .unwrap(),
            ));
        SingleCurveStripperKpp::new(CashSelection::BaseRate)
            .with_basis_multiple_only(true)
            .select_instruments(&mut instruments, &model())
            .unwrap();
        let basis = instruments.of_kind(InstrumentKind::TenorBasisSwap);
        assert_eq!(basis.len(), 1);
        assert_eq!(basis[0].end_date(), reference().add_months(24).unwrap());
    }

    #[test]
    fn test_end_date_dedup_keeps_first() {
        let mut instruments = CalibrationInstruments::new()
            .with(cash(3, 0.012))
            .with(cash(3, 0.013));
        SingleCurveStripperKpp::new(CashSelection::BaseRate)
            .select_instruments(&mut instruments, &model())
            .unwrap();
        let cash_left = instruments.of_kind(InstrumentKind::Deposit);
        assert_eq!(cash_left.len(), 1);
        assert_relative_eq!(cash_left[0].rate(), 0.012);
    }

    #[test]
    fn test_stripper_create_seeds_rate_based_values() {
        let mut instruments = CalibrationInstruments::new()
            .with(cash(3, 0.012))
            .with(swap(2, 0.02));
        let mut model = model();
        let kpp = SingleCurveStripperKpp::new(CashSelection::BaseRate);
        kpp.select_instruments(&mut instruments, &model).unwrap();
        kpp.create_knot_points(&instruments, &mut model).unwrap();

        assert_eq!(model.base_curve().len(), 3);
        let knot = model.base_curve().knot(1);
        // Log-discount seed: r · t.
        assert_relative_eq!(knot.y, 0.012 * knot.x, epsilon = 1e-12);
    }

    #[test]
    fn test_empty_selection_fails() {
        // A lone off-tenor cash instrument is removed by BaseRate selection.
        let mut instruments =
            CalibrationInstruments::new().with(cash_with_tenor(CurveType::M1, 0.01));
        let err = SingleCurveStripperKpp::new(CashSelection::BaseRate)
            .select_instruments(&mut instruments, &model())
            .unwrap_err();
        assert!(matches!(err, CurveError::MissingRequiredInstrument { .. }));
    }
}
