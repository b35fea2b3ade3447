//! Multi-tenor knot placement strategies.

use std::collections::BTreeSet;

use log::debug;
use strata_core::Date;

use crate::curve_type::CurveType;
use crate::error::{CurveError, CurveResult};
use crate::instruments::{
    CalibrationInstrument, CalibrationInstruments, InstrumentId, InstrumentKind, TenorBasisSwap,
};
use crate::knots::KnotPoint;
use crate::model::{flow_time, CurveModel};

use super::grid::SparseInstrumentGrid;
use super::{
    check_currency_pair_consistency, maturity_is_tenor_multiple, seed_value, tenor_target,
    KnotPlacement,
};

/// Default multi-tenor placement.
///
/// Builds a sparse `(curve type, maturity)` grid of instrument
/// contributions, places base-rate knots first, then the discount-spread
/// curve, then evicts interior cells greedily until the grid's
/// knot-to-instrument association count is bounded by the input instrument
/// count, and finally fills the tenor spread curves from the surviving
/// cells.
#[derive(Debug, Clone, Copy, Default)]
pub struct MultiTenorDefaultKpp;

impl MultiTenorDefaultKpp {
    /// The grid cell an instrument contributes to: the curve it most
    /// directly informs, at its maturity. Several instruments sharing a
    /// `(curve, maturity)` pair populate one cell.
    fn grid_cell(
        instrument: &dyn CalibrationInstrument,
        base_rate: CurveType,
    ) -> (CurveType, Date) {
        match instrument.kind() {
            InstrumentKind::Ois | InstrumentKind::CrossCurrencySwap => {
                let target = if base_rate == CurveType::Discount {
                    base_rate
                } else {
                    CurveType::Discount
                };
                (target, instrument.end_date())
            }
            InstrumentKind::TenorBasisSwap => {
                match instrument.as_any().downcast_ref::<TenorBasisSwap>() {
                    Some(basis) if basis.other_tenor() != base_rate => {
                        (basis.other_tenor(), instrument.end_date())
                    }
                    Some(basis) => (basis.reference_tenor(), instrument.end_date()),
                    None => (tenor_target(instrument, base_rate), instrument.end_date()),
                }
            }
            _ => (tenor_target(instrument, base_rate), instrument.end_date()),
        }
    }
}

impl KnotPlacement for MultiTenorDefaultKpp {
    fn select_instruments(
        &self,
        instruments: &mut CalibrationInstruments,
        model: &dyn CurveModel,
    ) -> CurveResult<()> {
        check_currency_pair_consistency(instruments)?;
        let value_date = model.reference_date();
        instruments.retain(|i| {
            i.kind() != InstrumentKind::Future
                || i.fixing_date().map_or(true, |fixing| fixing > value_date)
        });
        if instruments.is_empty() {
            return Err(CurveError::missing_required_instrument(
                "multi-tenor placement needs at least one instrument",
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
        let reference = model.reference_date();

        let mut grid = SparseInstrumentGrid::new();
        for (index, instrument) in instruments.iter().enumerate() {
            let (curve_type, maturity) = Self::grid_cell(instrument.as_ref(), base);
            grid.add(curve_type, maturity, index);
        }

        // Base-rate knots first: one per distinct maturity.
        let base_cells: Vec<(Date, usize)> = grid
            .row(base)
            .map(|row| {
                row.iter()
                    .map(|(date, contributors)| (*date, contributors[0]))
                    .collect()
            })
            .unwrap_or_default();
        if base_cells.is_empty() {
            return Err(CurveError::missing_required_instrument(format!(
                "no instrument contributes to the {base} base curve"
            )));
        }
        for (maturity, contributor) in &base_cells {
            let time = flow_time(reference, *maturity);
            let rate = instruments
                .get(*contributor)
                .expect("grid indices are in range")
                .rate();
            let value = seed_value(model, rate, time);
            model.add_knot_point(
                base,
                KnotPoint::new(time, value).with_instrument(InstrumentId(*contributor)),
            )?;
        }

        // Discount-spread knots next, when the base rate is not Discount.
        if base != CurveType::Discount {
            let discount_cells: Vec<(Date, usize)> = grid
                .row(CurveType::Discount)
                .map(|row| {
                    row.iter()
                        .map(|(date, contributors)| (*date, contributors[0]))
                        .collect()
                })
                .unwrap_or_default();
            for (maturity, contributor) in &discount_cells {
                let time = flow_time(reference, *maturity);
                model.add_knot_point(
                    CurveType::Discount,
                    KnotPoint::new(time, 0.0).with_instrument(InstrumentId(*contributor)),
                )?;
            }
        }

        // Greedy reduction: evict interior cells from the most populated
        // non-base, non-discount row while too many associations remain.
        let excluded = [base, CurveType::Discount];
        while grid.association_count() > instruments.len() {
            let Some(target) = grid.most_populated_excluding(&excluded) else {
                break;
            };
            let Some(maturity) = grid.weakest_interior_cell(target) else {
                break;
            };
            debug!("grid reduction: evicting ({target}, {maturity})");
            grid.remove_cell(target, maturity);
        }

        // Remaining tenor cells become spread-curve knots.
        let tenor_rows: Vec<CurveType> = grid
            .curve_types()
            .filter(|ct| *ct != base && *ct != CurveType::Discount)
            .collect();
        for curve_type in tenor_rows {
            let cells: Vec<(Date, usize)> = grid
                .row(curve_type)
                .map(|row| {
                    row.iter()
                        .map(|(date, contributors)| (*date, contributors[0]))
                        .collect()
                })
                .unwrap_or_default();
            for (maturity, contributor) in cells {
                let time = flow_time(reference, maturity);
                model.add_knot_point(
                    curve_type,
                    KnotPoint::new(time, 0.0).with_instrument(InstrumentId(contributor)),
                )?;
            }
        }

        debug!(
            "multi-tenor default placement: {} knots from {} instruments",
            grid.knot_count(),
            instruments.len()
        );
        Ok(())
    }
}

/// Precedence rule when cash rates and tenor-basis-swap legs could both
/// claim the same `(curve, maturity)` knot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TenorSurfacePrecedence {
    /// Cash rates claim their tenor curves; colliding basis swaps yield.
    #[default]
    CashRates,
    /// Basis swaps claim tenor curves; colliding cash yields.
    TenorBasisSwaps,
    /// Cash contributes only to the base curve; off-base cash is dropped.
    CashOnBase,
    /// Both participate; first occurrence wins each collision.
    CashAndTenorBasisSwaps,
}

/// Specialized multi-tenor stripper: every instrument is assigned exactly
/// one curve.
///
/// Assignment rules:
///
/// - deposits/FRAs/futures go to their index tenor's spread curve, or the
///   base curve when the tenor *is* the base rate
/// - swaps on the natural (base) tenor define the base curve; swaps on any
///   other leg tenor (the classic 3M-leg case) go to that tenor's spread
///   curve
/// - basis swaps go to their non-reference leg's curve (reference leg when
///   the non-reference leg is the base)
/// - OIS and cross-currency basis swaps go to the discount spread
///
/// The [`TenorSurfacePrecedence`] resolves cash/basis-swap collisions during
/// selection; an optional multiple-only mode discards basis swaps whose
/// maturity is not an integer multiple of their non-reference tenor.
#[derive(Debug, Clone, Copy, Default)]
pub struct MultiTenorStripperKpp {
    precedence: TenorSurfacePrecedence,
    basis_multiple_only: bool,
}

impl MultiTenorStripperKpp {
    /// Creates a stripper with the given precedence rule.
    #[must_use]
    pub fn new(precedence: TenorSurfacePrecedence) -> Self {
        Self {
            precedence,
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

    /// The single curve an instrument's knot is assigned to.
    fn assigned_curve(
        instrument: &dyn CalibrationInstrument,
        base_rate: CurveType,
    ) -> CurveType {
        match instrument.kind() {
            InstrumentKind::Ois | InstrumentKind::CrossCurrencySwap => {
                if base_rate == CurveType::Discount {
                    base_rate
                } else {
                    CurveType::Discount
                }
            }
            InstrumentKind::TenorBasisSwap => {
                match instrument.as_any().downcast_ref::<TenorBasisSwap>() {
                    Some(basis) if basis.other_tenor() != base_rate => basis.other_tenor(),
                    Some(basis) => basis.reference_tenor(),
                    None => tenor_target(instrument, base_rate),
                }
            }
            _ => tenor_target(instrument, base_rate),
        }
    }
}

impl KnotPlacement for MultiTenorStripperKpp {
    fn select_instruments(
        &self,
        instruments: &mut CalibrationInstruments,
        model: &dyn CurveModel,
    ) -> CurveResult<()> {
        check_currency_pair_consistency(instruments)?;
        let value_date = model.reference_date();
        let base = model.base_rate();

        // Expired futures.
        instruments.retain(|i| {
            i.kind() != InstrumentKind::Future
                || i.fixing_date().map_or(true, |fixing| fixing > value_date)
        });

        // Degenerate and off-cycle basis swaps.
        let multiple_only = self.basis_multiple_only;
        instruments.retain(|i| {
            let Some(basis) = i.as_any().downcast_ref::<TenorBasisSwap>() else {
                return true;
            };
            if basis.legs_identical() {
                return false;
            }
            if multiple_only {
                let maturity_yf = flow_time(value_date, i.end_date());
                let tenor_yf = basis
                    .other_tenor()
                    .year_fraction()
                    .unwrap_or(f64::INFINITY);
                return maturity_is_tenor_multiple(maturity_yf, tenor_yf);
            }
            true
        });

        // CashOnBase: off-base cash never participates.
        if self.precedence == TenorSurfacePrecedence::CashOnBase {
            instruments.retain(|i| {
                i.kind() != InstrumentKind::Deposit || i.index_tenor() == Some(base)
            });
        }

        // Resolve (curve, maturity) collisions per the precedence rule.
        let mut claims: BTreeSet<(CurveType, Date)> = BTreeSet::new();
        let mut claim = |instrument: &dyn CalibrationInstrument| -> bool {
            let key = (
                Self::assigned_curve(instrument, base),
                instrument.end_date(),
            );
            claims.insert(key)
        };

        match self.precedence {
            TenorSurfacePrecedence::CashRates | TenorSurfacePrecedence::CashOnBase => {
                // Cash claims first, then basis swaps fill what is left.
                for i in instruments.iter() {
                    if i.kind() == InstrumentKind::Deposit {
                        claim(i.as_ref());
                    }
                }
                instruments.retain(|i| {
                    i.kind() != InstrumentKind::TenorBasisSwap || claim(i.as_ref())
                });
            }
            TenorSurfacePrecedence::TenorBasisSwaps => {
                for i in instruments.iter() {
                    if i.kind() == InstrumentKind::TenorBasisSwap {
                        claim(i.as_ref());
                    }
                }
                instruments.retain(|i| {
                    i.kind() != InstrumentKind::Deposit || claim(i.as_ref())
                });
            }
            TenorSurfacePrecedence::CashAndTenorBasisSwaps => {
                instruments.retain(|i| {
                    !matches!(
                        i.kind(),
                        InstrumentKind::Deposit | InstrumentKind::TenorBasisSwap
                    ) || claim(i.as_ref())
                });
            }
        }

        // Remaining kinds dedupe on their assigned cell too.
        instruments.retain(|i| {
            if matches!(
                i.kind(),
                InstrumentKind::Deposit | InstrumentKind::TenorBasisSwap
            ) {
                return true;
            }
            claims.insert((Self::assigned_curve(i.as_ref(), base), i.end_date()))
        });

        if instruments.is_empty() {
            return Err(CurveError::missing_required_instrument(
                "no instruments remain after multi-tenor stripper selection",
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
        let mut base_knots = 0usize;
        for (index, instrument) in instruments.iter().enumerate() {
            let target = Self::assigned_curve(instrument.as_ref(), base);
            let time = instrument.last_relevant_time();
            let value = if target == base {
                base_knots += 1;
                seed_value(model, instrument.rate(), time)
            } else {
                // Spread curves start flat; the solver moves them.
                0.0
            };
            model.add_knot_point(
                target,
                KnotPoint::new(time, value).with_instrument(InstrumentId(index)),
            )?;
        }
        if base_knots == 0 {
            return Err(CurveError::missing_required_instrument(format!(
                "no instrument was assigned to the {base} base curve"
            )));
        }
        Ok(())
    }
}
