//! Calibration instruments.
//!
//! Instruments are consumed polymorphically through the
//! [`CalibrationInstrument`] trait: quoted rate, date anatomy, a model price
//! whose par residual the solver drives to zero, and analytic gradient
//! accumulation against the model's unknown vector. The concrete set here
//! (deposits, FRAs, rate futures, swaps, OIS, tenor-basis and cross-currency
//! basis swaps) carries deliberately simplified schedules, enough to
//! exercise every calibration path without dragging in a full date-roll
//! stack.

mod collection;
mod money_market;
mod swaps;

pub use collection::CalibrationInstruments;
pub use money_market::{Deposit, Fra, RateFuture};
pub use swaps::{CrossCurrencyBasisSwap, Ois, Swap, TenorBasisSwap};

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strata_core::{CurrencyPair, Date, DayCount, Frequency};

use crate::clone_lookup::{CloneLookup, CloneWithLookup};
use crate::curve_type::CurveType;
use crate::error::CurveResult;
use crate::model::{flow_time, CurveModel};

/// Opaque identity of an instrument within one calibration build.
///
/// Knot points carry this as a non-owning back-reference to the instrument
/// that placed them; it indexes the build's [`CalibrationInstruments`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstrumentId(pub usize);

/// Instrument classification used by knot placement filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum InstrumentKind {
    /// Cash deposit.
    Deposit,
    /// Forward rate agreement.
    Fra,
    /// Interest rate future.
    Future,
    /// Fixed-for-floating interest rate swap.
    Swap,
    /// Overnight index swap.
    Ois,
    /// Single-currency tenor basis swap.
    TenorBasisSwap,
    /// Cross-currency basis swap.
    CrossCurrencySwap,
}

impl fmt::Display for InstrumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Deposit => "Deposit",
            Self::Fra => "FRA",
            Self::Future => "Future",
            Self::Swap => "Swap",
            Self::Ois => "OIS",
            Self::TenorBasisSwap => "Tenor Basis Swap",
            Self::CrossCurrencySwap => "Cross-Currency Swap",
        };
        write!(f, "{name}")
    }
}

/// One accrual period of a payment schedule.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SchedulePeriod {
    /// Accrual start.
    pub start: Date,
    /// Accrual end (payment date).
    pub end: Date,
    /// Accrual fraction under the leg's day count.
    pub accrual: f64,
}

/// A leg's payment schedule.
///
/// Schedules are shared between instruments via `Arc` (two swaps built off
/// the same generator reference one schedule object); the clone machinery
/// preserves that sharing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentSchedule {
    periods: Vec<SchedulePeriod>,
}

impl PaymentSchedule {
    /// Generates a forward-rolled schedule from `start` to `end`.
    ///
    /// The final period is truncated to end exactly at `end`. No business-day
    /// adjustment is applied; callers provide adjusted dates.
    ///
    /// # Errors
    ///
    /// Propagates date arithmetic failures.
    pub fn generate(
        start: Date,
        end: Date,
        frequency: Frequency,
        day_count: DayCount,
    ) -> CurveResult<Self> {
        let step = frequency.months_per_period();
        let mut periods = Vec::new();
        let mut period_start = start;
        let mut index = 1;
        while period_start < end {
            let mut period_end = start.add_months(step * index)?;
            if period_end > end {
                period_end = end;
            }
            periods.push(SchedulePeriod {
                start: period_start,
                end: period_end,
                accrual: day_count.year_fraction(period_start, period_end),
            });
            period_start = period_end;
            index += 1;
        }
        Ok(Self { periods })
    }

    /// The accrual periods in order.
    #[must_use]
    pub fn periods(&self) -> &[SchedulePeriod] {
        &self.periods
    }

    /// Schedule start date.
    #[must_use]
    pub fn start_date(&self) -> Date {
        self.periods.first().expect("non-empty schedule").start
    }

    /// Final payment date.
    #[must_use]
    pub fn end_date(&self) -> Date {
        self.periods.last().expect("non-empty schedule").end
    }
}

impl CloneWithLookup for PaymentSchedule {
    fn clone_with_lookup(&self, _lookup: &mut CloneLookup) -> CurveResult<Arc<Self>> {
        Ok(Arc::new(self.clone()))
    }
}

/// The capability contract the calibration core consumes.
pub trait CalibrationInstrument: Send + Sync + fmt::Debug {
    /// Concrete-type escape hatch for placement rules that need an
    /// instrument-specific view (basis-swap legs, futures prices).
    fn as_any(&self) -> &dyn std::any::Any;

    /// Instrument classification.
    fn kind(&self) -> InstrumentKind;

    /// Human-readable description for diagnostics.
    fn description(&self) -> String;

    /// Quoted market rate (or rate-equivalent for price-quoted instruments).
    fn rate(&self) -> f64;

    /// Valuation date the instrument's times are measured from.
    fn reference_date(&self) -> Date;

    /// Economic start date.
    fn start_date(&self) -> Date;

    /// Final relevant date.
    fn end_date(&self) -> Date;

    /// Fixing date, where one exists (futures, FRAs).
    fn fixing_date(&self) -> Option<Date> {
        None
    }

    /// The rate index tenor the instrument projects, where one exists.
    fn index_tenor(&self) -> Option<CurveType> {
        None
    }

    /// Currency pair, for cross-currency instruments.
    fn currency_pair(&self) -> Option<CurrencyPair> {
        None
    }

    /// Latest flow time the instrument is sensitive to; where knot placement
    /// puts this instrument's knot.
    fn last_relevant_time(&self) -> f64 {
        flow_time(self.reference_date(), self.end_date())
    }

    /// Present value of the par package under the model. Zero at calibration.
    fn model_price(&self, model: &dyn CurveModel) -> CurveResult<f64>;

    /// Calibration residual (market minus model). The default negates the
    /// par-package PV.
    fn residual(&self, model: &dyn CurveModel) -> CurveResult<f64> {
        Ok(-self.model_price(model)?)
    }

    /// Accumulates `multiplier * d residual / d unknowns` into the model-wide
    /// gradient slice; `filter` breaks out a single curve's contributions.
    fn accumulate_gradient(
        &self,
        model: &dyn CurveModel,
        multiplier: f64,
        gradient: &mut [f64],
        filter: Option<CurveType>,
    ) -> CurveResult<()>;

    /// Deep copy resolving shared components through the lookup.
    fn clone_with_lookup(
        &self,
        lookup: &mut CloneLookup,
    ) -> CurveResult<Arc<dyn CalibrationInstrument>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schedule_generation() {
        let start = Date::from_ymd(2025, 1, 15).unwrap();
        let end = Date::from_ymd(2027, 1, 15).unwrap();
        let schedule =
            PaymentSchedule::generate(start, end, Frequency::SemiAnnual, DayCount::Act360)
                .unwrap();

        assert_eq!(schedule.periods().len(), 4);
        assert_eq!(schedule.start_date(), start);
        assert_eq!(schedule.end_date(), end);
        for window in schedule.periods().windows(2) {
            assert_eq!(window[0].end, window[1].start);
        }
    }

    #[test]
    fn test_schedule_truncates_stub() {
        let start = Date::from_ymd(2025, 1, 15).unwrap();
        let end = Date::from_ymd(2025, 5, 1).unwrap();
        let schedule =
            PaymentSchedule::generate(start, end, Frequency::Quarterly, DayCount::Act360).unwrap();
        assert_eq!(schedule.periods().len(), 2);
        assert_eq!(schedule.end_date(), end);
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(InstrumentKind::Fra.to_string(), "FRA");
        assert_eq!(InstrumentKind::TenorBasisSwap.to_string(), "Tenor Basis Swap");
    }
}
