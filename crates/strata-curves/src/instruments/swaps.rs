//! Swap-family calibration instruments.

use std::sync::Arc;

use strata_core::{CurrencyPair, Date, DayCount, Frequency};

use crate::clone_lookup::CloneLookup;
use crate::curve_type::CurveType;
use crate::error::{CurveError, CurveResult};
use crate::model::CurveModel;

use super::{CalibrationInstrument, InstrumentKind, PaymentSchedule};

/// Maps an index tenor to its natural payment frequency.
fn frequency_for_tenor(tenor: CurveType) -> CurveResult<Frequency> {
    match tenor {
        CurveType::M1 => Ok(Frequency::Monthly),
        CurveType::M3 => Ok(Frequency::Quarterly),
        CurveType::M6 => Ok(Frequency::SemiAnnual),
        CurveType::Y1 => Ok(Frequency::Annual),
        other => Err(CurveError::invalid_curve_type(other, "leg frequency")),
    }
}

/// PV of a floating leg projecting `tenor_yf`, with an additive spread,
/// discounted on the model's discounting spine.
fn float_leg_pv(
    model: &dyn CurveModel,
    schedule: &PaymentSchedule,
    tenor_yf: f64,
    spread: f64,
) -> CurveResult<f64> {
    let mut pv = 0.0;
    for period in schedule.periods() {
        let projection_start =
            model.tenor_discount_factor(model.flow_time(period.start), tenor_yf)?;
        let projection_end = model.tenor_discount_factor(model.flow_time(period.end), tenor_yf)?;
        let discount = model.discount_factor(model.flow_time(period.end))?;
        pv += ((projection_start / projection_end - 1.0) + spread * period.accrual) * discount;
    }
    Ok(pv)
}

/// Gradient of [`float_leg_pv`]: product/quotient rule per period.
fn accumulate_float_leg(
    model: &dyn CurveModel,
    schedule: &PaymentSchedule,
    tenor_yf: f64,
    spread: f64,
    multiplier: f64,
    gradient: &mut [f64],
    filter: Option<CurveType>,
) -> CurveResult<()> {
    for period in schedule.periods() {
        let ts = model.flow_time(period.start);
        let te = model.flow_time(period.end);
        let a = model.tenor_discount_factor(ts, tenor_yf)?;
        let b = model.tenor_discount_factor(te, tenor_yf)?;
        let c = model.discount_factor(te)?;

        model.accumulate_tenor_discount_factor_gradient(
            ts,
            tenor_yf,
            multiplier * c / b,
            gradient,
            filter,
        )?;
        model.accumulate_tenor_discount_factor_gradient(
            te,
            tenor_yf,
            -multiplier * a * c / (b * b),
            gradient,
            filter,
        )?;
        model.accumulate_discount_factor_gradient(
            te,
            multiplier * ((a / b - 1.0) + spread * period.accrual),
            gradient,
            filter,
        )?;
    }
    Ok(())
}

/// PV of a fixed leg: `rate · Σ τ_j · DF(t_j)`.
fn fixed_leg_pv(
    model: &dyn CurveModel,
    schedule: &PaymentSchedule,
    rate: f64,
) -> CurveResult<f64> {
    let mut pv = 0.0;
    for period in schedule.periods() {
        pv += rate * period.accrual * model.discount_factor(model.flow_time(period.end))?;
    }
    Ok(pv)
}

fn accumulate_fixed_leg(
    model: &dyn CurveModel,
    schedule: &PaymentSchedule,
    rate: f64,
    multiplier: f64,
    gradient: &mut [f64],
    filter: Option<CurveType>,
) -> CurveResult<()> {
    for period in schedule.periods() {
        model.accumulate_discount_factor_gradient(
            model.flow_time(period.end),
            multiplier * rate * period.accrual,
            gradient,
            filter,
        )?;
    }
    Ok(())
}

/// Fixed-for-floating interest rate swap.
///
/// Par package: receive float, pay fixed; `PV = PV_float − PV_fixed`.
#[derive(Debug, Clone)]
pub struct Swap {
    reference_date: Date,
    fixed_rate: f64,
    fixed_schedule: Arc<PaymentSchedule>,
    float_schedule: Arc<PaymentSchedule>,
    tenor: CurveType,
}

impl Swap {
    /// Creates a swap from explicit leg schedules. Schedules may be shared
    /// with other instruments.
    #[must_use]
    pub fn new(
        reference_date: Date,
        fixed_rate: f64,
        fixed_schedule: Arc<PaymentSchedule>,
        float_schedule: Arc<PaymentSchedule>,
        tenor: CurveType,
    ) -> Self {
        Self {
            reference_date,
            fixed_rate,
            fixed_schedule,
            float_schedule,
            tenor,
        }
    }

    /// Creates a spot-starting par swap with a semi-annual fixed leg and a
    /// floating leg on the index tenor's natural frequency.
    ///
    /// # Errors
    ///
    /// Propagates schedule generation and tenor resolution failures.
    pub fn par(
        reference_date: Date,
        maturity: Date,
        fixed_rate: f64,
        tenor: CurveType,
    ) -> CurveResult<Self> {
        let fixed_schedule = PaymentSchedule::generate(
            reference_date,
            maturity,
            Frequency::SemiAnnual,
            DayCount::Thirty360US,
        )?;
        let float_schedule = PaymentSchedule::generate(
            reference_date,
            maturity,
            frequency_for_tenor(tenor)?,
            DayCount::Act360,
        )?;
        Ok(Self::new(
            reference_date,
            fixed_rate,
            Arc::new(fixed_schedule),
            Arc::new(float_schedule),
            tenor,
        ))
    }

    /// The fixed leg schedule handle.
    #[must_use]
    pub fn fixed_schedule(&self) -> &Arc<PaymentSchedule> {
        &self.fixed_schedule
    }

    /// The floating leg schedule handle.
    #[must_use]
    pub fn float_schedule(&self) -> &Arc<PaymentSchedule> {
        &self.float_schedule
    }
}

impl CalibrationInstrument for Swap {
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn kind(&self) -> InstrumentKind {
        InstrumentKind::Swap
    }

    fn description(&self) -> String {
        format!(
            "Swap {} {} @ {:.4}%",
            self.tenor,
            self.end_date(),
            self.fixed_rate * 100.0
        )
    }

    fn rate(&self) -> f64 {
        self.fixed_rate
    }

    fn reference_date(&self) -> Date {
        self.reference_date
    }

    fn start_date(&self) -> Date {
        self.float_schedule.start_date()
    }

    fn end_date(&self) -> Date {
        self.float_schedule.end_date().max(self.fixed_schedule.end_date())
    }

    fn index_tenor(&self) -> Option<CurveType> {
        Some(self.tenor)
    }

    fn model_price(&self, model: &dyn CurveModel) -> CurveResult<f64> {
        let tenor = self.tenor.year_fraction()?;
        Ok(float_leg_pv(model, &self.float_schedule, tenor, 0.0)?
            - fixed_leg_pv(model, &self.fixed_schedule, self.fixed_rate)?)
    }

    fn accumulate_gradient(
        &self,
        model: &dyn CurveModel,
        multiplier: f64,
        gradient: &mut [f64],
        filter: Option<CurveType>,
    ) -> CurveResult<()> {
        let m = -multiplier;
        let tenor = self.tenor.year_fraction()?;
        accumulate_float_leg(model, &self.float_schedule, tenor, 0.0, m, gradient, filter)?;
        accumulate_fixed_leg(model, &self.fixed_schedule, self.fixed_rate, -m, gradient, filter)
    }

    fn clone_with_lookup(
        &self,
        lookup: &mut CloneLookup,
    ) -> CurveResult<Arc<dyn CalibrationInstrument>> {
        Ok(Arc::new(Self {
            reference_date: self.reference_date,
            fixed_rate: self.fixed_rate,
            fixed_schedule: lookup.get(&self.fixed_schedule)?,
            float_schedule: lookup.get(&self.float_schedule)?,
            tenor: self.tenor,
        }))
    }
}

/// Overnight index swap.
///
/// The compounded overnight leg telescopes to `DF(start) − DF(end)` on the
/// discounting spine; par package `PV = [DF(s) − DF(e)] − K · annuity`.
#[derive(Debug, Clone)]
pub struct Ois {
    reference_date: Date,
    rate: f64,
    fixed_schedule: Arc<PaymentSchedule>,
}

impl Ois {
    /// Creates an OIS from its fixed-leg schedule.
    #[must_use]
    pub fn new(reference_date: Date, rate: f64, fixed_schedule: Arc<PaymentSchedule>) -> Self {
        Self {
            reference_date,
            rate,
            fixed_schedule,
        }
    }

    /// Creates a spot-starting OIS with an annual fixed leg.
    ///
    /// # Errors
    ///
    /// Propagates schedule generation failures.
    pub fn par(reference_date: Date, maturity: Date, rate: f64) -> CurveResult<Self> {
        let schedule = PaymentSchedule::generate(
            reference_date,
            maturity,
            Frequency::Annual,
            DayCount::Act360,
        )?;
        Ok(Self::new(reference_date, rate, Arc::new(schedule)))
    }
}

impl CalibrationInstrument for Ois {
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn kind(&self) -> InstrumentKind {
        InstrumentKind::Ois
    }

    fn description(&self) -> String {
        format!("OIS {} @ {:.4}%", self.end_date(), self.rate * 100.0)
    }

    fn rate(&self) -> f64 {
        self.rate
    }

    fn reference_date(&self) -> Date {
        self.reference_date
    }

    fn start_date(&self) -> Date {
        self.fixed_schedule.start_date()
    }

    fn end_date(&self) -> Date {
        self.fixed_schedule.end_date()
    }

    fn model_price(&self, model: &dyn CurveModel) -> CurveResult<f64> {
        let start = model.discount_factor(model.flow_time(self.start_date()))?;
        let end = model.discount_factor(model.flow_time(self.end_date()))?;
        Ok((start - end) - fixed_leg_pv(model, &self.fixed_schedule, self.rate)?)
    }

    fn accumulate_gradient(
        &self,
        model: &dyn CurveModel,
        multiplier: f64,
        gradient: &mut [f64],
        filter: Option<CurveType>,
    ) -> CurveResult<()> {
        let m = -multiplier;
        model.accumulate_discount_factor_gradient(
            model.flow_time(self.start_date()),
            m,
            gradient,
            filter,
        )?;
        model.accumulate_discount_factor_gradient(
            model.flow_time(self.end_date()),
            -m,
            gradient,
            filter,
        )?;
        accumulate_fixed_leg(model, &self.fixed_schedule, self.rate, -m, gradient, filter)
    }

    fn clone_with_lookup(
        &self,
        lookup: &mut CloneLookup,
    ) -> CurveResult<Arc<dyn CalibrationInstrument>> {
        Ok(Arc::new(Self {
            reference_date: self.reference_date,
            rate: self.rate,
            fixed_schedule: lookup.get(&self.fixed_schedule)?,
        }))
    }
}

/// Single-currency tenor basis swap.
///
/// Reference leg (carrying the quoted spread) against another tenor's leg:
/// `PV = PV_float(reference + spread) − PV_float(other)`.
#[derive(Debug, Clone)]
pub struct TenorBasisSwap {
    reference_date: Date,
    spread: f64,
    reference_tenor: CurveType,
    other_tenor: CurveType,
    reference_schedule: Arc<PaymentSchedule>,
    other_schedule: Arc<PaymentSchedule>,
}

impl TenorBasisSwap {
    /// Creates a basis swap from explicit leg schedules.
    #[must_use]
    pub fn new(
        reference_date: Date,
        spread: f64,
        reference_tenor: CurveType,
        other_tenor: CurveType,
        reference_schedule: Arc<PaymentSchedule>,
        other_schedule: Arc<PaymentSchedule>,
    ) -> Self {
        Self {
            reference_date,
            spread,
            reference_tenor,
            other_tenor,
            reference_schedule,
            other_schedule,
        }
    }

    /// Creates a spot-starting par basis swap, each leg on its tenor's
    /// natural frequency.
    ///
    /// # Errors
    ///
    /// Propagates schedule generation and tenor resolution failures.
    pub fn par(
        reference_date: Date,
        maturity: Date,
        spread: f64,
        reference_tenor: CurveType,
        other_tenor: CurveType,
    ) -> CurveResult<Self> {
        let reference_schedule = PaymentSchedule::generate(
            reference_date,
            maturity,
            frequency_for_tenor(reference_tenor)?,
            DayCount::Act360,
        )?;
        let other_schedule = PaymentSchedule::generate(
            reference_date,
            maturity,
            frequency_for_tenor(other_tenor)?,
            DayCount::Act360,
        )?;
        Ok(Self::new(
            reference_date,
            spread,
            reference_tenor,
            other_tenor,
            Arc::new(reference_schedule),
            Arc::new(other_schedule),
        ))
    }

    /// The leg tenor carrying the quoted spread.
    #[must_use]
    pub fn reference_tenor(&self) -> CurveType {
        self.reference_tenor
    }

    /// The non-reference leg tenor.
    #[must_use]
    pub fn other_tenor(&self) -> CurveType {
        self.other_tenor
    }

    /// Whether both legs project the same index (no real basis).
    #[must_use]
    pub fn legs_identical(&self) -> bool {
        self.reference_tenor == self.other_tenor
    }
}

impl CalibrationInstrument for TenorBasisSwap {
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn kind(&self) -> InstrumentKind {
        InstrumentKind::TenorBasisSwap
    }

    fn description(&self) -> String {
        format!(
            "Basis {}/{} {} @ {:.2}bp",
            self.reference_tenor,
            self.other_tenor,
            self.end_date(),
            self.spread * 10_000.0
        )
    }

    fn rate(&self) -> f64 {
        self.spread
    }

    fn reference_date(&self) -> Date {
        self.reference_date
    }

    fn start_date(&self) -> Date {
        self.reference_schedule.start_date()
    }

    fn end_date(&self) -> Date {
        self.reference_schedule
            .end_date()
            .max(self.other_schedule.end_date())
    }

    fn index_tenor(&self) -> Option<CurveType> {
        Some(self.other_tenor)
    }

    fn model_price(&self, model: &dyn CurveModel) -> CurveResult<f64> {
        let reference_yf = self.reference_tenor.year_fraction()?;
        let other_yf = self.other_tenor.year_fraction()?;
        Ok(
            float_leg_pv(model, &self.reference_schedule, reference_yf, self.spread)?
                - float_leg_pv(model, &self.other_schedule, other_yf, 0.0)?,
        )
    }

    fn accumulate_gradient(
        &self,
        model: &dyn CurveModel,
        multiplier: f64,
        gradient: &mut [f64],
        filter: Option<CurveType>,
    ) -> CurveResult<()> {
        let m = -multiplier;
        accumulate_float_leg(
            model,
            &self.reference_schedule,
            self.reference_tenor.year_fraction()?,
            self.spread,
            m,
            gradient,
            filter,
        )?;
        accumulate_float_leg(
            model,
            &self.other_schedule,
            self.other_tenor.year_fraction()?,
            0.0,
            -m,
            gradient,
            filter,
        )
    }

    fn clone_with_lookup(
        &self,
        lookup: &mut CloneLookup,
    ) -> CurveResult<Arc<dyn CalibrationInstrument>> {
        Ok(Arc::new(Self {
            reference_date: self.reference_date,
            spread: self.spread,
            reference_tenor: self.reference_tenor,
            other_tenor: self.other_tenor,
            reference_schedule: lookup.get(&self.reference_schedule)?,
            other_schedule: lookup.get(&self.other_schedule)?,
        }))
    }
}

/// Cross-currency basis swap, collapsed to its funding-basis form: the
/// overnight-funded leg against the index leg plus the quoted basis.
///
/// `PV = [DF(s) − DF(e)] − PV_float(tenor + spread)`; the instrument informs
/// the discount spread once the tenor curve is known. The currency pair is
/// carried for knot-placement consistency checks.
#[derive(Debug, Clone)]
pub struct CrossCurrencyBasisSwap {
    reference_date: Date,
    spread: f64,
    tenor: CurveType,
    pair: CurrencyPair,
    float_schedule: Arc<PaymentSchedule>,
}

impl CrossCurrencyBasisSwap {
    /// Creates a cross-currency basis swap from its index-leg schedule.
    #[must_use]
    pub fn new(
        reference_date: Date,
        spread: f64,
        tenor: CurveType,
        pair: CurrencyPair,
        float_schedule: Arc<PaymentSchedule>,
    ) -> Self {
        Self {
            reference_date,
            spread,
            tenor,
            pair,
            float_schedule,
        }
    }

    /// Creates a spot-starting par cross-currency basis swap.
    ///
    /// # Errors
    ///
    /// Propagates schedule generation and tenor resolution failures.
    pub fn par(
        reference_date: Date,
        maturity: Date,
        spread: f64,
        tenor: CurveType,
        pair: CurrencyPair,
    ) -> CurveResult<Self> {
        let schedule = PaymentSchedule::generate(
            reference_date,
            maturity,
            frequency_for_tenor(tenor)?,
            DayCount::Act360,
        )?;
        Ok(Self::new(reference_date, spread, tenor, pair, Arc::new(schedule)))
    }
}

impl CalibrationInstrument for CrossCurrencyBasisSwap {
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn kind(&self) -> InstrumentKind {
        InstrumentKind::CrossCurrencySwap
    }

    fn description(&self) -> String {
        format!(
            "XCcy {} {} {} @ {:.2}bp",
            self.pair,
            self.tenor,
            self.end_date(),
            self.spread * 10_000.0
        )
    }

    fn rate(&self) -> f64 {
        self.spread
    }

    fn reference_date(&self) -> Date {
        self.reference_date
    }

    fn start_date(&self) -> Date {
        self.float_schedule.start_date()
    }

    fn end_date(&self) -> Date {
        self.float_schedule.end_date()
    }

    fn index_tenor(&self) -> Option<CurveType> {
        Some(self.tenor)
    }

    fn currency_pair(&self) -> Option<CurrencyPair> {
        Some(self.pair)
    }

    fn model_price(&self, model: &dyn CurveModel) -> CurveResult<f64> {
        let start = model.discount_factor(model.flow_time(self.start_date()))?;
        let end = model.discount_factor(model.flow_time(self.end_date()))?;
        let tenor = self.tenor.year_fraction()?;
        Ok((start - end) - float_leg_pv(model, &self.float_schedule, tenor, self.spread)?)
    }

    fn accumulate_gradient(
        &self,
        model: &dyn CurveModel,
        multiplier: f64,
        gradient: &mut [f64],
        filter: Option<CurveType>,
    ) -> CurveResult<()> {
        let m = -multiplier;
        model.accumulate_discount_factor_gradient(
            model.flow_time(self.start_date()),
            m,
            gradient,
            filter,
        )?;
        model.accumulate_discount_factor_gradient(
            model.flow_time(self.end_date()),
            -m,
            gradient,
            filter,
        )?;
        accumulate_float_leg(
            model,
            &self.float_schedule,
            self.tenor.year_fraction()?,
            self.spread,
            -m,
            gradient,
            filter,
        )
    }

    fn clone_with_lookup(
        &self,
        lookup: &mut CloneLookup,
    ) -> CurveResult<Arc<dyn CalibrationInstrument>> {
        Ok(Arc::new(Self {
            reference_date: self.reference_date,
            spread: self.spread,
            tenor: self.tenor,
            pair: self.pair,
            float_schedule: lookup.get(&self.float_schedule)?,
        }))
    }
}
