//! Money-market calibration instruments: deposits, FRAs, rate futures.

use std::sync::Arc;

use strata_core::{Date, DayCount};

use crate::clone_lookup::CloneLookup;
use crate::curve_type::CurveType;
use crate::error::CurveResult;
use crate::model::CurveModel;

use super::{CalibrationInstrument, InstrumentKind};

/// Cash deposit.
///
/// Pays `1 + r·τ` at maturity against 1 at start. Projection reads the
/// deposit's index tenor; the par residual is
/// `(1 + r·τ)·TDF(end) − TDF(start)`.
#[derive(Debug, Clone)]
pub struct Deposit {
    reference_date: Date,
    start: Date,
    end: Date,
    rate: f64,
    day_count: DayCount,
    tenor: CurveType,
}

impl Deposit {
    /// Creates a deposit with explicit dates.
    #[must_use]
    pub fn new(
        reference_date: Date,
        start: Date,
        end: Date,
        rate: f64,
        day_count: DayCount,
        tenor: CurveType,
    ) -> Self {
        Self {
            reference_date,
            start,
            end,
            rate,
            day_count,
            tenor,
        }
    }

    /// Creates a spot-starting deposit whose maturity matches its tenor.
    ///
    /// # Errors
    ///
    /// Propagates date arithmetic and tenor resolution failures.
    pub fn spot(
        reference_date: Date,
        tenor: CurveType,
        rate: f64,
        day_count: DayCount,
    ) -> CurveResult<Self> {
        let days = (tenor.year_fraction()? * 365.0).round() as i64;
        Ok(Self::new(
            reference_date,
            reference_date,
            reference_date.add_days(days),
            rate,
            day_count,
            tenor,
        ))
    }

    fn accrual(&self) -> f64 {
        self.day_count.year_fraction(self.start, self.end)
    }
}

impl CalibrationInstrument for Deposit {
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn kind(&self) -> InstrumentKind {
        InstrumentKind::Deposit
    }

    fn description(&self) -> String {
        format!("Deposit {} @ {:.4}%", self.tenor, self.rate * 100.0)
    }

    fn rate(&self) -> f64 {
        self.rate
    }

    fn reference_date(&self) -> Date {
        self.reference_date
    }

    fn start_date(&self) -> Date {
        self.start
    }

    fn end_date(&self) -> Date {
        self.end
    }

    fn index_tenor(&self) -> Option<CurveType> {
        Some(self.tenor)
    }

    fn model_price(&self, model: &dyn CurveModel) -> CurveResult<f64> {
        let tenor = self.tenor.year_fraction()?;
        let start = model.tenor_discount_factor(model.flow_time(self.start), tenor)?;
        let end = model.tenor_discount_factor(model.flow_time(self.end), tenor)?;
        Ok((1.0 + self.rate * self.accrual()) * end - start)
    }

    fn accumulate_gradient(
        &self,
        model: &dyn CurveModel,
        multiplier: f64,
        gradient: &mut [f64],
        filter: Option<CurveType>,
    ) -> CurveResult<()> {
        // residual = -(model_price); flip once here.
        let m = -multiplier;
        let tenor = self.tenor.year_fraction()?;
        model.accumulate_tenor_discount_factor_gradient(
            model.flow_time(self.end),
            tenor,
            m * (1.0 + self.rate * self.accrual()),
            gradient,
            filter,
        )?;
        model.accumulate_tenor_discount_factor_gradient(
            model.flow_time(self.start),
            tenor,
            -m,
            gradient,
            filter,
        )
    }

    fn clone_with_lookup(
        &self,
        _lookup: &mut CloneLookup,
    ) -> CurveResult<Arc<dyn CalibrationInstrument>> {
        Ok(Arc::new(self.clone()))
    }
}

/// Forward rate agreement.
///
/// Same par package as a deposit over a forward period, with an explicit
/// fixing date used by knot-placement filters.
#[derive(Debug, Clone)]
pub struct Fra {
    reference_date: Date,
    fixing: Date,
    start: Date,
    end: Date,
    rate: f64,
    day_count: DayCount,
    tenor: CurveType,
}

impl Fra {
    /// Creates an FRA with explicit dates.
    #[must_use]
    pub fn new(
        reference_date: Date,
        fixing: Date,
        start: Date,
        end: Date,
        rate: f64,
        day_count: DayCount,
        tenor: CurveType,
    ) -> Self {
        Self {
            reference_date,
            fixing,
            start,
            end,
            rate,
            day_count,
            tenor,
        }
    }

    /// Creates an `start_months x end_months` FRA (e.g. 3x6).
    ///
    /// # Errors
    ///
    /// Propagates date arithmetic failures.
    pub fn from_months(
        reference_date: Date,
        start_months: i32,
        end_months: i32,
        rate: f64,
        day_count: DayCount,
        tenor: CurveType,
    ) -> CurveResult<Self> {
        let start = reference_date.add_months(start_months)?;
        let end = reference_date.add_months(end_months)?;
        Ok(Self::new(
            reference_date,
            start.add_days(-2),
            start,
            end,
            rate,
            day_count,
            tenor,
        ))
    }

    fn accrual(&self) -> f64 {
        self.day_count.year_fraction(self.start, self.end)
    }
}

impl CalibrationInstrument for Fra {
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn kind(&self) -> InstrumentKind {
        InstrumentKind::Fra
    }

    fn description(&self) -> String {
        format!(
            "FRA {} {} -> {} @ {:.4}%",
            self.tenor,
            self.start,
            self.end,
            self.rate * 100.0
        )
    }

    fn rate(&self) -> f64 {
        self.rate
    }

    fn reference_date(&self) -> Date {
        self.reference_date
    }

    fn start_date(&self) -> Date {
        self.start
    }

    fn end_date(&self) -> Date {
        self.end
    }

    fn fixing_date(&self) -> Option<Date> {
        Some(self.fixing)
    }

    fn index_tenor(&self) -> Option<CurveType> {
        Some(self.tenor)
    }

    fn model_price(&self, model: &dyn CurveModel) -> CurveResult<f64> {
        let tenor = self.tenor.year_fraction()?;
        let start = model.tenor_discount_factor(model.flow_time(self.start), tenor)?;
        let end = model.tenor_discount_factor(model.flow_time(self.end), tenor)?;
        Ok((1.0 + self.rate * self.accrual()) * end - start)
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
        model.accumulate_tenor_discount_factor_gradient(
            model.flow_time(self.end),
            tenor,
            m * (1.0 + self.rate * self.accrual()),
            gradient,
            filter,
        )?;
        model.accumulate_tenor_discount_factor_gradient(
            model.flow_time(self.start),
            tenor,
            -m,
            gradient,
            filter,
        )
    }

    fn clone_with_lookup(
        &self,
        _lookup: &mut CloneLookup,
    ) -> CurveResult<Arc<dyn CalibrationInstrument>> {
        Ok(Arc::new(self.clone()))
    }
}

/// Interest rate future.
///
/// Quoted as `100 − rate%`; an externally supplied convexity adjustment maps
/// the futures rate to its forward-equivalent before repricing:
/// residual drives the curve forward to `rate − convexity`.
#[derive(Debug, Clone)]
pub struct RateFuture {
    reference_date: Date,
    fixing: Date,
    start: Date,
    end: Date,
    price: f64,
    convexity_adjustment: f64,
    day_count: DayCount,
    tenor: CurveType,
}

impl RateFuture {
    /// Creates a future with explicit dates.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        reference_date: Date,
        fixing: Date,
        start: Date,
        end: Date,
        price: f64,
        convexity_adjustment: f64,
        day_count: DayCount,
        tenor: CurveType,
    ) -> Self {
        Self {
            reference_date,
            fixing,
            start,
            end,
            price,
            convexity_adjustment,
            day_count,
            tenor,
        }
    }

    /// Quoted price.
    #[must_use]
    pub fn price(&self) -> f64 {
        self.price
    }

    /// Forward rate targeted after the convexity adjustment.
    #[must_use]
    pub fn adjusted_rate(&self) -> f64 {
        self.rate() - self.convexity_adjustment
    }

    fn accrual(&self) -> f64 {
        self.day_count.year_fraction(self.start, self.end)
    }
}

impl CalibrationInstrument for RateFuture {
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn kind(&self) -> InstrumentKind {
        InstrumentKind::Future
    }

    fn description(&self) -> String {
        format!("Future {} {} @ {:.3}", self.tenor, self.start, self.price)
    }

    fn rate(&self) -> f64 {
        (100.0 - self.price) / 100.0
    }

    fn reference_date(&self) -> Date {
        self.reference_date
    }

    fn start_date(&self) -> Date {
        self.start
    }

    fn end_date(&self) -> Date {
        self.end
    }

    fn fixing_date(&self) -> Option<Date> {
        Some(self.fixing)
    }

    fn index_tenor(&self) -> Option<CurveType> {
        Some(self.tenor)
    }

    fn model_price(&self, model: &dyn CurveModel) -> CurveResult<f64> {
        let tenor = self.tenor.year_fraction()?;
        let start = model.tenor_discount_factor(model.flow_time(self.start), tenor)?;
        let end = model.tenor_discount_factor(model.flow_time(self.end), tenor)?;
        Ok((1.0 + self.adjusted_rate() * self.accrual()) * end - start)
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
        model.accumulate_tenor_discount_factor_gradient(
            model.flow_time(self.end),
            tenor,
            m * (1.0 + self.adjusted_rate() * self.accrual()),
            gradient,
            filter,
        )?;
        model.accumulate_tenor_discount_factor_gradient(
            model.flow_time(self.start),
            tenor,
            -m,
            gradient,
            filter,
        )
    }

    fn clone_with_lookup(
        &self,
        _lookup: &mut CloneLookup,
    ) -> CurveResult<Arc<dyn CalibrationInstrument>> {
        Ok(Arc::new(self.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knots::KnotPoint;
    use crate::model::SingleCurveModel;
    use approx::assert_relative_eq;
    use strata_math::{ExtrapolationMethod, InterpolationMethod};

    fn reference() -> Date {
        Date::from_ymd(2025, 6, 16).unwrap()
    }

    /// A single-curve model with a flat continuously-compounded zero rate:
    /// under the log-discount formulation, `v(t) = rate · t` is a straight
    /// line through the anchor.
    fn flat_model(rate: f64) -> SingleCurveModel {
        let mut model = SingleCurveModel::new(reference(), CurveType::M3).with_base_methods(
            InterpolationMethod::StraightLine,
            ExtrapolationMethod::Flat,
            ExtrapolationMethod::StraightLine,
        );
        model
            .add_knot_point(CurveType::M3, KnotPoint::new(30.0, rate * 30.0))
            .unwrap();
        model.finalize().unwrap();
        model
    }

    #[test]
    fn test_deposit_reprices_on_matching_curve() {
        // Continuous 2% curve; deposit quoted at the simple-rate equivalent
        // over one year.
        let model = flat_model(0.02);
        let end = reference().add_days(365);
        let tau = DayCount::Act365Fixed.year_fraction(reference(), end);
        let simple = (0.02f64.exp() - 1.0) / tau;
        let deposit = Deposit::new(
            reference(),
            reference(),
            end,
            simple,
            DayCount::Act365Fixed,
            CurveType::M3,
        );
        assert_relative_eq!(deposit.residual(&model).unwrap(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_deposit_gradient_matches_bump() {
        let model = flat_model(0.02);
        let deposit = Deposit::new(
            reference(),
            reference(),
            reference().add_days(365),
            0.021,
            DayCount::Act360,
            CurveType::M3,
        );

        let mut grad = vec![0.0; model.unknown_count(None)];
        deposit
            .accumulate_gradient(&model, 1.0, &mut grad, None)
            .unwrap();

        let h = 1e-7;
        let vars = model.variables();
        for slot in 0..vars.len() {
            let mut up = model.clone();
            let mut v = vars.clone();
            v[slot] += h;
            up.set_variables(&v).unwrap();
            let mut down = model.clone();
            let mut v = vars.clone();
            v[slot] -= h;
            down.set_variables(&v).unwrap();
            let numeric =
                (deposit.residual(&up).unwrap() - deposit.residual(&down).unwrap()) / (2.0 * h);
            assert_relative_eq!(grad[slot], numeric, epsilon = 1e-7);
        }
    }

    #[test]
    fn test_future_rate_from_price() {
        let future = RateFuture::new(
            reference(),
            reference().add_days(88),
            reference().add_days(90),
            reference().add_days(181),
            98.5,
            0.0005,
            DayCount::Act360,
            CurveType::M3,
        );
        assert_relative_eq!(future.rate(), 0.015);
        assert_relative_eq!(future.adjusted_rate(), 0.0145);
        assert_eq!(future.fixing_date().unwrap(), reference().add_days(88));
    }

    #[test]
    fn test_fra_dates() {
        let fra = Fra::from_months(
            reference(),
            3,
            6,
            0.02,
            DayCount::Act360,
            CurveType::M3,
        )
        .unwrap();
        assert_eq!(fra.start_date(), reference().add_months(3).unwrap());
        assert_eq!(fra.end_date(), reference().add_months(6).unwrap());
        assert!(fra.fixing_date().unwrap() < fra.start_date());
        assert!(fra.last_relevant_time() > 0.49);
    }
}
