//! Multi-tenor model: base-rate curve, discount-spread curve, tenor surface.

use strata_core::Date;
use strata_math::{ExtrapolationMethod, InterpolationMethod};

use crate::curve_type::CurveType;
use crate::error::{CurveError, CurveResult};
use crate::instruments::CalibrationInstruments;
use crate::knots::{KnotPoint, PiecewiseCurve};
use crate::surface::{TenorSpreadSurface, TssInterpolation};

use super::{
    compute_derived, filter_allows, require_state, CurveModel, DerivedQuantities, Formulation,
    ModelState,
};

/// Multi-tenor model with a distinct discounting spine.
///
/// When the base rate is a tenor (the usual case: 3M-based markets funded on
/// OIS collateral), the discounting curve is expressed as a spread curve over
/// the base, alongside the tenor spread surface. When the base rate *is*
/// `Discount`, the discount-spread curve degenerates away and this variant
/// behaves like [`super::MultiCurveModel`] with an OIS base.
///
/// Composition rule (pinned by tests):
///
/// - base spine = base curve under the formulation
/// - `DF(t)` = base · `exp(−s_discount(t))` (base when base rate = Discount)
/// - `TDF(t, τ)` = base · `exp(−spread(τ, t))`
///
/// Unknown ordering: base curve, then discount-spread curve, then surface
/// curves in ascending tenor order.
#[derive(Debug, Clone)]
pub struct MultiTenorModel {
    reference_date: Date,
    base_rate: CurveType,
    formulation: Formulation,
    base_curve: PiecewiseCurve,
    discount_spread: Option<PiecewiseCurve>,
    surface: TenorSpreadSurface,
    state: ModelState,
    instruments: Option<CalibrationInstruments>,
    derived: Option<DerivedQuantities>,
}

impl MultiTenorModel {
    /// Creates a model over the given base rate.
    ///
    /// # Errors
    ///
    /// `InvalidCurveType` unless the base rate is a tenor or `Discount`.
    pub fn new(
        reference_date: Date,
        base_rate: CurveType,
        tss: Box<dyn TssInterpolation>,
    ) -> CurveResult<Self> {
        let discount_spread = if base_rate == CurveType::Discount {
            None
        } else {
            Some(PiecewiseCurve::new(
                InterpolationMethod::StraightLine,
                ExtrapolationMethod::Flat,
                ExtrapolationMethod::Flat,
            ))
        };
        Ok(Self {
            reference_date,
            base_rate,
            formulation: Formulation::default(),
            base_curve: PiecewiseCurve::standard(),
            discount_spread,
            surface: TenorSpreadSurface::new(base_rate, tss)?,
            state: ModelState::Uninitialized,
            instruments: None,
            derived: None,
        })
    }

    /// Sets the base-curve formulation.
    #[must_use]
    pub fn with_formulation(mut self, formulation: Formulation) -> Self {
        self.formulation = formulation;
        self
    }

    /// Sets the base-curve interpolation and extrapolation methods.
    #[must_use]
    pub fn with_base_methods(
        mut self,
        interpolation: InterpolationMethod,
        left: ExtrapolationMethod,
        right: ExtrapolationMethod,
    ) -> Self {
        self.base_curve = PiecewiseCurve::new(interpolation, left, right);
        self
    }

    /// The base curve.
    #[must_use]
    pub fn base_curve(&self) -> &PiecewiseCurve {
        &self.base_curve
    }

    /// The discount-spread curve, absent when the base rate is `Discount`.
    #[must_use]
    pub fn discount_spread(&self) -> Option<&PiecewiseCurve> {
        self.discount_spread.as_ref()
    }

    /// The tenor spread surface.
    #[must_use]
    pub fn surface(&self) -> &TenorSpreadSurface {
        &self.surface
    }

    /// Deep-copies the model for scenario analysis: curves are copied, and
    /// attached instruments are cloned through the lookup so components
    /// shared between instruments stay shared in the copy.
    pub fn clone_with_lookup(&self, lookup: &mut crate::clone_lookup::CloneLookup) -> CurveResult<Self> {
        let mut clone = self.clone();
        if let Some(instruments) = &self.instruments {
            clone.instruments = Some(instruments.clone_with_lookup(lookup)?);
        }
        Ok(clone)
    }

    fn base_unknowns(&self) -> usize {
        self.base_curve.unknown_count()
    }

    fn discount_unknowns(&self) -> usize {
        self.discount_spread
            .as_ref()
            .map_or(0, PiecewiseCurve::unknown_count)
    }

    fn base_spine(&self, flow_time: f64) -> CurveResult<f64> {
        require_state(
            self.state,
            &[ModelState::Solving, ModelState::Finalized],
            "discount_factor",
        )?;
        self.formulation.discount_factor(&self.base_curve, flow_time)
    }
}

impl CurveModel for MultiTenorModel {
    fn reference_date(&self) -> Date {
        self.reference_date
    }

    fn base_rate(&self) -> CurveType {
        self.base_rate
    }

    fn state(&self) -> ModelState {
        self.state
    }

    fn formulation(&self) -> Formulation {
        self.formulation
    }

    fn add_knot_point(&mut self, curve_type: CurveType, knot: KnotPoint) -> CurveResult<()> {
        require_state(
            self.state,
            &[ModelState::Uninitialized, ModelState::KnotsPlaced],
            "add_knot_point",
        )?;
        if curve_type == self.base_rate {
            self.base_curve.add_knot_point(knot)?;
        } else if curve_type == CurveType::Discount {
            self.discount_spread
                .as_mut()
                .expect("base != Discount implies a discount-spread curve")
                .add_knot_point(knot)?;
        } else {
            self.surface.add_knot_point(curve_type, knot)?;
        }
        self.state = ModelState::KnotsPlaced;
        Ok(())
    }

    fn finalize(&mut self) -> CurveResult<()> {
        require_state(self.state, &[ModelState::KnotsPlaced], "finalize")?;
        self.surface.finalize()?;
        self.state = ModelState::Solving;
        Ok(())
    }

    fn discount_factor(&self, flow_time: f64) -> CurveResult<f64> {
        let base = self.base_spine(flow_time)?;
        match &self.discount_spread {
            Some(spread_curve) => Ok(base * (-spread_curve.evaluate(flow_time)?).exp()),
            None => Ok(base),
        }
    }

    fn tenor_discount_factor(&self, flow_time: f64, tenor: f64) -> CurveResult<f64> {
        let base = self.base_spine(flow_time)?;
        let spread = self.surface.interpolate(tenor, flow_time)?;
        Ok(base * (-spread).exp())
    }

    fn spine_discount_factor(&self, flow_time: f64, curve_type: CurveType) -> CurveResult<f64> {
        if curve_type == self.base_rate {
            return self.base_spine(flow_time);
        }
        if curve_type == CurveType::Discount {
            return self.discount_factor(flow_time);
        }
        if curve_type.is_tenor() {
            return self.tenor_discount_factor(flow_time, curve_type.year_fraction()?);
        }
        Err(CurveError::invalid_curve_type(
            curve_type,
            "spine_discount_factor",
        ))
    }

    fn accumulate_discount_factor_gradient(
        &self,
        flow_time: f64,
        multiplier: f64,
        gradient: &mut [f64],
        filter: Option<CurveType>,
    ) -> CurveResult<()> {
        let nb = self.base_unknowns();
        let nd = self.discount_unknowns();
        match &self.discount_spread {
            Some(spread_curve) => {
                let spread_factor = (-spread_curve.evaluate(flow_time)?).exp();
                let df = self.base_spine(flow_time)? * spread_factor;
                if filter_allows(filter, self.base_rate) {
                    self.formulation.accumulate_gradient(
                        &self.base_curve,
                        flow_time,
                        multiplier * spread_factor,
                        &mut gradient[..nb],
                    )?;
                }
                if filter_allows(filter, CurveType::Discount) {
                    spread_curve.accumulate_gradient(
                        flow_time,
                        -multiplier * df,
                        &mut gradient[nb..nb + nd],
                    )?;
                }
                Ok(())
            }
            None => {
                if filter_allows(filter, self.base_rate) {
                    self.formulation.accumulate_gradient(
                        &self.base_curve,
                        flow_time,
                        multiplier,
                        &mut gradient[..nb],
                    )?;
                }
                Ok(())
            }
        }
    }

    fn accumulate_tenor_discount_factor_gradient(
        &self,
        flow_time: f64,
        tenor: f64,
        multiplier: f64,
        gradient: &mut [f64],
        filter: Option<CurveType>,
    ) -> CurveResult<()> {
        let spread = self.surface.interpolate(tenor, flow_time)?;
        let spread_factor = (-spread).exp();
        let tdf = self.base_spine(flow_time)? * spread_factor;
        let nb = self.base_unknowns();
        let nd = self.discount_unknowns();

        if filter_allows(filter, self.base_rate) {
            self.formulation.accumulate_gradient(
                &self.base_curve,
                flow_time,
                multiplier * spread_factor,
                &mut gradient[..nb],
            )?;
        }
        self.surface.accumulate_gradient(
            tenor,
            flow_time,
            -multiplier * tdf,
            &mut gradient[nb + nd..],
            filter,
        )
    }

    fn unknown_count(&self, filter: Option<CurveType>) -> usize {
        match filter {
            None | Some(CurveType::AllTenors) => {
                self.base_unknowns() + self.discount_unknowns() + self.surface.unknown_count()
            }
            Some(ct) if ct == self.base_rate => self.base_unknowns(),
            Some(CurveType::Discount) => self.discount_unknowns(),
            Some(ct) => self.surface.unknown_count_for(ct),
        }
    }

    fn variables(&self) -> Vec<f64> {
        let mut values = self.base_curve.variables();
        if let Some(spread_curve) = &self.discount_spread {
            values.extend(spread_curve.variables());
        }
        values.extend(self.surface.variables());
        values
    }

    fn set_variables(&mut self, values: &[f64]) -> CurveResult<()> {
        require_state(self.state, &[ModelState::Solving], "set_variables")?;
        let nb = self.base_unknowns();
        let nd = self.discount_unknowns();
        if values.len() != self.unknown_count(None) {
            return Err(CurveError::invalid_state(
                "set_variables",
                format!("expected {} values, got {}", self.unknown_count(None), values.len()),
            ));
        }
        self.base_curve.set_variables(&values[..nb])?;
        if let Some(spread_curve) = &mut self.discount_spread {
            spread_curve.set_variables(&values[nb..nb + nd])?;
        }
        self.surface.set_variables(&values[nb + nd..])
    }

    fn apply_shifts(&mut self, shifts: &[f64]) -> CurveResult<()> {
        require_state(self.state, &[ModelState::Solving], "apply_shifts")?;
        let nb = self.base_unknowns();
        let nd = self.discount_unknowns();
        if shifts.len() != self.unknown_count(None) {
            return Err(CurveError::invalid_state(
                "apply_shifts",
                format!("expected {} shifts, got {}", self.unknown_count(None), shifts.len()),
            ));
        }
        self.base_curve.apply_shifts(&shifts[..nb])?;
        if let Some(spread_curve) = &mut self.discount_spread {
            spread_curve.apply_shifts(&shifts[nb..nb + nd])?;
        }
        self.surface.apply_shifts(&shifts[nb + nd..])
    }

    fn attach_instruments(&mut self, instruments: CalibrationInstruments) {
        self.instruments = Some(instruments);
    }

    fn attached_instruments(&self) -> Option<&CalibrationInstruments> {
        self.instruments.as_ref()
    }

    fn finish_calibration(&mut self) -> CurveResult<()> {
        require_state(self.state, &[ModelState::Solving], "finish_calibration")?;
        if let Some(instruments) = self.instruments.take() {
            self.derived = Some(compute_derived(self, &instruments));
        }
        self.state = ModelState::Finalized;
        Ok(())
    }

    fn derived_quantities(&self) -> Option<&DerivedQuantities> {
        self.derived.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::BasicTss;
    use approx::assert_relative_eq;

    fn reference() -> Date {
        Date::from_ymd(2025, 6, 16).unwrap()
    }

    fn yf(ct: CurveType) -> f64 {
        ct.year_fraction().unwrap()
    }

    fn solving_model() -> MultiTenorModel {
        let mut model =
            MultiTenorModel::new(reference(), CurveType::M3, Box::new(BasicTss::new()))
                .unwrap()
                .with_base_methods(
                    InterpolationMethod::StraightLine,
                    ExtrapolationMethod::Flat,
                    ExtrapolationMethod::Flat,
                );
        model
            .add_knot_point(CurveType::M3, KnotPoint::new(1.0, 0.02))
            .unwrap();
        model
            .add_knot_point(CurveType::M3, KnotPoint::new(2.0, 0.05))
            .unwrap();
        model
            .add_knot_point(CurveType::Discount, KnotPoint::new(2.0, 0.002))
            .unwrap();
        model
            .add_knot_point(CurveType::M6, KnotPoint::new(2.0, 0.004))
            .unwrap();
        model.finalize().unwrap();
        model
    }

    #[test]
    fn test_discount_composition() {
        let model = solving_model();
        let base = model.spine_discount_factor(2.0, CurveType::M3).unwrap();
        assert_relative_eq!(base, (-0.05f64).exp());

        // Discount spine carries the discount spread over the base.
        let df = model.discount_factor(2.0).unwrap();
        assert_relative_eq!(df, base * (-0.002f64).exp());
        assert_relative_eq!(
            model.spine_discount_factor(2.0, CurveType::Discount).unwrap(),
            df
        );

        // Tenor projection reads the surface, not the discount spread.
        let tdf = model.tenor_discount_factor(2.0, yf(CurveType::M6)).unwrap();
        assert_relative_eq!(tdf, base * (-0.004f64).exp());
    }

    #[test]
    fn test_variable_ordering_base_discount_surface() {
        let model = solving_model();
        assert_eq!(model.unknown_count(None), 4);
        assert_eq!(model.unknown_count(Some(CurveType::M3)), 2);
        assert_eq!(model.unknown_count(Some(CurveType::Discount)), 1);
        assert_eq!(model.unknown_count(Some(CurveType::M6)), 1);
        assert_eq!(model.variables(), vec![0.02, 0.05, 0.002, 0.004]);
    }

    #[test]
    fn test_discount_base_degenerates() {
        let mut model =
            MultiTenorModel::new(reference(), CurveType::Discount, Box::new(BasicTss::new()))
                .unwrap()
                .with_base_methods(
                    InterpolationMethod::StraightLine,
                    ExtrapolationMethod::Flat,
                    ExtrapolationMethod::Flat,
                );
        model
            .add_knot_point(CurveType::Discount, KnotPoint::new(1.0, 0.03))
            .unwrap();
        model.finalize().unwrap();

        assert!(model.discount_spread().is_none());
        let df = model.discount_factor(1.0).unwrap();
        assert_relative_eq!(df, (-0.03f64).exp());
        assert_relative_eq!(
            model.spine_discount_factor(1.0, CurveType::Discount).unwrap(),
            df
        );
    }

    #[test]
    fn test_discount_gradient_matches_bump() {
        let model = solving_model();
        let t = 1.7;
        let mut grad = vec![0.0; 4];
        model
            .accumulate_discount_factor_gradient(t, 1.0, &mut grad, None)
            .unwrap();

        let h = 1e-7;
        let base_vars = model.variables();
        for slot in 0..4 {
            let mut up = model.clone();
            let mut vars = base_vars.clone();
            vars[slot] += h;
            up.set_variables(&vars).unwrap();
            let mut down = model.clone();
            let mut vars = base_vars.clone();
            vars[slot] -= h;
            down.set_variables(&vars).unwrap();
            let numeric = (up.discount_factor(t).unwrap() - down.discount_factor(t).unwrap())
                / (2.0 * h);
            assert_relative_eq!(grad[slot], numeric, epsilon = 1e-7);
        }
    }

    #[test]
    fn test_discount_break_out_filter() {
        let model = solving_model();
        let mut grad = vec![0.0; 4];
        model
            .accumulate_discount_factor_gradient(1.7, 1.0, &mut grad, Some(CurveType::Discount))
            .unwrap();
        // Only the discount-spread slot receives mass.
        assert!(grad[..2].iter().all(|g| *g == 0.0));
        assert!(grad[2] != 0.0);
        assert_eq!(grad[3], 0.0);
    }
}
