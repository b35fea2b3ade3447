//! Single-curve model.

use strata_core::Date;
use strata_math::{ExtrapolationMethod, InterpolationMethod};

use crate::curve_type::CurveType;
use crate::error::{CurveError, CurveResult};
use crate::instruments::CalibrationInstruments;
use crate::knots::{KnotPoint, PiecewiseCurve};

use super::{
    compute_derived, require_state, CurveModel, DerivedQuantities, Formulation, ModelState,
};

/// The classic one-curve world: a single base curve answers discounting and
/// every projection query alike. Curve-type filters and tenors are ignored,
/// which is exactly the historical single-curve behavior the multi-curve
/// variants generalize away from.
#[derive(Debug, Clone)]
pub struct SingleCurveModel {
    reference_date: Date,
    base_rate: CurveType,
    formulation: Formulation,
    base_curve: PiecewiseCurve,
    state: ModelState,
    instruments: Option<CalibrationInstruments>,
    derived: Option<DerivedQuantities>,
}

impl SingleCurveModel {
    /// Creates a model with the default monotone-convex base curve.
    #[must_use]
    pub fn new(reference_date: Date, base_rate: CurveType) -> Self {
        Self {
            reference_date,
            base_rate,
            formulation: Formulation::default(),
            base_curve: PiecewiseCurve::standard(),
            state: ModelState::Uninitialized,
            instruments: None,
            derived: None,
        }
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

    /// Deep-copies the model for scenario analysis: curves are copied, and
    /// attached instruments are cloned through the lookup so components
    /// shared between instruments stay shared in the copy.
    pub fn clone_with_lookup(
        &self,
        lookup: &mut crate::clone_lookup::CloneLookup,
    ) -> CurveResult<Self> {
        let mut clone = self.clone();
        if let Some(instruments) = &self.instruments {
            clone.instruments = Some(instruments.clone_with_lookup(lookup)?);
        }
        Ok(clone)
    }
}

impl CurveModel for SingleCurveModel {
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
        // Every placeable tag lands on the one curve.
        if matches!(curve_type, CurveType::Null | CurveType::AllTenors) {
            return Err(CurveError::invalid_curve_type(curve_type, "add_knot_point"));
        }
        self.base_curve.add_knot_point(knot)?;
        self.state = ModelState::KnotsPlaced;
        Ok(())
    }

    fn finalize(&mut self) -> CurveResult<()> {
        require_state(self.state, &[ModelState::KnotsPlaced], "finalize")?;
        self.state = ModelState::Solving;
        Ok(())
    }

    fn discount_factor(&self, flow_time: f64) -> CurveResult<f64> {
        require_state(
            self.state,
            &[ModelState::Solving, ModelState::Finalized],
            "discount_factor",
        )?;
        self.formulation.discount_factor(&self.base_curve, flow_time)
    }

    fn spine_discount_factor(&self, flow_time: f64, curve_type: CurveType) -> CurveResult<f64> {
        if matches!(curve_type, CurveType::Null | CurveType::AllTenors) {
            return Err(CurveError::invalid_curve_type(
                curve_type,
                "spine_discount_factor",
            ));
        }
        self.discount_factor(flow_time)
    }

    fn accumulate_discount_factor_gradient(
        &self,
        flow_time: f64,
        multiplier: f64,
        gradient: &mut [f64],
        _filter: Option<CurveType>,
    ) -> CurveResult<()> {
        // Single-curve default: the filter is ignored.
        self.formulation
            .accumulate_gradient(&self.base_curve, flow_time, multiplier, gradient)
    }

    fn unknown_count(&self, _filter: Option<CurveType>) -> usize {
        // Single-curve default: the filter is ignored.
        self.base_curve.unknown_count()
    }

    fn variables(&self) -> Vec<f64> {
        self.base_curve.variables()
    }

    fn set_variables(&mut self, values: &[f64]) -> CurveResult<()> {
        require_state(self.state, &[ModelState::Solving], "set_variables")?;
        self.base_curve.set_variables(values)
    }

    fn apply_shifts(&mut self, shifts: &[f64]) -> CurveResult<()> {
        require_state(self.state, &[ModelState::Solving], "apply_shifts")?;
        self.base_curve.apply_shifts(shifts)
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
    use approx::assert_relative_eq;

    fn reference() -> Date {
        Date::from_ymd(2025, 6, 16).unwrap()
    }

    fn solving_model() -> SingleCurveModel {
        let mut model = SingleCurveModel::new(reference(), CurveType::M3).with_base_methods(
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
        model.finalize().unwrap();
        model
    }

    #[test]
    fn test_lifecycle() {
        let mut model = SingleCurveModel::new(reference(), CurveType::M3);
        assert_eq!(model.state(), ModelState::Uninitialized);
        assert!(model.discount_factor(1.0).is_err());
        assert!(model.finalize().is_err());

        model
            .add_knot_point(CurveType::M3, KnotPoint::new(1.0, 0.02))
            .unwrap();
        assert_eq!(model.state(), ModelState::KnotsPlaced);

        model.finalize().unwrap();
        assert_eq!(model.state(), ModelState::Solving);
        assert!(model
            .add_knot_point(CurveType::M3, KnotPoint::new(2.0, 0.05))
            .is_err());

        model.finish_calibration().unwrap();
        assert_eq!(model.state(), ModelState::Finalized);
        assert!(model.set_variables(&[0.02]).is_err());
        assert!(model.finish_calibration().is_err());
    }

    #[test]
    fn test_discount_factor_ignores_tenor() {
        let model = solving_model();
        let df = model.discount_factor(2.0).unwrap();
        assert_relative_eq!(df, (-0.05f64).exp());
        assert_relative_eq!(model.tenor_discount_factor(2.0, 0.25).unwrap(), df);
        assert_relative_eq!(
            model
                .spine_discount_factor(2.0, CurveType::Discount)
                .unwrap(),
            df
        );
        assert!(model
            .spine_discount_factor(2.0, CurveType::AllTenors)
            .is_err());
    }

    #[test]
    fn test_df_at_zero_is_one() {
        let model = solving_model();
        assert_relative_eq!(model.discount_factor(0.0).unwrap(), 1.0);
    }

    #[test]
    fn test_variable_round_trip() {
        let mut model = solving_model();
        assert_eq!(model.unknown_count(None), 2);
        assert_eq!(model.variables(), vec![0.02, 0.05]);
        model.apply_shifts(&[0.01, -0.01]).unwrap();
        assert_eq!(model.variables(), vec![0.03, 0.04]);
    }

    #[test]
    fn test_gradient_ignores_filter() {
        let model = solving_model();
        let mut grad = vec![0.0; 2];
        model
            .accumulate_discount_factor_gradient(1.5, 1.0, &mut grad, Some(CurveType::M6))
            .unwrap();
        assert!(grad.iter().any(|g| *g != 0.0));
    }
}
