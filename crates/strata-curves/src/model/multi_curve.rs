//! Multi-curve model: base-rate curve plus tenor spread surface.

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

/// Base-rate curve plus a tenor spread surface; discounting reads the base
/// curve.
///
/// Composition rule (pinned by tests):
///
/// - `DF(t)` = base curve under the formulation
/// - `TDF(t, τ)` = `DF(t) · exp(−spread(τ, t))`
/// - spines: base → `DF`, `Discount` → `DF`, tenor → `TDF`
#[derive(Debug, Clone)]
pub struct MultiCurveModel {
    reference_date: Date,
    base_rate: CurveType,
    formulation: Formulation,
    base_curve: PiecewiseCurve,
    surface: TenorSpreadSurface,
    state: ModelState,
    instruments: Option<CalibrationInstruments>,
    derived: Option<DerivedQuantities>,
}

impl MultiCurveModel {
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
        Ok(Self {
            reference_date,
            base_rate,
            formulation: Formulation::default(),
            base_curve: PiecewiseCurve::standard(),
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
}

impl CurveModel for MultiCurveModel {
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
        require_state(
            self.state,
            &[ModelState::Solving, ModelState::Finalized],
            "discount_factor",
        )?;
        self.formulation.discount_factor(&self.base_curve, flow_time)
    }

    fn tenor_discount_factor(&self, flow_time: f64, tenor: f64) -> CurveResult<f64> {
        let base = self.discount_factor(flow_time)?;
        let spread = self.surface.interpolate(tenor, flow_time)?;
        Ok(base * (-spread).exp())
    }

    fn spine_discount_factor(&self, flow_time: f64, curve_type: CurveType) -> CurveResult<f64> {
        if curve_type == self.base_rate || curve_type == CurveType::Discount {
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
        if filter_allows(filter, self.base_rate) {
            let nb = self.base_unknowns();
            self.formulation.accumulate_gradient(
                &self.base_curve,
                flow_time,
                multiplier,
                &mut gradient[..nb],
            )?;
        }
        Ok(())
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
        let tdf = self.discount_factor(flow_time)? * spread_factor;
        let nb = self.base_unknowns();

        // Product rule: TDF = DF_base · exp(−s).
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
            &mut gradient[nb..],
            filter,
        )
    }

    fn unknown_count(&self, filter: Option<CurveType>) -> usize {
        match filter {
            None | Some(CurveType::AllTenors) => self.base_unknowns() + self.surface.unknown_count(),
            Some(ct) if ct == self.base_rate => self.base_unknowns(),
            Some(CurveType::Discount) => {
                // Discount is the base curve here.
                if self.base_rate == CurveType::Discount {
                    self.base_unknowns()
                } else {
                    0
                }
            }
            Some(ct) => self.surface.unknown_count_for(ct),
        }
    }

    fn variables(&self) -> Vec<f64> {
        let mut values = self.base_curve.variables();
        values.extend(self.surface.variables());
        values
    }

    fn set_variables(&mut self, values: &[f64]) -> CurveResult<()> {
        require_state(self.state, &[ModelState::Solving], "set_variables")?;
        let nb = self.base_unknowns();
        if values.len() != nb + self.surface.unknown_count() {
            return Err(CurveError::invalid_state(
                "set_variables",
                format!("expected {} values, got {}", self.unknown_count(None), values.len()),
            ));
        }
        self.base_curve.set_variables(&values[..nb])?;
        self.surface.set_variables(&values[nb..])
    }

    fn apply_shifts(&mut self, shifts: &[f64]) -> CurveResult<()> {
        require_state(self.state, &[ModelState::Solving], "apply_shifts")?;
        let nb = self.base_unknowns();
        if shifts.len() != nb + self.surface.unknown_count() {
            return Err(CurveError::invalid_state(
                "apply_shifts",
                format!("expected {} shifts, got {}", self.unknown_count(None), shifts.len()),
            ));
        }
        self.base_curve.apply_shifts(&shifts[..nb])?;
        self.surface.apply_shifts(&shifts[nb..])
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
