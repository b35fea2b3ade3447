//! Curve value-space formulations.

use serde::{Deserialize, Serialize};

use crate::error::CurveResult;
use crate::knots::PiecewiseCurve;

/// What a base-curve knot ordinate means.
///
/// The formulation fixes the map from the stored curve value `v(t)` to the
/// discount factor, and with it the chain-rule factor used when routing
/// discount-factor sensitivities onto knot ordinates. Spread curves are not
/// affected: they always store the minus-log discount-factor ratio,
/// regardless of the base formulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Formulation {
    /// `v(t) = -ln DF(t)`; the default.
    #[default]
    LogDiscount,
    /// `v(t)` is the continuously-compounded zero rate: `DF = exp(-v·t)`.
    SpotRate,
    /// `v(t)` is the instantaneous forward rate: `DF = exp(-∫₀ᵗ v)`.
    InstantaneousForward,
}

impl Formulation {
    /// Discount factor at `t` implied by the curve under this formulation.
    pub fn discount_factor(&self, curve: &PiecewiseCurve, t: f64) -> CurveResult<f64> {
        match self {
            Self::LogDiscount => Ok((-curve.evaluate(t)?).exp()),
            Self::SpotRate => Ok((-curve.evaluate(t)? * t).exp()),
            Self::InstantaneousForward => Ok((-curve.integral(0.0, t)?).exp()),
        }
    }

    /// Accumulates `multiplier * d DF(t) / d y_k` onto the curve's unknowns.
    pub fn accumulate_gradient(
        &self,
        curve: &PiecewiseCurve,
        t: f64,
        multiplier: f64,
        gradient: &mut [f64],
    ) -> CurveResult<()> {
        if multiplier == 0.0 {
            return Ok(());
        }
        let df = self.discount_factor(curve, t)?;
        match self {
            Self::LogDiscount => curve.accumulate_gradient(t, -df * multiplier, gradient),
            Self::SpotRate => curve.accumulate_gradient(t, -t * df * multiplier, gradient),
            Self::InstantaneousForward => {
                curve.accumulate_integral_gradient(0.0, t, -df * multiplier, gradient)
            }
        }
    }

    /// Initial knot ordinate implied by a quoted simple rate at time `t`;
    /// used by knot placement to seed the solver.
    #[must_use]
    pub fn initial_knot_value(&self, rate: f64, t: f64) -> f64 {
        match self {
            Self::LogDiscount => rate * t,
            Self::SpotRate | Self::InstantaneousForward => rate,
        }
    }
}
