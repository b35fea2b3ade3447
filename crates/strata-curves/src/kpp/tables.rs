//! Table-driven knot placement: fixed knots and best-fit anchors.

use crate::curve_type::CurveType;
use crate::error::{CurveError, CurveResult};
use crate::instruments::{CalibrationInstruments, InstrumentId};
use crate::knots::KnotPoint;
use crate::model::CurveModel;

use super::{seed_value, KnotPlacement};

/// Places an explicit table of knots, independent of the instrument set.
///
/// Used for curves whose shape is dictated externally (a fixed scenario
/// curve, a regulatory grid) rather than derived from quotes.
#[derive(Debug, Clone, Default)]
pub struct FixedKpp {
    knots: Vec<(CurveType, KnotPoint)>,
}

impl FixedKpp {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a knot to the table.
    #[must_use]
    pub fn with_knot(mut self, curve_type: CurveType, knot: KnotPoint) -> Self {
        self.knots.push((curve_type, knot));
        self
    }
}

impl KnotPlacement for FixedKpp {
    fn select_instruments(
        &self,
        _instruments: &mut CalibrationInstruments,
        _model: &dyn CurveModel,
    ) -> CurveResult<()> {
        // The table is self-contained; the instrument set passes through.
        Ok(())
    }

    fn create_knot_points(
        &self,
        _instruments: &CalibrationInstruments,
        model: &mut dyn CurveModel,
    ) -> CurveResult<()> {
        if self.knots.is_empty() {
            return Err(CurveError::missing_required_instrument(
                "fixed placement has an empty knot table",
            ));
        }
        for (curve_type, knot) in &self.knots {
            model.add_knot_point(*curve_type, *knot)?;
        }
        Ok(())
    }
}

/// Best-fit placement: an explicit subset of instruments anchors knots, the
/// rest contribute residuals only, optionally with per-instrument weights
/// consumed by the least-squares objective.
///
/// With fewer knots than instruments the system is over-determined and the
/// solver produces a weighted least-squares fit rather than an exact strip.
#[derive(Debug, Clone, Default)]
pub struct BestFitKpp {
    anchors: Vec<usize>,
    extra_knots: Vec<(CurveType, KnotPoint)>,
    weights: Vec<f64>,
}

impl BestFitKpp {
    /// Creates a best-fit placement anchored on the given instrument
    /// indices (collection order after selection).
    #[must_use]
    pub fn new(anchors: Vec<usize>) -> Self {
        Self {
            anchors,
            extra_knots: Vec::new(),
            weights: Vec::new(),
        }
    }

    /// Adds an unconditioned extra knot.
    #[must_use]
    pub fn with_extra_knot(mut self, curve_type: CurveType, knot: KnotPoint) -> Self {
        self.extra_knots.push((curve_type, knot));
        self
    }

    /// Sets per-instrument residual weights (collection order).
    #[must_use]
    pub fn with_weights(mut self, weights: Vec<f64>) -> Self {
        self.weights = weights;
        self
    }
}

impl KnotPlacement for BestFitKpp {
    fn select_instruments(
        &self,
        instruments: &mut CalibrationInstruments,
        _model: &dyn CurveModel,
    ) -> CurveResult<()> {
        if instruments.is_empty() {
            return Err(CurveError::missing_required_instrument(
                "best-fit placement needs at least one instrument",
            ));
        }
        if let Some(out_of_range) = self.anchors.iter().find(|a| **a >= instruments.len()) {
            return Err(CurveError::inconsistent_instrument_set(format!(
                "best-fit anchor index {out_of_range} exceeds instrument count {}",
                instruments.len()
            )));
        }
        if !self.weights.is_empty() && self.weights.len() != instruments.len() {
            return Err(CurveError::inconsistent_instrument_set(format!(
                "best-fit weights cover {} instruments, collection has {}",
                self.weights.len(),
                instruments.len()
            )));
        }
        Ok(())
    }

    fn create_knot_points(
        &self,
        instruments: &CalibrationInstruments,
        model: &mut dyn CurveModel,
    ) -> CurveResult<()> {
        if self.anchors.is_empty() && self.extra_knots.is_empty() {
            return Err(CurveError::missing_required_instrument(
                "best-fit placement has neither anchors nor extra knots",
            ));
        }
        let base = model.base_rate();
        for &anchor in &self.anchors {
            let instrument = instruments.get(anchor).ok_or_else(|| {
                CurveError::inconsistent_instrument_set(format!(
                    "best-fit anchor index {anchor} exceeds instrument count"
                ))
            })?;
            let time = instrument.last_relevant_time();
            let value = seed_value(model, instrument.rate(), time);
            model.add_knot_point(
                base,
                KnotPoint::new(time, value).with_instrument(InstrumentId(anchor)),
            )?;
        }
        for (curve_type, knot) in &self.extra_knots {
            model.add_knot_point(*curve_type, *knot)?;
        }
        Ok(())
    }

    fn residual_weights(&self, instruments: &CalibrationInstruments) -> Option<Vec<f64>> {
        if self.weights.len() == instruments.len() {
            Some(self.weights.clone())
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruments::Deposit;
    use crate::model::{CurveModel, SingleCurveModel};
    use std::sync::Arc;
    use strata_core::{Date, DayCount};

    fn reference() -> Date {
        Date::from_ymd(2025, 6, 16).unwrap()
    }

    fn instruments() -> CalibrationInstruments {
        CalibrationInstruments::new()
            .with(Arc::new(
                Deposit::spot(reference(), CurveType::M3, 0.012, DayCount::Act360).unwrap(),
            ))
            .with(Arc::new(
                Deposit::spot(reference(), CurveType::M6, 0.014, DayCount::Act360).unwrap(),
            ))
    }

    #[test]
    fn test_fixed_kpp_places_table() {
        let mut model = SingleCurveModel::new(reference(), CurveType::M3);
        let mut set = instruments();
        let kpp = FixedKpp::new()
            .with_knot(CurveType::M3, KnotPoint::new(1.0, 0.02))
            .with_knot(CurveType::M3, KnotPoint::fixed(10.0, 0.04));
        kpp.select_instruments(&mut set, &model).unwrap();
        kpp.create_knot_points(&set, &mut model).unwrap();

        assert_eq!(model.base_curve().len(), 3);
        assert_eq!(model.unknown_count(None), 1);
        // Selection left the instruments alone.
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_fixed_kpp_empty_table_fails() {
        let mut model = SingleCurveModel::new(reference(), CurveType::M3);
        let err = FixedKpp::new()
            .create_knot_points(&instruments(), &mut model)
            .unwrap_err();
        assert!(matches!(err, CurveError::MissingRequiredInstrument { .. }));
    }

    #[test]
    fn test_best_fit_anchors_and_weights() {
        let mut model = SingleCurveModel::new(reference(), CurveType::M3);
        let mut set = instruments();
        let kpp = BestFitKpp::new(vec![1])
            .with_extra_knot(CurveType::M3, KnotPoint::new(10.0, 0.03))
            .with_weights(vec![1.0, 2.0]);
        kpp.select_instruments(&mut set, &model).unwrap();
        kpp.create_knot_points(&set, &mut model).unwrap();

        // One anchored knot + one extra, both free.
        assert_eq!(model.base_curve().len(), 3);
        assert_eq!(model.unknown_count(None), 2);
        let anchored = model.base_curve().knot(1);
        assert_eq!(anchored.instrument, Some(InstrumentId(1)));

        assert_eq!(kpp.residual_weights(&set), Some(vec![1.0, 2.0]));
    }

    #[test]
    fn test_best_fit_validation() {
        let model = SingleCurveModel::new(reference(), CurveType::M3);
        let mut set = instruments();

        let err = BestFitKpp::new(vec![7])
            .select_instruments(&mut set, &model)
            .unwrap_err();
        assert!(matches!(err, CurveError::InconsistentInstrumentSet { .. }));

        let err = BestFitKpp::new(vec![0])
            .with_weights(vec![1.0])
            .select_instruments(&mut set, &model)
            .unwrap_err();
        assert!(matches!(err, CurveError::InconsistentInstrumentSet { .. }));
    }
}
