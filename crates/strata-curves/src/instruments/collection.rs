//! Ordered calibration instrument collection.

use std::sync::Arc;

use crate::clone_lookup::CloneLookup;
use crate::curve_type::CurveType;
use crate::error::CurveResult;
use crate::model::CurveModel;

use super::{CalibrationInstrument, InstrumentId, InstrumentKind};

/// An ordered, index-addressable collection of instrument handles.
///
/// Knot placement filters the collection by removal before calibration;
/// after that the order is frozen: each instrument's position determines
/// its row in the solver's residual vector and Jacobian.
#[derive(Debug, Clone, Default)]
pub struct CalibrationInstruments {
    items: Vec<Arc<dyn CalibrationInstrument>>,
}

impl CalibrationInstruments {
    /// Creates an empty collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a collection from handles.
    #[must_use]
    pub fn from_vec(items: Vec<Arc<dyn CalibrationInstrument>>) -> Self {
        Self { items }
    }

    /// Appends an instrument, returning its id.
    pub fn push(&mut self, instrument: Arc<dyn CalibrationInstrument>) -> InstrumentId {
        self.items.push(instrument);
        InstrumentId(self.items.len() - 1)
    }

    /// Builder-style append.
    #[must_use]
    pub fn with(mut self, instrument: Arc<dyn CalibrationInstrument>) -> Self {
        self.items.push(instrument);
        self
    }

    /// Number of instruments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the collection is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns the instrument at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Arc<dyn CalibrationInstrument>> {
        self.items.get(index)
    }

    /// Iterates over the instruments in order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn CalibrationInstrument>> {
        self.items.iter()
    }

    /// Keeps only instruments matching the predicate (order preserved).
    pub fn retain(&mut self, mut keep: impl FnMut(&Arc<dyn CalibrationInstrument>) -> bool) {
        self.items.retain(|item| keep(item));
    }

    /// Indices of instruments of the given kind, in order.
    #[must_use]
    pub fn indices_of_kind(&self, kind: InstrumentKind) -> Vec<usize> {
        self.items
            .iter()
            .enumerate()
            .filter(|(_, item)| item.kind() == kind)
            .map(|(index, _)| index)
            .collect()
    }

    /// Instruments of the given kind, in order.
    #[must_use]
    pub fn of_kind(&self, kind: InstrumentKind) -> Vec<Arc<dyn CalibrationInstrument>> {
        self.items
            .iter()
            .filter(|item| item.kind() == kind)
            .map(Arc::clone)
            .collect()
    }

    /// Whether any instrument of the given kind is present.
    #[must_use]
    pub fn contains_kind(&self, kind: InstrumentKind) -> bool {
        self.items.iter().any(|item| item.kind() == kind)
    }

    /// Residual vector against a model, in collection order.
    pub fn residuals(&self, model: &dyn CurveModel) -> CurveResult<Vec<f64>> {
        self.items.iter().map(|item| item.residual(model)).collect()
    }

    /// Accumulates the Jacobian row of instrument `index`.
    pub fn accumulate_gradient_row(
        &self,
        index: usize,
        model: &dyn CurveModel,
        multiplier: f64,
        gradient: &mut [f64],
        filter: Option<CurveType>,
    ) -> CurveResult<()> {
        self.items[index].accumulate_gradient(model, multiplier, gradient, filter)
    }

    /// Deep-copies the collection, preserving component sharing between
    /// instruments through the lookup.
    pub fn clone_with_lookup(&self, lookup: &mut CloneLookup) -> CurveResult<Self> {
        let mut items = Vec::with_capacity(self.items.len());
        for item in &self.items {
            items.push(lookup.get_instrument(item)?);
        }
        Ok(Self { items })
    }
}

impl FromIterator<Arc<dyn CalibrationInstrument>> for CalibrationInstruments {
    fn from_iter<I: IntoIterator<Item = Arc<dyn CalibrationInstrument>>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruments::Deposit;
    use strata_core::{Date, DayCount};

    fn reference() -> Date {
        Date::from_ymd(2025, 6, 16).unwrap()
    }

    fn deposit(tenor: CurveType, rate: f64) -> Arc<dyn CalibrationInstrument> {
        Arc::new(Deposit::spot(reference(), tenor, rate, DayCount::Act360).unwrap())
    }

    #[test]
    fn test_push_and_kind_queries() {
        let mut instruments = CalibrationInstruments::new();
        let id = instruments.push(deposit(CurveType::M1, 0.01));
        assert_eq!(id, InstrumentId(0));
        instruments.push(deposit(CurveType::M3, 0.012));

        assert_eq!(instruments.len(), 2);
        assert!(instruments.contains_kind(InstrumentKind::Deposit));
        assert!(!instruments.contains_kind(InstrumentKind::Swap));
        assert_eq!(instruments.indices_of_kind(InstrumentKind::Deposit), vec![0, 1]);
    }

    #[test]
    fn test_retain_preserves_order() {
        let mut instruments = CalibrationInstruments::new()
            .with(deposit(CurveType::M1, 0.01))
            .with(deposit(CurveType::M3, 0.012))
            .with(deposit(CurveType::M6, 0.014));

        instruments.retain(|item| item.index_tenor() != Some(CurveType::M3));
        assert_eq!(instruments.len(), 2);
        assert_eq!(
            instruments.get(0).unwrap().index_tenor(),
            Some(CurveType::M1)
        );
        assert_eq!(
            instruments.get(1).unwrap().index_tenor(),
            Some(CurveType::M6)
        );
    }

    #[test]
    fn test_clone_with_lookup_preserves_length() {
        let instruments = CalibrationInstruments::new()
            .with(deposit(CurveType::M1, 0.01))
            .with(deposit(CurveType::M3, 0.012));
        let mut lookup = CloneLookup::new();
        let cloned = instruments.clone_with_lookup(&mut lookup).unwrap();
        assert_eq!(cloned.len(), 2);
        // Clones are distinct objects.
        assert!(!Arc::ptr_eq(instruments.get(0).unwrap(), cloned.get(0).unwrap()));
    }
}
