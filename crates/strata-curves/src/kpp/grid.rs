//! Sparse instrument grid for multi-tenor knot placement.

use std::collections::BTreeMap;

use strata_core::Date;

use crate::curve_type::CurveType;

/// A sparse 2-D grid keyed by `(curve type, maturity date)`, each cell
/// holding the indices of the instruments contributing to that knot.
///
/// One cell corresponds to one prospective knot point; the association count
/// (total instrument entries across cells) is what the grid-reduction
/// heuristic bounds by the input instrument count.
#[derive(Debug, Clone, Default)]
pub struct SparseInstrumentGrid {
    cells: BTreeMap<CurveType, BTreeMap<Date, Vec<usize>>>,
}

impl SparseInstrumentGrid {
    /// Creates an empty grid.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an instrument's contribution to a cell.
    pub fn add(&mut self, curve_type: CurveType, maturity: Date, instrument: usize) {
        self.cells
            .entry(curve_type)
            .or_default()
            .entry(maturity)
            .or_default()
            .push(instrument);
    }

    /// Number of cells (prospective knots).
    #[must_use]
    pub fn knot_count(&self) -> usize {
        self.cells.values().map(BTreeMap::len).sum()
    }

    /// Total knot-to-instrument associations.
    #[must_use]
    pub fn association_count(&self) -> usize {
        self.cells
            .values()
            .flat_map(BTreeMap::values)
            .map(Vec::len)
            .sum()
    }

    /// The cells of one curve type, ordered by maturity.
    #[must_use]
    pub fn row(&self, curve_type: CurveType) -> Option<&BTreeMap<Date, Vec<usize>>> {
        self.cells.get(&curve_type)
    }

    /// Curve types present, ascending.
    pub fn curve_types(&self) -> impl Iterator<Item = CurveType> + '_ {
        self.cells.keys().copied()
    }

    /// Removes one cell, dropping its curve row when it empties.
    pub fn remove_cell(&mut self, curve_type: CurveType, maturity: Date) {
        if let Some(row) = self.cells.get_mut(&curve_type) {
            row.remove(&maturity);
            if row.is_empty() {
                self.cells.remove(&curve_type);
            }
        }
    }

    /// The most populated curve row outside the excluded set: the eviction
    /// heuristic's first choice.
    #[must_use]
    pub fn most_populated_excluding(&self, excluded: &[CurveType]) -> Option<CurveType> {
        self.cells
            .iter()
            .filter(|(ct, _)| !excluded.contains(ct))
            .max_by_key(|(_, row)| row.values().map(Vec::len).sum::<usize>())
            .map(|(ct, _)| *ct)
    }

    /// The interior maturity (neither first nor last) of a row with the
    /// fewest contributing instruments; endpoints are never evicted.
    #[must_use]
    pub fn weakest_interior_cell(&self, curve_type: CurveType) -> Option<Date> {
        let row = self.cells.get(&curve_type)?;
        if row.len() < 3 {
            return None;
        }
        row.iter()
            .skip(1)
            .take(row.len() - 2)
            .min_by_key(|(_, instruments)| instruments.len())
            .map(|(date, _)| *date)
    }
}
