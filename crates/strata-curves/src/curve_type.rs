//! Curve type registry.
//!
//! A [`CurveType`] identifies the role a curve plays inside a model: the
//! discounting curve, a rate-index tenor curve, the "all tenors" wildcard
//! used by gradient break-out filters, or the null tag. The set is fixed at
//! compile time and totally ordered:
//!
//! `Null < AllTenors < Discount < ON < 1W < 2W < 1M < ... < 11M < 1Y`
//!
//! Tenor lookups by year fraction run against a process-wide midpoint-bucket
//! table built lazily on first use; the table is immutable afterwards and
//! safe to share across concurrent curve builds.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CurveError, CurveResult};

/// Identifies a curve role within a model.
///
/// The derived `Ord` follows declaration order, which encodes the registry's
/// total order (tenors ascend by year fraction).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum CurveType {
    /// No curve.
    Null,
    /// Wildcard matching every tenor curve; used by gradient filters.
    AllTenors,
    /// The discounting curve.
    Discount,
    /// Overnight.
    On,
    /// One week.
    W1,
    /// Two weeks.
    W2,
    /// One month.
    M1,
    /// Two months.
    M2,
    /// Three months.
    M3,
    /// Four months.
    M4,
    /// Five months.
    M5,
    /// Six months.
    M6,
    /// Seven months.
    M7,
    /// Eight months.
    M8,
    /// Nine months.
    M9,
    /// Ten months.
    M10,
    /// Eleven months.
    M11,
    /// One year.
    Y1,
}

/// All tenor curve types in ascending year-fraction order.
static TENORS: [CurveType; 15] = [
    CurveType::On,
    CurveType::W1,
    CurveType::W2,
    CurveType::M1,
    CurveType::M2,
    CurveType::M3,
    CurveType::M4,
    CurveType::M5,
    CurveType::M6,
    CurveType::M7,
    CurveType::M8,
    CurveType::M9,
    CurveType::M10,
    CurveType::M11,
    CurveType::Y1,
];

/// Upper midpoint of each tenor's year-fraction bucket.
///
/// Bucket `k` covers `(midpoint[k-1], midpoint[k]]`; anything above the last
/// midpoint right-extrapolates to the longest tenor.
static BUCKET_MIDPOINTS: Lazy<Vec<f64>> = Lazy::new(|| {
    let tenors = CurveType::tenors();
    let mut midpoints = Vec::with_capacity(tenors.len() - 1);
    for pair in tenors.windows(2) {
        let lo = pair[0].year_fraction().expect("tenor has year fraction");
        let hi = pair[1].year_fraction().expect("tenor has year fraction");
        midpoints.push(0.5 * (lo + hi));
    }
    midpoints
});

impl CurveType {
    /// Returns all tenor curve types in ascending order.
    #[must_use]
    pub fn tenors() -> &'static [CurveType] {
        &TENORS
    }

    /// Returns whether this tag is a rate-index tenor.
    #[must_use]
    pub fn is_tenor(&self) -> bool {
        matches!(
            self,
            Self::On
                | Self::W1
                | Self::W2
                | Self::M1
                | Self::M2
                | Self::M3
                | Self::M4
                | Self::M5
                | Self::M6
                | Self::M7
                | Self::M8
                | Self::M9
                | Self::M10
                | Self::M11
                | Self::Y1
        )
    }

    /// Returns the tenor's year fraction.
    ///
    /// `Discount` answers with a zero sentinel (it sorts below every tenor);
    /// `Null` and `AllTenors` have no year-fraction semantics.
    ///
    /// # Errors
    ///
    /// Returns `CurveError::InvalidCurveType` for `Null` and `AllTenors`.
    pub fn year_fraction(&self) -> CurveResult<f64> {
        match self {
            Self::Null | Self::AllTenors => {
                Err(CurveError::invalid_curve_type(*self, "year_fraction"))
            }
            Self::Discount => Ok(0.0),
            Self::On => Ok(1.0 / 365.0),
            Self::W1 => Ok(7.0 / 365.0),
            Self::W2 => Ok(14.0 / 365.0),
            Self::M1 => Ok(1.0 / 12.0),
            Self::M2 => Ok(2.0 / 12.0),
            Self::M3 => Ok(3.0 / 12.0),
            Self::M4 => Ok(4.0 / 12.0),
            Self::M5 => Ok(5.0 / 12.0),
            Self::M6 => Ok(6.0 / 12.0),
            Self::M7 => Ok(7.0 / 12.0),
            Self::M8 => Ok(8.0 / 12.0),
            Self::M9 => Ok(9.0 / 12.0),
            Self::M10 => Ok(10.0 / 12.0),
            Self::M11 => Ok(11.0 / 12.0),
            Self::Y1 => Ok(1.0),
        }
    }

    /// Returns the registry description for this tag.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Null => "Null",
            Self::AllTenors => "AllTenors",
            Self::Discount => "Discount",
            Self::On => "ON",
            Self::W1 => "1W",
            Self::W2 => "2W",
            Self::M1 => "1M",
            Self::M2 => "2M",
            Self::M3 => "3M",
            Self::M4 => "4M",
            Self::M5 => "5M",
            Self::M6 => "6M",
            Self::M7 => "7M",
            Self::M8 => "8M",
            Self::M9 => "9M",
            Self::M10 => "10M",
            Self::M11 => "11M",
            Self::Y1 => "1Y",
        }
    }

    /// Resolves a description to a curve type.
    ///
    /// Matching is case- and whitespace-insensitive. `"1D"` is accepted as
    /// overnight and `"12M"` as one year.
    ///
    /// # Errors
    ///
    /// Returns `CurveError::UnknownCurveType` if the text does not resolve.
    pub fn from_description(text: &str) -> CurveResult<Self> {
        let normalized: String = text
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_uppercase();

        match normalized.as_str() {
            "1D" => return Ok(Self::On),
            "12M" => return Ok(Self::Y1),
            _ => {}
        }

        let all = [
            Self::Null,
            Self::AllTenors,
            Self::Discount,
            Self::On,
            Self::W1,
            Self::W2,
            Self::M1,
            Self::M2,
            Self::M3,
            Self::M4,
            Self::M5,
            Self::M6,
            Self::M7,
            Self::M8,
            Self::M9,
            Self::M10,
            Self::M11,
            Self::Y1,
        ];
        all.iter()
            .find(|ct| ct.description().to_uppercase() == normalized)
            .copied()
            .ok_or_else(|| CurveError::unknown_curve_type(text))
    }

    /// Returns the tenor whose midpoint bucket contains the year fraction.
    ///
    /// Total over finite non-negative inputs; values beyond the last bucket
    /// right-extrapolate to the longest tenor, negatives clamp to overnight.
    #[must_use]
    pub fn from_year_fraction(year_fraction: f64) -> Self {
        let midpoints = &*BUCKET_MIDPOINTS;
        let idx = midpoints.partition_point(|&m| m < year_fraction);
        Self::tenors()[idx.min(Self::tenors().len() - 1)]
    }
}

impl fmt::Display for CurveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    #[test]
    fn test_total_order() {
        assert!(CurveType::Null < CurveType::AllTenors);
        assert!(CurveType::AllTenors < CurveType::Discount);
        assert!(CurveType::Discount < CurveType::On);
        assert!(CurveType::On < CurveType::W1);
        assert!(CurveType::W1 < CurveType::M1);
        assert!(CurveType::M1 < CurveType::M11);
        assert!(CurveType::M11 < CurveType::Y1);
    }

    #[test]
    fn test_tenors_ascend_by_year_fraction() {
        let tenors = CurveType::tenors();
        for pair in tenors.windows(2) {
            assert!(pair[0].year_fraction().unwrap() < pair[1].year_fraction().unwrap());
            assert!(pair[0] < pair[1]);
        }
    }

    #[test]
    fn test_year_fraction_fails_for_null_and_all_tenors() {
        assert!(CurveType::Null.year_fraction().is_err());
        assert!(CurveType::AllTenors.year_fraction().is_err());
        assert_relative_eq!(CurveType::Discount.year_fraction().unwrap(), 0.0);
        assert_relative_eq!(CurveType::M6.year_fraction().unwrap(), 0.5);
    }

    #[test]
    fn test_from_description() {
        assert_eq!(CurveType::from_description("3M").unwrap(), CurveType::M3);
        assert_eq!(CurveType::from_description(" 3 m ").unwrap(), CurveType::M3);
        assert_eq!(CurveType::from_description("1D").unwrap(), CurveType::On);
        assert_eq!(CurveType::from_description("12M").unwrap(), CurveType::Y1);
        assert_eq!(
            CurveType::from_description("discount").unwrap(),
            CurveType::Discount
        );
        assert!(matches!(
            CurveType::from_description("13Q"),
            Err(CurveError::UnknownCurveType { .. })
        ));
    }

    #[test]
    fn test_from_year_fraction_exact_tenors() {
        for tenor in CurveType::tenors() {
            let yf = tenor.year_fraction().unwrap();
            assert_eq!(CurveType::from_year_fraction(yf), *tenor);
        }
    }

    #[test]
    fn test_from_year_fraction_extrapolates_right() {
        assert_eq!(CurveType::from_year_fraction(1000.0), CurveType::Y1);
    }

    #[test]
    fn test_from_year_fraction_clamps_left() {
        assert_eq!(CurveType::from_year_fraction(0.0), CurveType::On);
        assert_eq!(CurveType::from_year_fraction(-1.0), CurveType::On);
    }

    #[test]
    fn test_serde_round_trip() {
        let json = serde_json::to_string(&CurveType::M6).unwrap();
        let back: CurveType = serde_json::from_str(&json).unwrap();
        assert_eq!(back, CurveType::M6);
    }

    proptest! {
        #[test]
        fn prop_from_year_fraction_total_and_monotone(
            a in 0.0f64..5.0,
            b in 0.0f64..5.0,
        ) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            let t_lo = CurveType::from_year_fraction(lo);
            let t_hi = CurveType::from_year_fraction(hi);
            prop_assert!(t_lo.is_tenor());
            prop_assert!(t_hi.is_tenor());
            prop_assert!(t_lo <= t_hi);
        }
    }
}
