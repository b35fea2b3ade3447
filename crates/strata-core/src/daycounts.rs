//! Day count conventions.
//!
//! Day count conventions determine accrual fractions by specifying how to
//! count days between two dates and the year basis. The three conventions
//! here cover the instruments this workspace calibrates to; the full zoo of
//! ICMA/AFB variants belongs to a dedicated date library.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::Date;

/// A day count convention.
///
/// # Example
///
/// ```rust
/// use strata_core::{DayCount, Date};
///
/// let start = Date::from_ymd(2025, 1, 15).unwrap();
/// let end = Date::from_ymd(2025, 7, 15).unwrap();
/// let tau = DayCount::Act360.year_fraction(start, end);
/// assert!((tau - 181.0 / 360.0).abs() < 1e-12);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum DayCount {
    /// Actual/360 - money market convention.
    Act360,
    /// Actual/365 Fixed.
    #[default]
    Act365Fixed,
    /// 30/360 US bond basis.
    Thirty360US,
}

impl DayCount {
    /// Returns the day count between two dates under this convention.
    #[must_use]
    pub fn day_count(&self, start: Date, end: Date) -> i64 {
        match self {
            Self::Act360 | Self::Act365Fixed => start.days_between(&end),
            Self::Thirty360US => {
                let (y1, m1, mut d1) = (start.year(), start.month() as i64, start.day() as i64);
                let (y2, m2, mut d2) = (end.year(), end.month() as i64, end.day() as i64);

                if d1 == 31 {
                    d1 = 30;
                }
                if d2 == 31 && d1 == 30 {
                    d2 = 30;
                }

                360 * (y2 as i64 - y1 as i64) + 30 * (m2 - m1) + (d2 - d1)
            }
        }
    }

    /// Returns the year fraction between two dates under this convention.
    #[must_use]
    pub fn year_fraction(&self, start: Date, end: Date) -> f64 {
        let days = self.day_count(start, end) as f64;
        match self {
            Self::Act360 | Self::Thirty360US => days / 360.0,
            Self::Act365Fixed => days / 365.0,
        }
    }
}

impl fmt::Display for DayCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Act360 => "ACT/360",
            Self::Act365Fixed => "ACT/365F",
            Self::Thirty360US => "30/360 US",
        };
        write!(f, "{name}")
    }
}
