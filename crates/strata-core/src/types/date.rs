//! Date type for financial calculations.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CoreError, CoreResult};

/// A calendar date for financial calculations.
///
/// This is a newtype wrapper around `chrono::NaiveDate` providing the
/// operations curve construction needs and ensuring type safety.
///
/// # Example
///
/// ```rust
/// use strata_core::Date;
///
/// let date = Date::from_ymd(2025, 6, 15).unwrap();
/// let future = date.add_months(6).unwrap();
/// assert_eq!(future.year(), 2025);
/// assert_eq!(future.month(), 12);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Date(NaiveDate);

impl Date {
    /// Creates a new date from year, month, and day.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidDate` if the date is invalid.
    pub fn from_ymd(year: i32, month: u32, day: u32) -> CoreResult<Self> {
        NaiveDate::from_ymd_opt(year, month, day)
            .map(Date)
            .ok_or_else(|| CoreError::invalid_date(format!("{year}-{month:02}-{day:02}")))
    }

    /// Creates a date from an ISO 8601 string (YYYY-MM-DD).
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidDate` if the string is not a valid date.
    pub fn parse(s: &str) -> CoreResult<Self> {
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(Date)
            .map_err(|_| CoreError::invalid_date(format!("Cannot parse: {s}")))
    }

    /// Returns the year component.
    #[must_use]
    pub fn year(&self) -> i32 {
        self.0.year()
    }

    /// Returns the month component (1-12).
    #[must_use]
    pub fn month(&self) -> u32 {
        self.0.month()
    }

    /// Returns the day component (1-31).
    #[must_use]
    pub fn day(&self) -> u32 {
        self.0.day()
    }

    /// Checks if the year is a leap year.
    #[must_use]
    pub fn is_leap_year(&self) -> bool {
        self.0.leap_year()
    }

    /// Adds a number of days to the date.
    #[must_use]
    pub fn add_days(&self, days: i64) -> Self {
        Date(self.0 + chrono::Duration::days(days))
    }

    /// Adds a number of months to the date.
    ///
    /// If the resulting day would be invalid (e.g., Jan 31 + 1 month),
    /// it rolls back to the last valid day of the month.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidDate` if the result is out of range.
    pub fn add_months(&self, months: i32) -> CoreResult<Self> {
        let total_months = self.year() * 12 + self.month() as i32 - 1 + months;
        let new_year = total_months.div_euclid(12);
        let new_month = (total_months.rem_euclid(12) + 1) as u32;

        // Clamp day to valid range for new month
        let max_day = days_in_month(new_year, new_month);
        let new_day = self.day().min(max_day);

        Self::from_ymd(new_year, new_month, new_day)
    }

    /// Adds a number of years to the date.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidDate` if the result is invalid.
    pub fn add_years(&self, years: i32) -> CoreResult<Self> {
        let new_year = self.year() + years;
        let max_day = days_in_month(new_year, self.month());
        let new_day = self.day().min(max_day);

        Self::from_ymd(new_year, self.month(), new_day)
    }

    /// Calculates the number of calendar days from `self` to `other`.
    ///
    /// Positive when `other` is after `self`.
    #[must_use]
    pub fn days_between(&self, other: &Date) -> i64 {
        (other.0 - self.0).num_days()
    }

    /// Returns the underlying `NaiveDate`.
    #[must_use]
    pub fn as_naive_date(&self) -> NaiveDate {
        self.0
    }
}

impl fmt::Display for Date {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

/// Returns the number of days in the given month.
fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 => {
            if NaiveDate::from_ymd_opt(year, 2, 29).is_some() {
                29
            } else {
                28
            }
        }
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_ymd_valid() {
        let d = Date::from_ymd(2025, 6, 15).unwrap();
        assert_eq!(d.year(), 2025);
        assert_eq!(d.month(), 6);
        assert_eq!(d.day(), 15);
    }

    #[test]
    fn test_from_ymd_invalid() {
        assert!(Date::from_ymd(2025, 2, 30).is_err());
        assert!(Date::from_ymd(2025, 13, 1).is_err());
    }

    #[test]
    fn test_parse() {
        let d = Date::parse("2025-01-31").unwrap();
        assert_eq!(d.day(), 31);
        assert!(Date::parse("31/01/2025").is_err());
    }

    #[test]
    fn test_add_months_clamps_day() {
        let d = Date::from_ymd(2025, 1, 31).unwrap();
        let e = d.add_months(1).unwrap();
        assert_eq!((e.year(), e.month(), e.day()), (2025, 2, 28));
    }

    #[test]
    fn test_add_months_negative() {
        let d = Date::from_ymd(2025, 1, 15).unwrap();
        let e = d.add_months(-2).unwrap();
        assert_eq!((e.year(), e.month(), e.day()), (2024, 11, 15));
    }

    #[test]
    fn test_days_between() {
        let a = Date::from_ymd(2025, 1, 1).unwrap();
        let b = Date::from_ymd(2025, 12, 31).unwrap();
        assert_eq!(a.days_between(&b), 364);
        assert_eq!(b.days_between(&a), -364);
    }

    #[test]
    fn test_ordering() {
        let a = Date::from_ymd(2025, 1, 1).unwrap();
        let b = Date::from_ymd(2025, 1, 2).unwrap();
        assert!(a < b);
    }

    #[test]
    fn test_serde_roundtrip() {
        let d = Date::from_ymd(2025, 6, 15).unwrap();
        let json = serde_json::to_string(&d).unwrap();
        assert_eq!(json, "\"2025-06-15\"");
        let back: Date = serde_json::from_str(&json).unwrap();
        assert_eq!(back, d);
    }
}
