//! Payment frequency.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Payment frequency for coupon-bearing legs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Frequency {
    /// One payment per year.
    Annual,
    /// Two payments per year.
    SemiAnnual,
    /// Four payments per year.
    Quarterly,
    /// Twelve payments per year.
    Monthly,
}

impl Frequency {
    /// Number of payments per year.
    #[must_use]
    pub fn periods_per_year(&self) -> u32 {
        match self {
            Self::Annual => 1,
            Self::SemiAnnual => 2,
            Self::Quarterly => 4,
            Self::Monthly => 12,
        }
    }

    /// Number of months between payments.
    #[must_use]
    pub fn months_per_period(&self) -> i32 {
        12 / self.periods_per_year() as i32
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Annual => "Annual",
            Self::SemiAnnual => "Semi-Annual",
            Self::Quarterly => "Quarterly",
            Self::Monthly => "Monthly",
        };
        write!(f, "{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_periods() {
        assert_eq!(Frequency::Annual.periods_per_year(), 1);
        assert_eq!(Frequency::Quarterly.months_per_period(), 3);
        assert_eq!(Frequency::SemiAnnual.months_per_period(), 6);
    }
}
