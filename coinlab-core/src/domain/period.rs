//! Holding period parsing ("6H", "1D", ...).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PeriodUnit {
    Hour,
    Day,
}

/// How long a selection stays active, and the phase grid for offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HoldPeriod {
    num: u32,
    unit: PeriodUnit,
}

impl HoldPeriod {
    pub fn hours(num: u32) -> Self {
        assert!(num >= 1, "hold period must be >= 1");
        Self {
            num,
            unit: PeriodUnit::Hour,
        }
    }

    pub fn days(num: u32) -> Self {
        assert!(num >= 1, "hold period must be >= 1");
        Self {
            num,
            unit: PeriodUnit::Day,
        }
    }

    /// Number of buckets in one period; also the number of possible offsets.
    pub fn period_num(&self) -> u32 {
        self.num
    }

    pub fn unit(&self) -> PeriodUnit {
        self.unit
    }

    pub fn is_day(&self) -> bool {
        self.unit == PeriodUnit::Day
    }

    /// Rolling window on the hourly grid.
    pub fn window_hours(&self) -> usize {
        match self.unit {
            PeriodUnit::Hour => self.num as usize,
            PeriodUnit::Day => self.num as usize * 24,
        }
    }

    /// Size of one offset step in seconds.
    pub fn offset_base_secs(&self) -> i64 {
        match self.unit {
            PeriodUnit::Hour => 3_600,
            PeriodUnit::Day => 86_400,
        }
    }
}

impl fmt::Display for HoldPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let suffix = match self.unit {
            PeriodUnit::Hour => 'H',
            PeriodUnit::Day => 'D',
        };
        write!(f, "{}{suffix}", self.num)
    }
}

impl FromStr for HoldPeriod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        let (digits, unit) = match upper.chars().last() {
            Some('H') => (&upper[..upper.len() - 1], PeriodUnit::Hour),
            Some('D') => (&upper[..upper.len() - 1], PeriodUnit::Day),
            _ => return Err(format!("hold period '{s}' must end with H or D")),
        };
        let num: u32 = digits
            .parse()
            .map_err(|_| format!("hold period '{s}' has no valid count"))?;
        if num == 0 {
            return Err(format!("hold period '{s}' must be at least 1"));
        }
        Ok(Self { num, unit })
    }
}

impl TryFrom<String> for HoldPeriod {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<HoldPeriod> for String {
    fn from(period: HoldPeriod) -> Self {
        period.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hour_and_day_periods() {
        let p: HoldPeriod = "6H".parse().unwrap();
        assert_eq!(p.period_num(), 6);
        assert!(!p.is_day());
        assert_eq!(p.window_hours(), 6);
        assert_eq!(p.offset_base_secs(), 3600);

        let d: HoldPeriod = "3d".parse().unwrap();
        assert!(d.is_day());
        assert_eq!(d.window_hours(), 72);
        assert_eq!(d.to_string(), "3D");
    }

    #[test]
    fn rejects_bad_periods() {
        assert!("6".parse::<HoldPeriod>().is_err());
        assert!("0H".parse::<HoldPeriod>().is_err());
        assert!("xH".parse::<HoldPeriod>().is_err());
        assert!("1W".parse::<HoldPeriod>().is_err());
    }
}
