//! Plan and scoring periods.
//!
//! Labels accepted: "2025", "2025-H2" / "H2-2025", "Q4-2025" / "2025-Q4",
//! "December-2025" / "Dec-2025" / "2025-12".

use crate::error::{PmsError, PmsResult};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

const MONTH_NAMES: [&str; 12] = [
    "January", "February", "March", "April", "May", "June",
    "July", "August", "September", "October", "November", "December",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "period_type", rename_all = "snake_case")]
pub enum Period {
    Annual { year: i32 },
    HalfYearly { year: i32, half: u8 },
    Quarterly { year: i32, quarter: u8 },
    Monthly { year: i32, month: u8 },
}

/// Divisors used to break a period target into time buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketDivisors {
    pub months: u32,
    pub weeks: u32,
    pub days: u32,
}

impl Period {
    pub fn parse(raw: &str) -> PmsResult<Self> {
        Self::try_parse(raw.trim())
            .ok_or_else(|| PmsError::validation(format!("unrecognized period label '{raw}'")))
    }

    fn try_parse(label: &str) -> Option<Self> {
        if let Ok(year) = label.parse::<i32>() {
            return valid_year(year).then_some(Self::Annual { year });
        }
        let (left, right) = label.split_once('-')?;
        let (left_up, right_up) = (left.to_ascii_uppercase(), right.to_ascii_uppercase());

        // Put the year on the right-hand side.
        let (tag, year) = match (left.parse::<i32>(), right.parse::<i32>()) {
            (Ok(year), Ok(_)) => {
                let month = right.parse::<u8>().ok()?;
                return (valid_year(year) && (1..=12).contains(&month))
                    .then_some(Self::Monthly { year, month });
            }
            (Ok(year), Err(_)) => (right_up, year),
            (Err(_), Ok(year)) => (left_up, year),
            (Err(_), Err(_)) => return None,
        };
        if !valid_year(year) {
            return None;
        }

        if let Some(n) = tag.strip_prefix('H').and_then(|n| n.parse::<u8>().ok()) {
            return (1..=2).contains(&n).then_some(Self::HalfYearly { year, half: n });
        }
        if let Some(n) = tag.strip_prefix('Q').and_then(|n| n.parse::<u8>().ok()) {
            return (1..=4).contains(&n).then_some(Self::Quarterly { year, quarter: n });
        }
        MONTH_NAMES
            .iter()
            .position(|name| {
                let name = name.to_ascii_uppercase();
                tag == name || (tag.len() == 3 && name.starts_with(&tag))
            })
            .map(|idx| Self::Monthly {
                year,
                month: idx as u8 + 1,
            })
    }

    /// Canonical label, the form plans are stored under.
    pub fn label(&self) -> String {
        match *self {
            Self::Annual { year } => format!("{year}"),
            Self::HalfYearly { year, half } => format!("{year}-H{half}"),
            Self::Quarterly { year, quarter } => format!("Q{quarter}-{year}"),
            Self::Monthly { year, month } => {
                format!("{}-{year}", MONTH_NAMES[usize::from(month) - 1])
            }
        }
    }

    pub fn period_type(&self) -> &'static str {
        match self {
            Self::Annual { .. } => "annual",
            Self::HalfYearly { .. } => "half_yearly",
            Self::Quarterly { .. } => "quarterly",
            Self::Monthly { .. } => "monthly",
        }
    }

    pub fn year(&self) -> i32 {
        match *self {
            Self::Annual { year }
            | Self::HalfYearly { year, .. }
            | Self::Quarterly { year, .. }
            | Self::Monthly { year, .. } => year,
        }
    }

    /// (half, quarter, month) columns; zero where not applicable.
    pub fn components(&self) -> (u8, u8, u8) {
        match *self {
            Self::Annual { .. } => (0, 0, 0),
            Self::HalfYearly { half, .. } => (half, 0, 0),
            Self::Quarterly { quarter, .. } => (0, quarter, 0),
            Self::Monthly { month, .. } => (0, 0, month),
        }
    }

    pub fn from_components(period_type: &str, year: i32, half: u8, quarter: u8, month: u8) -> PmsResult<Self> {
        let period = match period_type {
            "annual" => Self::Annual { year },
            "half_yearly" => Self::HalfYearly { year, half },
            "quarterly" => Self::Quarterly { year, quarter },
            "monthly" => Self::Monthly { year, month },
            other => return Err(PmsError::validation(format!("unknown period type '{other}'"))),
        };
        Ok(period)
    }

    /// First and last calendar month covered, inclusive.
    pub fn month_range(&self) -> (u32, u32) {
        match *self {
            Self::Annual { .. } => (1, 12),
            Self::HalfYearly { half, .. } => {
                let first = (u32::from(half) - 1) * 6 + 1;
                (first, first + 5)
            }
            Self::Quarterly { quarter, .. } => {
                let first = (u32::from(quarter) - 1) * 3 + 1;
                (first, first + 2)
            }
            Self::Monthly { month, .. } => (u32::from(month), u32::from(month)),
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        let (first, last) = self.month_range();
        date.year() == self.year() && (first..=last).contains(&date.month())
    }

    pub fn divisors(&self) -> BucketDivisors {
        match self {
            Self::HalfYearly { .. } => BucketDivisors { months: 6, weeks: 26, days: 183 },
            Self::Quarterly { .. } => BucketDivisors { months: 3, weeks: 13, days: 92 },
            Self::Monthly { .. } => BucketDivisors { months: 1, weeks: 4, days: 31 },
            Self::Annual { .. } => BucketDivisors { months: 12, weeks: 52, days: 365 },
        }
    }
}

impl std::fmt::Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.label())
    }
}

fn valid_year(year: i32) -> bool {
    (2000..=2100).contains(&year)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_the_plan_label_vocabulary() {
        assert_eq!(Period::parse("2025-H2").unwrap(), Period::HalfYearly { year: 2025, half: 2 });
        assert_eq!(Period::parse("H1-2026").unwrap(), Period::HalfYearly { year: 2026, half: 1 });
        assert_eq!(Period::parse("Q4-2025").unwrap(), Period::Quarterly { year: 2025, quarter: 4 });
        assert_eq!(Period::parse("2025-q1").unwrap(), Period::Quarterly { year: 2025, quarter: 1 });
        assert_eq!(Period::parse("December-2025").unwrap(), Period::Monthly { year: 2025, month: 12 });
        assert_eq!(Period::parse("Dec-2025").unwrap(), Period::Monthly { year: 2025, month: 12 });
        assert_eq!(Period::parse("2025-07").unwrap(), Period::Monthly { year: 2025, month: 7 });
        assert_eq!(Period::parse("2025").unwrap(), Period::Annual { year: 2025 });
    }

    #[test]
    fn rejects_garbage() {
        assert!(Period::parse("Q5-2025").is_err());
        assert!(Period::parse("H3-2025").is_err());
        assert!(Period::parse("Smarch-2025").is_err());
        assert!(Period::parse("2025-13").is_err());
        assert!(Period::parse("").is_err());
    }

    #[test]
    fn canonical_labels() {
        assert_eq!(Period::parse("dec-2025").unwrap().label(), "December-2025");
        assert_eq!(Period::parse("H2-2025").unwrap().label(), "2025-H2");
        assert_eq!(Period::parse("2025-Q4").unwrap().label(), "Q4-2025");
    }

    #[test]
    fn divisor_table() {
        let half = Period::parse("2025-H2").unwrap().divisors();
        assert_eq!((half.months, half.weeks, half.days), (6, 26, 183));
        let month = Period::parse("December-2025").unwrap().divisors();
        assert_eq!((month.months, month.weeks, month.days), (1, 4, 31));
    }

    #[test]
    fn contains_checks_calendar_months() {
        let h2 = Period::parse("2025-H2").unwrap();
        assert!(h2.contains(NaiveDate::from_ymd_opt(2025, 7, 1).unwrap()));
        assert!(h2.contains(NaiveDate::from_ymd_opt(2025, 12, 31).unwrap()));
        assert!(!h2.contains(NaiveDate::from_ymd_opt(2025, 6, 30).unwrap()));
        assert!(!h2.contains(NaiveDate::from_ymd_opt(2024, 8, 1).unwrap()));
        assert_eq!(Period::parse("Q3-2025").unwrap().month_range(), (7, 9));
    }

    #[test]
    fn components_round_trip() {
        let p = Period::parse("Q4-2025").unwrap();
        let (h, q, m) = p.components();
        assert_eq!(Period::from_components(p.period_type(), p.year(), h, q, m).unwrap(), p);
    }
}
