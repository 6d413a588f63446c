//! Validated identifiers for districts and financial years.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// District codes are four ASCII digits; the first two are the state code.
const REGION_CODE_LEN: usize = 4;

/// Financial years start in April.
const FINANCIAL_YEAR_START_MONTH: u32 = 4;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdError {
    #[error("Invalid region code '{0}': expected 4 digits")]
    InvalidRegion(String),

    #[error("Invalid financial year '{0}': expected YYYY-YY with consecutive years")]
    InvalidPeriod(String),
}

/// A district code such as `0901`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RegionId(String);

impl RegionId {
    pub fn parse(s: &str) -> Result<Self, IdError> {
        if s.len() == REGION_CODE_LEN && s.chars().all(|c| c.is_ascii_digit()) {
            Ok(Self(s.to_string()))
        } else {
            Err(IdError::InvalidRegion(s.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Two-digit state code the district belongs to.
    pub fn state_code(&self) -> &str {
        &self.0[..2]
    }
}

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RegionId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for RegionId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<RegionId> for String {
    fn from(id: RegionId) -> Self {
        id.0
    }
}

/// An April-to-March financial year, displayed as `2024-25`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PeriodId {
    start_year: i32,
}

impl PeriodId {
    pub fn new(start_year: i32) -> Result<Self, IdError> {
        if (1000..=9998).contains(&start_year) {
            Ok(Self { start_year })
        } else {
            Err(IdError::InvalidPeriod(start_year.to_string()))
        }
    }

    pub fn parse(s: &str) -> Result<Self, IdError> {
        let invalid = || IdError::InvalidPeriod(s.to_string());

        let (start, end) = s.split_once('-').ok_or_else(invalid)?;
        if start.len() != 4 || end.len() != 2 {
            return Err(invalid());
        }
        if !start.chars().chain(end.chars()).all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }

        let start_year: i32 = start.parse().map_err(|_| invalid())?;
        let end_suffix: i32 = end.parse().map_err(|_| invalid())?;
        if (start_year + 1) % 100 != end_suffix {
            return Err(invalid());
        }
        Self::new(start_year).map_err(|_| invalid())
    }

    /// The financial year containing `date`.
    pub fn containing(date: NaiveDate) -> Self {
        let start_year = if date.month() >= FINANCIAL_YEAR_START_MONTH {
            date.year()
        } else {
            date.year() - 1
        };
        Self { start_year }
    }

    /// The financial year containing today's local date.
    pub fn current() -> Self {
        Self::containing(chrono::Local::now().date_naive())
    }

    pub fn previous(&self) -> Self {
        Self {
            start_year: self.start_year - 1,
        }
    }

    pub fn start_year(&self) -> i32 {
        self.start_year
    }
}

impl fmt::Display for PeriodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:02}", self.start_year, (self.start_year + 1) % 100)
    }
}

impl FromStr for PeriodId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for PeriodId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PeriodId> for String {
    fn from(id: PeriodId) -> Self {
        id.to_string()
    }
}

/// The `(region, period)` pair every tier is keyed by.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordKey {
    pub region: RegionId,
    pub period: PeriodId,
}

impl RecordKey {
    pub fn new(region: RegionId, period: PeriodId) -> Self {
        Self { region, period }
    }

    /// Key shared by both cache layers.
    pub fn cache_key(&self) -> String {
        format!("district_data_{}_{}", self.region, self.period)
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.region, self.period)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_id_parse() {
        assert!(RegionId::parse("0901").is_ok());
        assert!(RegionId::parse("1234").is_ok());

        assert!(RegionId::parse("").is_err());
        assert!(RegionId::parse("901").is_err()); // too short
        assert!(RegionId::parse("09011").is_err()); // too long
        assert!(RegionId::parse("09a1").is_err()); // non-digit
    }

    #[test]
    fn test_region_state_code() {
        let id = RegionId::parse("0950").unwrap();
        assert_eq!(id.state_code(), "09");
    }

    #[test]
    fn test_period_id_parse_and_display() {
        let fy = PeriodId::parse("2024-25").unwrap();
        assert_eq!(fy.start_year(), 2024);
        assert_eq!(fy.to_string(), "2024-25");

        // Century rollover
        let fy = PeriodId::parse("1999-00").unwrap();
        assert_eq!(fy.to_string(), "1999-00");
    }

    #[test]
    fn test_period_id_rejects_malformed() {
        assert!(PeriodId::parse("2024").is_err());
        assert!(PeriodId::parse("2024-2025").is_err());
        assert!(PeriodId::parse("2024-26").is_err()); // not consecutive
        assert!(PeriodId::parse("20x4-25").is_err());
        assert!(PeriodId::parse("2024/25").is_err());
    }

    #[test]
    fn test_period_containing_date() {
        let april = NaiveDate::from_ymd_opt(2024, 4, 1).unwrap();
        assert_eq!(PeriodId::containing(april).to_string(), "2024-25");

        let march = NaiveDate::from_ymd_opt(2025, 3, 31).unwrap();
        assert_eq!(PeriodId::containing(march).to_string(), "2024-25");

        let january = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        assert_eq!(PeriodId::containing(january).to_string(), "2023-24");
    }

    #[test]
    fn test_period_previous() {
        let fy = PeriodId::parse("2024-25").unwrap();
        assert_eq!(fy.previous().to_string(), "2023-24");
    }

    #[test]
    fn test_ids_serde_as_strings() {
        let key = (RegionId::parse("0901").unwrap(), PeriodId::parse("2024-25").unwrap());
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, r#"["0901","2024-25"]"#);

        let back: (RegionId, PeriodId) = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key);

        assert!(serde_json::from_str::<RegionId>(r#""abc""#).is_err());
    }

    #[test]
    fn test_cache_key_format() {
        let key = RecordKey::new(
            RegionId::parse("0901").unwrap(),
            PeriodId::parse("2024-25").unwrap(),
        );
        assert_eq!(key.cache_key(), "district_data_0901_2024-25");
        assert_eq!(key.to_string(), "0901/2024-25");
    }
}
