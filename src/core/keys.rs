//! Calendar identifiers used for storage and lookup.
//!
//! `MonthKey` (`YYYY-MM`) names a monthly state file; `DateKey` (`YYYY-MM-DD`)
//! names one day's entry inside it. Both parse strictly and render back to the
//! same text, so they can serve as JSON map keys.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;
use time::{Date, Month};

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid {kind} key: {input}")]
pub struct KeyParseError {
    pub kind: &'static str,
    pub input: String,
}

fn key_error(kind: &'static str, input: &str) -> KeyParseError {
    KeyParseError {
        kind,
        input: input.to_string(),
    }
}

/// `YYYY-MM` identifier of a monthly state file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonthKey {
    year: i32,
    month: u8,
}

impl MonthKey {
    pub fn new(year: i32, month: u8) -> Result<Self, KeyParseError> {
        if !(1..=12).contains(&month) || !(0..=9999).contains(&year) {
            return Err(key_error("month", &format!("{year:04}-{month:02}")));
        }
        Ok(Self { year, month })
    }

    pub fn parse(input: &str) -> Result<Self, KeyParseError> {
        let (year, month) = input
            .split_once('-')
            .ok_or_else(|| key_error("month", input))?;
        if year.len() != 4 || month.len() != 2 {
            return Err(key_error("month", input));
        }
        let year: i32 = year.parse().map_err(|_| key_error("month", input))?;
        let month: u8 = month.parse().map_err(|_| key_error("month", input))?;
        Self::new(year, month).map_err(|_| key_error("month", input))
    }

    /// Month containing the current UTC date.
    pub fn current() -> Self {
        let today = time::OffsetDateTime::now_utc().date();
        Self {
            year: today.year(),
            month: u8::from(today.month()),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u8 {
        self.month
    }

    /// The month immediately before this one.
    pub fn prev(&self) -> Self {
        if self.month == 1 {
            Self {
                year: self.year - 1,
                month: 12,
            }
        } else {
            Self {
                year: self.year,
                month: self.month - 1,
            }
        }
    }

    /// This month plus the `n - 1` preceding it, newest first.
    pub fn recent_window(n: u32) -> Vec<Self> {
        let mut out = Vec::with_capacity(n as usize);
        let mut cursor = Self::current();
        for _ in 0..n {
            out.push(cursor);
            cursor = cursor.prev();
        }
        out
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for MonthKey {
    type Err = KeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// `YYYY-MM-DD` identifier of one day's state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DateKey {
    year: i32,
    month: u8,
    day: u8,
}

impl DateKey {
    pub fn new(year: i32, month: u8, day: u8) -> Result<Self, KeyParseError> {
        let month_name = Month::try_from(month)
            .map_err(|_| key_error("date", &format!("{year:04}-{month:02}-{day:02}")))?;
        Date::from_calendar_date(year, month_name, day)
            .map_err(|_| key_error("date", &format!("{year:04}-{month:02}-{day:02}")))?;
        Ok(Self { year, month, day })
    }

    pub fn parse(input: &str) -> Result<Self, KeyParseError> {
        let mut parts = input.splitn(3, '-');
        let (Some(year), Some(month), Some(day)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(key_error("date", input));
        };
        if year.len() != 4 || month.len() != 2 || day.len() != 2 {
            return Err(key_error("date", input));
        }
        let year: i32 = year.parse().map_err(|_| key_error("date", input))?;
        let month: u8 = month.parse().map_err(|_| key_error("date", input))?;
        let day: u8 = day.parse().map_err(|_| key_error("date", input))?;
        Self::new(year, month, day).map_err(|_| key_error("date", input))
    }

    pub fn month_key(&self) -> MonthKey {
        MonthKey {
            year: self.year,
            month: self.month,
        }
    }

    pub fn day(&self) -> u8 {
        self.day
    }
}

impl fmt::Display for DateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", self.year, self.month, self.day)
    }
}

impl FromStr for DateKey {
    type Err = KeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for MonthKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MonthKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

impl Serialize for DateKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DateKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_render_round_trip() {
        let date = DateKey::parse("2026-02-19").unwrap();
        assert_eq!(date.to_string(), "2026-02-19");
        assert_eq!(date.month_key().to_string(), "2026-02");
    }

    #[test]
    fn rejects_malformed_keys() {
        assert!(DateKey::parse("2026-2-19").is_err());
        assert!(DateKey::parse("2026-13-01").is_err());
        assert!(DateKey::parse("2026-02-30").is_err());
        assert!(DateKey::parse("garbage").is_err());
        assert!(MonthKey::parse("2026-00").is_err());
        assert!(MonthKey::parse("2026").is_err());
    }

    #[test]
    fn month_prev_crosses_year_boundary() {
        let jan = MonthKey::parse("2026-01").unwrap();
        assert_eq!(jan.prev().to_string(), "2025-12");
    }

    #[test]
    fn date_keys_order_chronologically() {
        let a = DateKey::parse("2026-01-31").unwrap();
        let b = DateKey::parse("2026-02-01").unwrap();
        assert!(a < b);
    }

    #[test]
    fn serde_as_plain_string() {
        let date = DateKey::parse("2026-02-19").unwrap();
        let json = serde_json::to_string(&date).unwrap();
        assert_eq!(json, "\"2026-02-19\"");
        let back: DateKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, date);
    }
}
