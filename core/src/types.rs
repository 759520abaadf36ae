//! Shared primitive types used across the whole pipeline.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Open-ended validity sentinel for dimension history windows.
pub const OPEN_END: &str = "5999-12-31 23:59:59";

/// Timestamp text format stored in the database. Lexicographic order on
/// this format matches chronological order, so SQL BETWEEN works directly
/// on the stored text.
pub const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Date text format for contract / passport validity columns.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

pub fn ts_to_text(ts: NaiveDateTime) -> String {
    ts.format(TS_FORMAT).to_string()
}

pub fn ts_from_text(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, TS_FORMAT).ok()
}

pub fn date_to_text(d: NaiveDate) -> String {
    d.format(DATE_FORMAT).to_string()
}

pub fn date_from_text(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, DATE_FORMAT).ok()
}

/// Midnight at the start of `d`. Batch timestamps are day-grained.
pub fn day_start(d: NaiveDate) -> NaiveDateTime {
    d.and_time(NaiveTime::MIN)
}

/// A money amount in minor units (cents). Transaction extracts carry
/// decimal-comma amounts ("1234,56"); parsing accepts both comma and dot
/// and rejects more than two fractional digits.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Money(i64);

impl Money {
    pub fn from_minor(minor: i64) -> Self {
        Money(minor)
    }

    pub fn minor(self) -> i64 {
        self.0
    }
}

impl FromStr for Money {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().replace(',', ".");
        let (sign, body) = match normalized.strip_prefix('-') {
            Some(rest) => (-1i64, rest),
            None => (1i64, normalized.as_str()),
        };
        let (int_part, frac_part) = match body.split_once('.') {
            Some((i, f)) => (i, f),
            None => (body, ""),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(format!("empty amount '{s}'"));
        }
        let int: i64 = if int_part.is_empty() {
            0
        } else {
            digits(int_part).ok_or_else(|| format!("bad amount '{s}'"))?
        };
        let frac: i64 = match frac_part.len() {
            0 => 0,
            1 => digits(frac_part).ok_or_else(|| format!("bad amount '{s}'"))? * 10,
            2 => digits(frac_part).ok_or_else(|| format!("bad amount '{s}'"))?,
            _ => return Err(format!("amount '{s}' has more than two decimal places")),
        };
        Ok(Money(sign * (int * 100 + frac)))
    }
}

fn digits(s: &str) -> Option<i64> {
    if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) {
        s.parse().ok()
    } else {
        None
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_decimal_comma_and_dot() {
        assert_eq!("1234,56".parse::<Money>().unwrap(), Money::from_minor(123456));
        assert_eq!("1234.56".parse::<Money>().unwrap(), Money::from_minor(123456));
        assert_eq!("100".parse::<Money>().unwrap(), Money::from_minor(10000));
        assert_eq!("0,5".parse::<Money>().unwrap(), Money::from_minor(50));
        assert_eq!("-3,05".parse::<Money>().unwrap(), Money::from_minor(-305));
    }

    #[test]
    fn rejects_malformed_amounts() {
        assert!("".parse::<Money>().is_err());
        assert!("12,345".parse::<Money>().is_err());
        assert!("12,3x".parse::<Money>().is_err());
        assert!("--5".parse::<Money>().is_err());
    }

    #[test]
    fn displays_with_dot_and_two_places() {
        assert_eq!(Money::from_minor(123456).to_string(), "1234.56");
        assert_eq!(Money::from_minor(-305).to_string(), "-3.05");
        assert_eq!(Money::from_minor(7).to_string(), "0.07");
    }

    #[test]
    fn timestamp_text_round_trips() {
        let ts = day_start(NaiveDate::from_ymd_opt(2021, 3, 1).unwrap());
        assert_eq!(ts_to_text(ts), "2021-03-01 00:00:00");
        assert_eq!(ts_from_text("2021-03-01 00:00:00"), Some(ts));
    }
}
