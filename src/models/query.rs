// History range query: enumerated periods and bucket intervals

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

const MS_PER_MINUTE: i64 = 60_000;
const MS_PER_HOUR: i64 = 60 * MS_PER_MINUTE;
const MS_PER_DAY: i64 = 24 * MS_PER_HOUR;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HistoryQueryError {
    #[error("Unknown period '{0}' (expected one of 1h, 6h, 24h, 7d, 30d)")]
    UnknownPeriod(String),
    #[error("Unknown interval '{0}' (expected one of 1m, 5m, 15m, 1h, 6h, 1d)")]
    UnknownInterval(String),
    #[error("Interval {interval} is not supported for period {period}")]
    UnsupportedInterval { period: Period, interval: Interval },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Period {
    #[serde(rename = "1h")]
    Hour,
    #[serde(rename = "6h")]
    SixHours,
    #[serde(rename = "24h")]
    Day,
    #[serde(rename = "7d")]
    Week,
    #[serde(rename = "30d")]
    Month,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interval {
    #[serde(rename = "1m")]
    Minute,
    #[serde(rename = "5m")]
    FiveMinutes,
    #[serde(rename = "15m")]
    FifteenMinutes,
    #[serde(rename = "1h")]
    Hour,
    #[serde(rename = "6h")]
    SixHours,
    #[serde(rename = "1d")]
    Day,
}

impl Period {
    pub const ALL: [Period; 5] = [
        Period::Hour,
        Period::SixHours,
        Period::Day,
        Period::Week,
        Period::Month,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Period::Hour => "1h",
            Period::SixHours => "6h",
            Period::Day => "24h",
            Period::Week => "7d",
            Period::Month => "30d",
        }
    }

    pub fn as_millis(self) -> i64 {
        match self {
            Period::Hour => MS_PER_HOUR,
            Period::SixHours => 6 * MS_PER_HOUR,
            Period::Day => MS_PER_DAY,
            Period::Week => 7 * MS_PER_DAY,
            Period::Month => 30 * MS_PER_DAY,
        }
    }

    /// Intervals a chart may use for this period.
    pub fn allowed_intervals(self) -> &'static [Interval] {
        match self {
            Period::Hour => &[Interval::Minute, Interval::FiveMinutes],
            Period::SixHours => &[
                Interval::Minute,
                Interval::FiveMinutes,
                Interval::FifteenMinutes,
            ],
            Period::Day => &[
                Interval::FiveMinutes,
                Interval::FifteenMinutes,
                Interval::Hour,
            ],
            Period::Week => &[Interval::FifteenMinutes, Interval::Hour, Interval::SixHours],
            Period::Month => &[Interval::Hour, Interval::SixHours, Interval::Day],
        }
    }

    pub fn default_interval(self) -> Interval {
        match self {
            Period::Hour => Interval::Minute,
            Period::SixHours => Interval::FiveMinutes,
            Period::Day => Interval::FifteenMinutes,
            Period::Week => Interval::Hour,
            Period::Month => Interval::SixHours,
        }
    }
}

impl Interval {
    pub fn as_str(self) -> &'static str {
        match self {
            Interval::Minute => "1m",
            Interval::FiveMinutes => "5m",
            Interval::FifteenMinutes => "15m",
            Interval::Hour => "1h",
            Interval::SixHours => "6h",
            Interval::Day => "1d",
        }
    }

    pub fn as_millis(self) -> i64 {
        match self {
            Interval::Minute => MS_PER_MINUTE,
            Interval::FiveMinutes => 5 * MS_PER_MINUTE,
            Interval::FifteenMinutes => 15 * MS_PER_MINUTE,
            Interval::Hour => MS_PER_HOUR,
            Interval::SixHours => 6 * MS_PER_HOUR,
            Interval::Day => MS_PER_DAY,
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Period {
    type Err = HistoryQueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Period::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| HistoryQueryError::UnknownPeriod(s.to_string()))
    }
}

impl FromStr for Interval {
    type Err = HistoryQueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1m" => Ok(Interval::Minute),
            "5m" => Ok(Interval::FiveMinutes),
            "15m" => Ok(Interval::FifteenMinutes),
            "1h" => Ok(Interval::Hour),
            "6h" => Ok(Interval::SixHours),
            "1d" => Ok(Interval::Day),
            other => Err(HistoryQueryError::UnknownInterval(other.to_string())),
        }
    }
}

/// Validated (period, interval) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HistoryQuery {
    pub period: Period,
    pub interval: Interval,
}

impl Default for HistoryQuery {
    fn default() -> Self {
        Self {
            period: Period::Day,
            interval: Period::Day.default_interval(),
        }
    }
}

impl HistoryQuery {
    pub fn new(period: Period, interval: Interval) -> Result<Self, HistoryQueryError> {
        if !period.allowed_intervals().contains(&interval) {
            return Err(HistoryQueryError::UnsupportedInterval { period, interval });
        }
        Ok(Self { period, interval })
    }

    /// Builds a query from raw query-string values. A missing period means 24h;
    /// a missing interval means the period's default.
    pub fn parse(period: Option<&str>, interval: Option<&str>) -> Result<Self, HistoryQueryError> {
        let period = match period.map(str::trim).filter(|s| !s.is_empty()) {
            Some(p) => p.parse()?,
            None => Period::Day,
        };
        let interval = match interval.map(str::trim).filter(|s| !s.is_empty()) {
            Some(i) => i.parse()?,
            None => period.default_interval(),
        };
        Self::new(period, interval)
    }

    /// Every allowed (period, interval) combination.
    pub fn all() -> impl Iterator<Item = HistoryQuery> {
        Period::ALL.into_iter().flat_map(|period| {
            period
                .allowed_intervals()
                .iter()
                .map(move |&interval| HistoryQuery { period, interval })
        })
    }

    /// Inclusive time window `[from, to]` for `now_ms`, with `from` aligned down to a
    /// bucket boundary so every bucket in the window is whole.
    pub fn window(&self, now_ms: i64) -> (i64, i64) {
        let interval_ms = self.interval.as_millis();
        let from = (now_ms - self.period.as_millis()).div_euclid(interval_ms) * interval_ms;
        (from, now_ms)
    }

    pub fn cache_key(&self) -> String {
        format!("{}:{}", self.period, self.interval)
    }
}
