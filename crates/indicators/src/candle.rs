use std::fmt;
use std::str::FromStr;

use domain::{Price, Qty, TimestampMs};
use thiserror::Error;

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Candle {
    pub ts: TimestampMs,
    pub open: Price,
    pub high: Price,
    pub low: Price,
    pub close: Price,
    pub volume: Qty,
}

/// Closes of a candle window, oldest first
pub fn closes(candles: &[Candle]) -> Vec<f64> {
    candles.iter().map(|c| c.close.0).collect()
}

/// Kline interval
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Interval {
    Min1,
    Min3,
    Min5,
    Min15,
    Min30,
    Hour1,
    Hour4,
    Day1,
}

impl Interval {
    pub fn as_str(self) -> &'static str {
        match self {
            Interval::Min1 => "1m",
            Interval::Min3 => "3m",
            Interval::Min5 => "5m",
            Interval::Min15 => "15m",
            Interval::Min30 => "30m",
            Interval::Hour1 => "1h",
            Interval::Hour4 => "4h",
            Interval::Day1 => "1d",
        }
    }

    pub fn as_millis(self) -> i64 {
        match self {
            Interval::Min1 => 60_000,
            Interval::Min3 => 3 * 60_000,
            Interval::Min5 => 5 * 60_000,
            Interval::Min15 => 15 * 60_000,
            Interval::Min30 => 30 * 60_000,
            Interval::Hour1 => 60 * 60_000,
            Interval::Hour4 => 4 * 60 * 60_000,
            Interval::Day1 => 24 * 60 * 60_000,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown kline interval: {0}")]
pub struct UnknownInterval(pub String);

impl FromStr for Interval {
    type Err = UnknownInterval;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "1m" => Ok(Interval::Min1),
            "3m" => Ok(Interval::Min3),
            "5m" => Ok(Interval::Min5),
            "15m" => Ok(Interval::Min15),
            "30m" => Ok(Interval::Min30),
            "1h" => Ok(Interval::Hour1),
            "4h" => Ok(Interval::Hour4),
            "1d" => Ok(Interval::Day1),
            other => Err(UnknownInterval(other.to_string())),
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
