//! Core domain types.
//!
//! Goals:
//! - no bare f64 in trading logic
//! - units are fixed by the type
//! - mistakes show up at the type level

use std::fmt;
use std::ops::{Add, Div, Mul, Sub};

use serde::{Deserialize, Serialize};

/// Asset price (e.g. BTC/USDT)
#[derive(Debug, Copy, Clone, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Price(pub f64);

/// Asset quantity (contracts / BTC)
#[derive(Debug, Copy, Clone, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Qty(pub f64);

/// Money amount (USDT)
#[derive(Debug, Copy, Clone, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Money(pub f64);

/// Basis points (1 bps = 0.01%)
#[derive(Debug, Copy, Clone, PartialEq, PartialOrd)]
pub struct Bps(pub f64);

/// Fraction / coefficient
#[derive(Debug, Copy, Clone, PartialEq, PartialOrd)]
pub struct Ratio(pub f64);

/// Milliseconds since unix epoch
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimestampMs(pub i64);

/// Order side
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    /// Side as the exchange spells it
    pub fn as_exchange_str(self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

/// Direction of an open futures position
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    /// Position opened by an entry on `side`
    pub fn from_entry(side: Side) -> Self {
        match side {
            Side::Buy => PositionSide::Long,
            Side::Sell => PositionSide::Short,
        }
    }

    /// Side of the order that closes this position
    pub fn closing_side(self) -> Side {
        match self {
            PositionSide::Long => Side::Sell,
            PositionSide::Short => Side::Buy,
        }
    }
}

/// Open position (one symbol, one direction)
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Position {
    pub side: PositionSide,
    pub qty: Qty,
    pub entry_price: Price,
}

impl Position {
    pub fn unrealized_pnl(&self, mark: Price) -> Money {
        let diff = match self.side {
            PositionSide::Long => mark.0 - self.entry_price.0,
            PositionSide::Short => self.entry_price.0 - mark.0,
        };
        Money(diff * self.qty.0)
    }
}

//
// --- Conversions & helpers --------------------------------------------------
//

impl Bps {
    /// bps -> ratio
    pub fn as_ratio(self) -> Ratio {
        Ratio(self.0 / 10_000.0)
    }
}

impl Ratio {
    pub fn clamp_01(self) -> Self {
        Ratio(self.0.clamp(0.0, 1.0))
    }
}

//
// --- Arithmetic (kept minimal) ----------------------------------------------
//

impl Add for Money {
    type Output = Money;
    fn add(self, rhs: Money) -> Money {
        Money(self.0 + rhs.0)
    }
}

impl Sub for Money {
    type Output = Money;
    fn sub(self, rhs: Money) -> Money {
        Money(self.0 - rhs.0)
    }
}

impl Mul<Price> for Qty {
    type Output = Money;
    fn mul(self, price: Price) -> Money {
        Money(self.0 * price.0)
    }
}

impl Div<Price> for Money {
    type Output = Qty;
    fn div(self, price: Price) -> Qty {
        Qty(self.0 / price.0)
    }
}

//
// --- Display (logs / dashboard) ---------------------------------------------
//

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4}", self.0)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl fmt::Display for Bps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2} bps", self.0)
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "buy"),
            Side::Sell => write!(f, "sell"),
        }
    }
}

impl fmt::Display for PositionSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PositionSide::Long => write!(f, "long"),
            PositionSide::Short => write!(f, "short"),
        }
    }
}
