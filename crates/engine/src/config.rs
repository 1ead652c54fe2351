use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::FixedOffset;
use thiserror::Error;

use domain::Ratio;
use indicators::Interval;
use policy::risk::RiskParams;
use policy::signal::{RsiParams, SignalParams};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TradingMode {
    /// simulated account on live market data
    Paper,
    Live,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown trading mode: {0} (expected paper or live)")]
pub struct UnknownMode(pub String);

impl FromStr for TradingMode {
    type Err = UnknownMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "paper" => Ok(Self::Paper),
            "live" => Ok(Self::Live),
            other => Err(UnknownMode(other.to_string())),
        }
    }
}

impl fmt::Display for TradingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Paper => f.write_str("paper"),
            Self::Live => f.write_str("live"),
        }
    }
}

/// Strategy and loop settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub symbol: String,
    pub interval: Interval,
    pub leverage: u32,
    pub risk_per_trade: f64,

    pub rsi_period: usize,
    pub rsi_oversold: f64,
    pub rsi_overbought: f64,
    pub bb_period: usize,
    pub bb_std_dev: f64,
    pub atr_period: usize,

    pub use_bb_breakout: bool,
    pub use_rsi_reversal: bool,
    pub use_bb_take_profit: bool,
    pub take_profit_pnl: f64,
    pub stop_loss_pnl: f64,
    pub squeeze_lookback: usize,
    pub squeeze_ratio: f64,

    pub cycle_interval: Duration,
    pub order_settle: Duration,
    pub log_capacity: usize,
    pub log_utc_offset_hours: i32,

    pub mode: TradingMode,
    pub paper_balance: f64,
    pub start_running: bool,
    pub kline_limit: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            symbol: "BTCUSDT".to_string(),
            interval: Interval::Min1,
            leverage: 10,
            risk_per_trade: 0.01,
            rsi_period: 14,
            rsi_oversold: 30.0,
            rsi_overbought: 70.0,
            bb_period: 20,
            bb_std_dev: 2.0,
            atr_period: 14,
            use_bb_breakout: false,
            use_rsi_reversal: true,
            use_bb_take_profit: false,
            take_profit_pnl: 0.10,
            stop_loss_pnl: 0.05,
            squeeze_lookback: 50,
            squeeze_ratio: 0.8,
            cycle_interval: Duration::from_secs(60),
            order_settle: Duration::from_secs(5),
            log_capacity: 200,
            log_utc_offset_hours: 9,
            mode: TradingMode::Paper,
            paper_balance: 50.0,
            start_running: false,
            kline_limit: 200,
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; missing keys keep their default
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let d = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let s = Self {
            symbol: get("SYMBOL").map(|v| v.trim().to_uppercase()).unwrap_or(d.symbol),
            interval: parse_or(&get, "KLINE_INTERVAL", d.interval)?,
            leverage: parse_or(&get, "LEVERAGE", d.leverage)?,
            risk_per_trade: parse_or(&get, "RISK_PER_TRADE", d.risk_per_trade)?,
            rsi_period: parse_or(&get, "RSI_PERIOD", d.rsi_period)?,
            rsi_oversold: parse_or(&get, "RSI_OVERSOLD", d.rsi_oversold)?,
            rsi_overbought: parse_or(&get, "RSI_OVERBOUGHT", d.rsi_overbought)?,
            bb_period: parse_or(&get, "BB_PERIOD", d.bb_period)?,
            bb_std_dev: parse_or(&get, "BB_STD_DEV", d.bb_std_dev)?,
            atr_period: parse_or(&get, "ATR_PERIOD", d.atr_period)?,
            use_bb_breakout: flag_or(&get, "USE_BB_BREAKOUT_STRATEGY", d.use_bb_breakout)?,
            use_rsi_reversal: flag_or(&get, "USE_RSI_REVERSAL_STRATEGY", d.use_rsi_reversal)?,
            use_bb_take_profit: flag_or(&get, "USE_BOLLINGER_BANDS_TP", d.use_bb_take_profit)?,
            take_profit_pnl: parse_or(&get, "TARGET_TAKE_PROFIT_PNL", d.take_profit_pnl)?,
            stop_loss_pnl: parse_or(&get, "TARGET_STOP_LOSS_PNL", d.stop_loss_pnl)?,
            squeeze_lookback: parse_or(&get, "BB_SQUEEZE_LOOKBACK", d.squeeze_lookback)?,
            squeeze_ratio: parse_or(&get, "BB_SQUEEZE_RATIO", d.squeeze_ratio)?,
            cycle_interval: Duration::from_secs(parse_or(
                &get,
                "CYCLE_INTERVAL_SECS",
                d.cycle_interval.as_secs(),
            )?),
            order_settle: Duration::from_secs(parse_or(
                &get,
                "ORDER_SETTLE_SECS",
                d.order_settle.as_secs(),
            )?),
            log_capacity: parse_or(&get, "TRADE_LOG_CAPACITY", d.log_capacity)?,
            log_utc_offset_hours: parse_or(&get, "LOG_UTC_OFFSET_HOURS", d.log_utc_offset_hours)?,
            mode: parse_or(&get, "TRADING_MODE", d.mode)?,
            paper_balance: parse_or(&get, "PAPER_BALANCE", d.paper_balance)?,
            start_running: flag_or(&get, "START_RUNNING", d.start_running)?,
            kline_limit: parse_or(&get, "KLINE_LIMIT", d.kline_limit)?,
        };

        s.validate()?;
        Ok(s)
    }

    pub fn validate(&self) -> Result<()> {
        if self.leverage == 0 {
            bail!("LEVERAGE must be at least 1");
        }
        if self.rsi_period == 0 || self.bb_period < 2 || self.atr_period == 0 {
            bail!("indicator periods must be positive (BB_PERIOD at least 2)");
        }
        if !(0.0..1.0).contains(&self.risk_per_trade) {
            bail!("RISK_PER_TRADE must be in [0, 1): {}", self.risk_per_trade);
        }
        if self.rsi_oversold >= self.rsi_overbought {
            bail!(
                "RSI_OVERSOLD ({}) must be below RSI_OVERBOUGHT ({})",
                self.rsi_oversold,
                self.rsi_overbought
            );
        }
        if self.log_capacity == 0 {
            bail!("TRADE_LOG_CAPACITY must be positive");
        }
        if self.cycle_interval.is_zero() {
            bail!("CYCLE_INTERVAL_SECS must be positive");
        }
        self.log_offset()?;
        Ok(())
    }

    /// Candles needed before every indicator has a value
    pub fn warmup(&self) -> usize {
        (self.rsi_period + 1)
            .max(self.atr_period + 1)
            .max(self.bb_period)
    }

    pub fn log_offset(&self) -> Result<FixedOffset> {
        self.log_utc_offset_hours
            .checked_mul(3600)
            .and_then(FixedOffset::east_opt)
            .with_context(|| {
                format!("LOG_UTC_OFFSET_HOURS out of range: {}", self.log_utc_offset_hours)
            })
    }

    pub fn signal_params(&self) -> SignalParams {
        SignalParams {
            use_bb_breakout: self.use_bb_breakout,
            use_rsi_reversal: self.use_rsi_reversal,
            rsi: RsiParams {
                oversold: self.rsi_oversold,
                overbought: self.rsi_overbought,
            },
        }
    }

    pub fn risk_params(&self) -> RiskParams {
        RiskParams {
            risk_per_trade: Ratio(self.risk_per_trade),
            leverage: f64::from(self.leverage),
            take_profit_pnl: self.take_profit_pnl,
            stop_loss_pnl: self.stop_loss_pnl,
            use_bb_take_profit: self.use_bb_take_profit,
        }
    }
}

fn parse_or<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match get(key) {
        Some(v) => v
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{}", e))
            .with_context(|| format!("invalid {}: {:?}", key, v)),
        None => Ok(default),
    }
}

fn flag_or(get: &impl Fn(&str) -> Option<String>, key: &str, default: bool) -> Result<bool> {
    match get(key) {
        Some(v) => match v.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => bail!("invalid {}: {:?} (expected true/false)", key, v),
        },
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_pairs(pairs: &[(&str, &str)]) -> Result<Settings> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn empty_environment_gives_defaults() {
        let s = from_pairs(&[]).unwrap();
        assert_eq!(s.symbol, "BTCUSDT");
        assert_eq!(s.interval, Interval::Min1);
        assert_eq!(s.leverage, 10);
        assert_eq!(s.mode, TradingMode::Paper);
        assert!(s.use_rsi_reversal);
        assert!(!s.use_bb_breakout);
        assert!(!s.start_running);
        assert_eq!(s.log_capacity, 200);
        assert_eq!(s.log_offset().unwrap().local_minus_utc(), 9 * 3600);
    }

    #[test]
    fn overrides_are_parsed() {
        let s = from_pairs(&[
            ("SYMBOL", "ethusdt"),
            ("KLINE_INTERVAL", "15m"),
            ("LEVERAGE", "5"),
            ("USE_BB_BREAKOUT_STRATEGY", "True"),
            ("TRADING_MODE", "live"),
            ("ORDER_SETTLE_SECS", "0"),
        ])
        .unwrap();
        assert_eq!(s.symbol, "ETHUSDT");
        assert_eq!(s.interval, Interval::Min15);
        assert_eq!(s.risk_params().leverage, 5.0);
        assert!(s.signal_params().use_bb_breakout);
        assert_eq!(s.mode, TradingMode::Live);
        assert!(s.order_settle.is_zero());
    }

    #[test]
    fn malformed_values_name_the_variable() {
        let err = from_pairs(&[("LEVERAGE", "ten")]).unwrap_err();
        assert!(format!("{:#}", err).contains("LEVERAGE"));

        let err = from_pairs(&[("TRADING_MODE", "demo")]).unwrap_err();
        assert!(format!("{:#}", err).contains("unknown trading mode: demo"));

        let err = from_pairs(&[("START_RUNNING", "maybe")]).unwrap_err();
        assert!(err.to_string().contains("START_RUNNING"));
    }

    #[test]
    fn inconsistent_values_are_rejected() {
        assert!(from_pairs(&[("LEVERAGE", "0")]).is_err());
        assert!(from_pairs(&[("RSI_OVERSOLD", "80")]).is_err());
        assert!(from_pairs(&[("LOG_UTC_OFFSET_HOURS", "30")]).is_err());
        assert!(from_pairs(&[("LOG_UTC_OFFSET_HOURS", "1000000")]).is_err());
        assert!(from_pairs(&[("LOG_UTC_OFFSET_HOURS", "-1000000")]).is_err());
    }

    #[test]
    fn warmup_covers_every_indicator() {
        let s = Settings::default();
        assert_eq!(s.warmup(), 20);
    }
}
