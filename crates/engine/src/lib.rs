pub mod bot;
pub mod config;
pub mod event;
pub mod sink;
pub mod trade_log;
pub mod trader;

pub use bot::Bot;
pub use config::{Settings, TradingMode};
pub use trade_log::TradeLog;
pub use trader::{CycleOutcome, Trader};
