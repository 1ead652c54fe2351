//! Binance USDT-M futures connectivity: REST (public and signed), the kline
//! WebSocket stream, and the `execution` traits on top of them.

pub mod config;
pub mod error;
pub mod exchange;
pub mod feed;
pub mod rest;
pub mod ws;

pub use config::BinanceConfig;
pub use error::BinanceError;
pub use exchange::{BinanceExchange, BinanceMarketData};
pub use feed::StreamFeed;
pub use rest::BinanceFutures;
