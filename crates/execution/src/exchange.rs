//! Exchange seams used by the trading cycle.
//!
//! `MarketData` is the public half (candles, last price). `Exchange` adds the
//! account half: balance, open position, order placement. The live Binance
//! client and the paper account both implement them.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use domain::{Money, Position, Price, Qty, Side};
use indicators::Candle;
use policy::risk::Bracket;

#[derive(Error, Debug)]
pub enum ExchangeError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("order rejected ({code}): {msg}")]
    Rejected { code: i64, msg: String },

    #[error("unexpected response: {0}")]
    Decode(String),

    #[error("no market data available")]
    NoMarketData,

    #[error("insufficient balance: required {required}, available {available}")]
    InsufficientBalance { required: Money, available: Money },

    /// The entry filled but the TP/SL orders were refused
    #[error("entry {order_id} filled but its TP/SL was not placed: {reason}")]
    Unprotected { order_id: String, reason: String },
}

/// Accepted entry order
#[derive(Debug, Clone, PartialEq)]
pub struct OrderAck {
    pub order_id: String,
    pub side: Side,
    pub qty: Qty,
    pub avg_price: Option<Price>,
}

#[async_trait]
pub trait MarketData: Send + Sync {
    /// Latest `limit` candles, oldest first
    async fn klines(&self, limit: usize) -> Result<Vec<Candle>, ExchangeError>;

    async fn current_price(&self) -> Result<Price, ExchangeError>;
}

#[async_trait]
pub trait Exchange: MarketData {
    /// Wallet balance in USDT
    async fn balance(&self) -> Result<Money, ExchangeError>;

    async fn position(&self) -> Result<Option<Position>, ExchangeError>;

    /// Round down to the tradable quantity step
    fn format_amount(&self, qty: Qty) -> Qty;

    /// Market entry with reduce-only TP and SL triggers
    async fn market_order_with_brackets(
        &self,
        side: Side,
        qty: Qty,
        bracket: Bracket,
    ) -> Result<OrderAck, ExchangeError>;
}

#[async_trait]
impl<T: MarketData + ?Sized> MarketData for Arc<T> {
    async fn klines(&self, limit: usize) -> Result<Vec<Candle>, ExchangeError> {
        (**self).klines(limit).await
    }

    async fn current_price(&self) -> Result<Price, ExchangeError> {
        (**self).current_price().await
    }
}

#[async_trait]
impl<T: Exchange + ?Sized> Exchange for Arc<T> {
    async fn balance(&self) -> Result<Money, ExchangeError> {
        (**self).balance().await
    }

    async fn position(&self) -> Result<Option<Position>, ExchangeError> {
        (**self).position().await
    }

    fn format_amount(&self, qty: Qty) -> Qty {
        (**self).format_amount(qty)
    }

    async fn market_order_with_brackets(
        &self,
        side: Side,
        qty: Qty,
        bracket: Bracket,
    ) -> Result<OrderAck, ExchangeError> {
        (**self).market_order_with_brackets(side, qty, bracket).await
    }
}
