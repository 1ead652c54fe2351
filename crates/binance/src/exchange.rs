use async_trait::async_trait;
use tracing::{info, warn};

use domain::{Money, Position, Price, Qty, Side};
use execution::{Exchange, ExchangeError, MarketData, OrderAck};
use indicators::{Candle, Interval};
use policy::risk::{Bracket, round_down_to_step};

use crate::error::BinanceError;
use crate::rest::{BinanceFutures, OrderKind, OrderRequest, SymbolFilters};

/// Public market data for one symbol (no keys needed)
#[derive(Clone)]
pub struct BinanceMarketData {
    api: BinanceFutures,
    symbol: String,
    interval: Interval,
}

impl BinanceMarketData {
    pub fn new(api: BinanceFutures, symbol: impl Into<String>, interval: Interval) -> Self {
        Self {
            api,
            symbol: symbol.into(),
            interval,
        }
    }
}

#[async_trait]
impl MarketData for BinanceMarketData {
    async fn klines(&self, limit: usize) -> Result<Vec<Candle>, ExchangeError> {
        let limit = u16::try_from(limit).unwrap_or(u16::MAX);
        Ok(self.api.klines(&self.symbol, self.interval, limit).await?)
    }

    async fn current_price(&self) -> Result<Price, ExchangeError> {
        Ok(self.api.ticker_price(&self.symbol).await?)
    }
}

/// Live futures account for one symbol
pub struct BinanceExchange {
    market: BinanceMarketData,
    filters: SymbolFilters,
}

impl BinanceExchange {
    /// Loads symbol filters and applies the leverage setting
    pub async fn connect(
        api: BinanceFutures,
        symbol: &str,
        interval: Interval,
        leverage: u32,
    ) -> Result<Self, BinanceError> {
        if !api.config().has_credentials() {
            return Err(BinanceError::MissingCredentials);
        }

        let filters = api.symbol_filters(symbol).await?;
        api.set_leverage(symbol, leverage).await?;
        info!(
            "binance {} ready: step={} tick={} leverage={}x",
            symbol, filters.step_size.0, filters.tick_size.0, leverage
        );

        Ok(Self {
            market: BinanceMarketData::new(api, symbol, interval),
            filters,
        })
    }

    fn api(&self) -> &BinanceFutures {
        &self.market.api
    }

    fn symbol(&self) -> &str {
        &self.market.symbol
    }
}

#[async_trait]
impl MarketData for BinanceExchange {
    async fn klines(&self, limit: usize) -> Result<Vec<Candle>, ExchangeError> {
        self.market.klines(limit).await
    }

    async fn current_price(&self) -> Result<Price, ExchangeError> {
        self.market.current_price().await
    }
}

#[async_trait]
impl Exchange for BinanceExchange {
    async fn balance(&self) -> Result<Money, ExchangeError> {
        Ok(self.api().usdt_balance().await?)
    }

    async fn position(&self) -> Result<Option<Position>, ExchangeError> {
        Ok(self.api().position(self.symbol()).await?)
    }

    fn format_amount(&self, qty: Qty) -> Qty {
        round_down_to_step(qty, self.filters.step_size)
    }

    async fn market_order_with_brackets(
        &self,
        side: Side,
        qty: Qty,
        bracket: Bracket,
    ) -> Result<OrderAck, ExchangeError> {
        let entry = self
            .api()
            .place_order(
                self.symbol(),
                &OrderRequest {
                    side,
                    kind: OrderKind::Market,
                    qty: Some(qty),
                    stop_price: None,
                },
                self.filters,
            )
            .await?;

        // entry is already filled from here on
        let exit_side = side.opposite();
        for (kind, price) in [
            (OrderKind::TakeProfitMarket, bracket.take_profit),
            (OrderKind::StopMarket, bracket.stop_loss),
        ] {
            let req = OrderRequest {
                side: exit_side,
                kind,
                qty: None,
                stop_price: Some(price),
            };
            if let Err(e) = self.api().place_order(self.symbol(), &req, self.filters).await {
                warn!("{:?} at {} for order {} failed: {}", kind, price, entry.order_id, e);
                return Err(ExchangeError::Unprotected {
                    order_id: entry.order_id.to_string(),
                    reason: e.to_string(),
                });
            }
        }

        let avg_price = entry
            .avg_price
            .as_deref()
            .and_then(|p| p.parse::<f64>().ok())
            .filter(|p| *p > 0.0)
            .map(Price);

        Ok(OrderAck {
            order_id: entry.order_id.to_string(),
            side,
            qty,
            avg_price,
        })
    }
}
