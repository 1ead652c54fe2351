use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{RwLock, mpsc};
use tracing::info;

use domain::Price;
use execution::{ExchangeError, MarketData};
use indicators::{Candle, Interval};

use crate::error::BinanceError;
use crate::rest::BinanceFutures;
use crate::ws::{MarketEvent, run_kline_stream};

/// Kline window kept current by the WebSocket stream.
///
/// Seeded once over REST, then updated in place: the forming candle is
/// replaced on every update and a new one is appended when it opens.
pub struct StreamFeed {
    capacity: usize,
    candles: RwLock<VecDeque<Candle>>,
    last_price: RwLock<Option<Price>>,
}

impl StreamFeed {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            candles: RwLock::new(VecDeque::new()),
            last_price: RwLock::new(None),
        }
    }

    /// Seed over REST and keep the window updated from the kline stream
    pub async fn spawn(
        api: BinanceFutures,
        symbol: &str,
        interval: Interval,
        capacity: usize,
    ) -> Result<Arc<Self>, BinanceError> {
        let feed = Arc::new(Self::new(capacity));
        let limit = u16::try_from(feed.capacity).unwrap_or(u16::MAX);
        feed.seed(api.klines(symbol, interval, limit).await?).await;
        info!("stream feed seeded with {} {} candles", feed.len().await, interval);

        let (tx, mut rx) = mpsc::channel::<MarketEvent>(1024);
        tokio::spawn(run_kline_stream(
            api.config().clone(),
            symbol.to_string(),
            interval,
            tx,
        ));

        let sink = feed.clone();
        tokio::spawn(async move {
            while let Some(ev) = rx.recv().await {
                sink.apply(ev).await;
            }
        });

        Ok(feed)
    }

    pub async fn seed(&self, candles: Vec<Candle>) {
        let mut w = self.candles.write().await;
        w.clear();
        w.extend(candles);
        while w.len() > self.capacity {
            w.pop_front();
        }
    }

    pub async fn apply(&self, ev: MarketEvent) {
        match ev {
            MarketEvent::LastPrice(p) => {
                *self.last_price.write().await = Some(p);
            }
            MarketEvent::Kline { candle, .. } => {
                let mut w = self.candles.write().await;
                match w.back().map(|c| c.ts) {
                    Some(ts) if ts == candle.ts => {
                        if let Some(last) = w.back_mut() {
                            *last = candle;
                        }
                    }
                    Some(ts) if ts > candle.ts => {}
                    _ => w.push_back(candle),
                }
                while w.len() > self.capacity {
                    w.pop_front();
                }
            }
        }
    }

    pub async fn len(&self) -> usize {
        self.candles.read().await.len()
    }
}

#[async_trait]
impl MarketData for StreamFeed {
    async fn klines(&self, limit: usize) -> Result<Vec<Candle>, ExchangeError> {
        let w = self.candles.read().await;
        if w.is_empty() {
            return Err(ExchangeError::NoMarketData);
        }
        let skip = w.len().saturating_sub(limit);
        Ok(w.iter().skip(skip).copied().collect())
    }

    async fn current_price(&self) -> Result<Price, ExchangeError> {
        if let Some(p) = *self.last_price.read().await {
            return Ok(p);
        }
        self.candles
            .read()
            .await
            .back()
            .map(|c| c.close)
            .ok_or(ExchangeError::NoMarketData)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{Qty, TimestampMs};

    fn c(ts: i64, close: f64) -> Candle {
        Candle {
            ts: TimestampMs(ts),
            open: Price(close),
            high: Price(close),
            low: Price(close),
            close: Price(close),
            volume: Qty(1.0),
        }
    }

    #[tokio::test]
    async fn forming_candle_is_replaced_then_appended() {
        let feed = StreamFeed::new(3);
        feed.seed(vec![c(1, 10.0), c(2, 11.0)]).await;

        feed.apply(MarketEvent::Kline { candle: c(2, 12.0), closed: false }).await;
        assert_eq!(feed.len().await, 2);
        assert_eq!(feed.current_price().await.unwrap(), Price(12.0));

        feed.apply(MarketEvent::Kline { candle: c(3, 13.0), closed: false }).await;
        feed.apply(MarketEvent::Kline { candle: c(4, 14.0), closed: false }).await;
        let w = feed.klines(10).await.unwrap();
        assert_eq!(w.len(), 3);
        assert_eq!(w[0].ts, TimestampMs(2));
    }

    #[tokio::test]
    async fn stale_updates_are_ignored() {
        let feed = StreamFeed::new(5);
        feed.seed(vec![c(5, 10.0)]).await;
        feed.apply(MarketEvent::Kline { candle: c(4, 1.0), closed: true }).await;
        assert_eq!(feed.klines(5).await.unwrap(), vec![c(5, 10.0)]);
    }

    #[tokio::test]
    async fn last_price_wins_over_candle_close() {
        let feed = StreamFeed::new(5);
        feed.seed(vec![c(1, 10.0)]).await;
        feed.apply(MarketEvent::LastPrice(Price(10.5))).await;
        assert_eq!(feed.current_price().await.unwrap(), Price(10.5));
    }

    #[tokio::test]
    async fn empty_feed_reports_no_data() {
        let feed = StreamFeed::new(5);
        assert!(feed.klines(1).await.is_err());
        assert!(feed.current_price().await.is_err());
    }
}
