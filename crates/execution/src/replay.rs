use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use domain::Price;
use indicators::Candle;

use crate::exchange::{ExchangeError, MarketData};

/// Historical candles played back one bar at a time
pub struct ReplayFeed {
    candles: Vec<Candle>,
    cursor: AtomicUsize,
}

impl ReplayFeed {
    /// Starts at the first candle
    pub fn new(candles: Vec<Candle>) -> Self {
        Self {
            candles,
            cursor: AtomicUsize::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor.load(Ordering::Relaxed)
    }

    /// Jump to a bar (clamped to the last one)
    pub fn seek(&self, index: usize) {
        let last = self.candles.len().saturating_sub(1);
        self.cursor.store(index.min(last), Ordering::Relaxed);
    }

    /// Move to the next bar. False at the end of the data.
    pub fn advance(&self) -> bool {
        let cur = self.cursor();
        if cur + 1 >= self.candles.len() {
            return false;
        }
        self.cursor.store(cur + 1, Ordering::Relaxed);
        true
    }

    pub fn current(&self) -> Option<&Candle> {
        self.candles.get(self.cursor())
    }
}

#[async_trait]
impl MarketData for ReplayFeed {
    async fn klines(&self, limit: usize) -> Result<Vec<Candle>, ExchangeError> {
        if self.candles.is_empty() {
            return Err(ExchangeError::NoMarketData);
        }
        let end = self.cursor() + 1;
        let start = end.saturating_sub(limit);
        Ok(self.candles[start..end].to_vec())
    }

    async fn current_price(&self) -> Result<Price, ExchangeError> {
        self.current()
            .map(|c| c.close)
            .ok_or(ExchangeError::NoMarketData)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{Qty, TimestampMs};

    fn candles(n: usize) -> Vec<Candle> {
        (0..n)
            .map(|i| Candle {
                ts: TimestampMs(i as i64 * 60_000),
                open: Price(i as f64),
                high: Price(i as f64 + 1.0),
                low: Price(i as f64 - 1.0),
                close: Price(i as f64),
                volume: Qty(1.0),
            })
            .collect()
    }

    #[tokio::test]
    async fn window_ends_at_cursor() {
        let feed = ReplayFeed::new(candles(10));
        feed.seek(5);

        let w = feed.klines(3).await.unwrap();
        assert_eq!(w.len(), 3);
        assert_eq!(w.last().unwrap().close, Price(5.0));
        assert_eq!(feed.current_price().await.unwrap(), Price(5.0));
    }

    #[tokio::test]
    async fn window_is_truncated_at_start() {
        let feed = ReplayFeed::new(candles(10));
        assert_eq!(feed.klines(200).await.unwrap().len(), 1);
    }

    #[test]
    fn advance_stops_at_last_bar() {
        let feed = ReplayFeed::new(candles(2));
        assert!(feed.advance());
        assert!(!feed.advance());
        assert_eq!(feed.cursor(), 1);
    }

    #[tokio::test]
    async fn empty_feed_has_no_data() {
        let feed = ReplayFeed::new(Vec::new());
        assert!(matches!(
            feed.current_price().await,
            Err(ExchangeError::NoMarketData)
        ));
    }
}
