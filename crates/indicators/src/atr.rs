use domain::Price;

use crate::candle::Candle;

/// True Range of a single candle
pub fn true_range(prev_close: Price, candle: &Candle) -> Price {
    let hl = candle.high.0 - candle.low.0;
    let hc = (candle.high.0 - prev_close.0).abs();
    let lc = (candle.low.0 - prev_close.0).abs();

    Price(hl.max(hc).max(lc))
}

/// ATR as the simple mean of the last `period` true ranges.
/// Needs `period + 1` candles: the first one only provides a previous close.
pub fn atr(candles: &[Candle], period: usize) -> Option<Price> {
    if period == 0 || candles.len() < period + 1 {
        return None;
    }

    let window = &candles[candles.len() - period - 1..];

    let sum: f64 = window
        .windows(2)
        .map(|w| true_range(w[0].close, &w[1]).0)
        .sum();

    Some(Price(sum / period as f64))
}
