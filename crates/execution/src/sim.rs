use domain::{Money, Price, Side};

/// Cost model for simulated fills
#[derive(Debug, Copy, Clone)]
pub struct ExecutionModel {
    pub fee_bps: f64,
    pub spread_bps: f64,
    pub slippage_bps: f64,
}

impl Default for ExecutionModel {
    /// Binance USDT-M taker fee, tight BTC spread
    fn default() -> Self {
        Self {
            fee_bps: 4.0,
            spread_bps: 1.0,
            slippage_bps: 1.0,
        }
    }
}

impl ExecutionModel {
    fn bps_to_ratio(bps: f64) -> f64 {
        (bps.max(0.0)) / 10_000.0
    }

    pub fn buy_fill_price(self, mid: Price) -> Price {
        let half_spread = Self::bps_to_ratio(self.spread_bps) / 2.0;
        let slippage = Self::bps_to_ratio(self.slippage_bps);
        Price(mid.0 * (1.0 + half_spread + slippage))
    }

    pub fn sell_fill_price(self, mid: Price) -> Price {
        let half_spread = Self::bps_to_ratio(self.spread_bps) / 2.0;
        let slippage = Self::bps_to_ratio(self.slippage_bps);
        Price(mid.0 * (1.0 - half_spread - slippage))
    }

    pub fn fill_price(self, side: Side, mid: Price) -> Price {
        match side {
            Side::Buy => self.buy_fill_price(mid),
            Side::Sell => self.sell_fill_price(mid),
        }
    }

    /// Taker fee on a notional amount
    pub fn fee(self, notional: Money) -> Money {
        if notional.0 <= 0.0 {
            return Money(0.0);
        }
        Money(notional.0 * Self::bps_to_ratio(self.fee_bps))
    }
}
