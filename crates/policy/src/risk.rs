use domain::{Money, Price, Qty, Ratio, Side};
use indicators::Bands;

/// Sizing and bracket parameters
#[derive(Debug, Copy, Clone)]
pub struct RiskParams {
    /// share of the balance put at risk per trade
    pub risk_per_trade: Ratio,
    pub leverage: f64,
    /// target PnL on margin, e.g. 0.10 = +10%
    pub take_profit_pnl: f64,
    pub stop_loss_pnl: f64,
    /// take profit at the opposite Bollinger band instead of a fixed PnL
    pub use_bb_take_profit: bool,
}

/// TP / SL trigger prices for an entry
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Bracket {
    pub take_profit: Price,
    pub stop_loss: Price,
}

/// qty = balance * risk / ATR. Zero when any input is not positive.
pub fn position_size(balance: Money, risk: Ratio, atr: Price) -> Qty {
    if balance.0 <= 0.0 || risk.0 <= 0.0 || atr.0 <= 0.0 {
        return Qty(0.0);
    }
    Qty(balance.0 * risk.0 / atr.0)
}

/// Round a quantity down to the exchange step
pub fn round_down_to_step(qty: Qty, step: Qty) -> Qty {
    if qty.0 <= 0.0 {
        return Qty(0.0);
    }
    if step.0 <= 0.0 {
        return qty;
    }
    // 1e-9 absorbs float noise like 0.3 / 0.1 = 2.9999999999999996
    let steps = (qty.0 / step.0 + 1e-9).floor();
    let decimals = step_decimals(step.0);
    let factor = 10f64.powi(decimals as i32);
    Qty((steps * step.0 * factor).round() / factor)
}

/// Decimal places of a step or tick size such as 0.001
pub fn step_decimals(step: f64) -> usize {
    let mut d = 0;
    let mut s = step;
    while d < 12 && (s - s.round()).abs() > 1e-9 {
        s *= 10.0;
        d += 1;
    }
    d
}

/// TP and SL around the live price.
///
/// PnL targets are on margin, so the price distance is pnl / leverage.
pub fn bracket(side: Side, live: Price, bands: Option<&Bands>, params: RiskParams) -> Bracket {
    let leverage = if params.leverage > 0.0 { params.leverage } else { 1.0 };

    let take_profit = match (params.use_bb_take_profit, bands) {
        (true, Some(b)) => match side {
            Side::Buy => b.upper,
            Side::Sell => b.lower,
        },
        _ => {
            let tp_pct = params.take_profit_pnl / leverage;
            match side {
                Side::Buy => Price(live.0 * (1.0 + tp_pct)),
                Side::Sell => Price(live.0 * (1.0 - tp_pct)),
            }
        }
    };

    let sl_pct = params.stop_loss_pnl / leverage;
    let stop_loss = match side {
        Side::Buy => Price(live.0 * (1.0 - sl_pct)),
        Side::Sell => Price(live.0 * (1.0 + sl_pct)),
    };

    Bracket {
        take_profit,
        stop_loss,
    }
}
