//! Paper account on top of any market data source.
//!
//! One position at a time, always entered with a TP/SL bracket. Brackets are
//! settled lazily whenever the account is queried: every candle newer than
//! the entry candle is checked against the triggers, then the last price.
//! When a candle touches both TP and SL the stop is assumed to fill first.

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use domain::{Money, Position, PositionSide, Price, Qty, Side, TimestampMs};
use indicators::Candle;
use policy::risk::{Bracket, round_down_to_step};

use crate::exchange::{Exchange, ExchangeError, MarketData, OrderAck};
use crate::sim::ExecutionModel;

/// Candles inspected per settlement
const SETTLE_WINDOW: usize = 100;

/// Closed trade counters
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct PaperStats {
    pub trades: u32,
    pub wins: u32,
    pub losses: u32,
    /// net of entry and exit fees
    pub realized_pnl: Money,
    pub fees: Money,
}

impl Default for PaperStats {
    fn default() -> Self {
        Self {
            trades: 0,
            wins: 0,
            losses: 0,
            realized_pnl: Money(0.0),
            fees: Money(0.0),
        }
    }
}

#[derive(Debug, Copy, Clone)]
struct OpenTrade {
    position: Position,
    bracket: Bracket,
    entry_fee: Money,
    opened_at: TimestampMs,
}

#[derive(Debug)]
struct PaperAccount {
    balance: Money,
    open: Option<OpenTrade>,
    stats: PaperStats,
}

pub struct PaperExchange<M> {
    market: M,
    model: ExecutionModel,
    leverage: f64,
    step: Qty,
    account: Mutex<PaperAccount>,
}

impl<M: MarketData> PaperExchange<M> {
    pub fn new(market: M, initial_balance: Money) -> Self {
        Self {
            market,
            model: ExecutionModel::default(),
            leverage: 1.0,
            step: Qty(0.001),
            account: Mutex::new(PaperAccount {
                balance: initial_balance,
                open: None,
                stats: PaperStats::default(),
            }),
        }
    }

    pub fn with_model(mut self, model: ExecutionModel) -> Self {
        self.model = model;
        self
    }

    pub fn with_leverage(mut self, leverage: f64) -> Self {
        self.leverage = if leverage > 0.0 { leverage } else { 1.0 };
        self
    }

    pub fn with_step(mut self, step: Qty) -> Self {
        self.step = step;
        self
    }

    pub fn market(&self) -> &M {
        &self.market
    }

    pub async fn stats(&self) -> PaperStats {
        self.account.lock().await.stats
    }

    /// Close the open position if its bracket was touched
    pub async fn settle(&self) -> Result<(), ExchangeError> {
        if self.account.lock().await.open.is_none() {
            return Ok(());
        }

        let candles = self.market.klines(SETTLE_WINDOW).await?;
        let last = self.market.current_price().await?;

        let mut acc = self.account.lock().await;
        let Some(open) = acc.open else {
            return Ok(());
        };

        let hit = candles
            .iter()
            .filter(|c| c.ts > open.opened_at)
            .find_map(|c| trigger(&open, c.high, c.low))
            .or_else(|| trigger(&open, last, last));

        if let Some((exit, reason)) = hit {
            self.close(&mut acc, open, exit, reason);
        }

        Ok(())
    }

    fn close(&self, acc: &mut PaperAccount, open: OpenTrade, trigger: Price, reason: ExitReason) {
        let pos = open.position;
        let fill = self.model.fill_price(pos.side.closing_side(), trigger);
        let exit_fee = self.model.fee(pos.qty * fill);
        let gross = pos.unrealized_pnl(fill);

        acc.balance = acc.balance + gross - exit_fee;

        let net = gross - exit_fee - open.entry_fee;
        acc.stats.trades += 1;
        if net.0 > 0.0 {
            acc.stats.wins += 1;
        } else {
            acc.stats.losses += 1;
        }
        acc.stats.realized_pnl = acc.stats.realized_pnl + net;
        acc.stats.fees = acc.stats.fees + exit_fee;
        acc.open = None;

        info!(
            "paper {} {} closed by {:?} at {} net={} balance={}",
            pos.side, pos.qty.0, reason, fill, net, acc.balance
        );
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum ExitReason {
    TakeProfit,
    StopLoss,
}

/// Trigger price hit inside [low, high], stop first
fn trigger(open: &OpenTrade, high: Price, low: Price) -> Option<(Price, ExitReason)> {
    let b = open.bracket;
    match open.position.side {
        PositionSide::Long => {
            if low.0 <= b.stop_loss.0 {
                Some((b.stop_loss, ExitReason::StopLoss))
            } else if high.0 >= b.take_profit.0 {
                Some((b.take_profit, ExitReason::TakeProfit))
            } else {
                None
            }
        }
        PositionSide::Short => {
            if high.0 >= b.stop_loss.0 {
                Some((b.stop_loss, ExitReason::StopLoss))
            } else if low.0 <= b.take_profit.0 {
                Some((b.take_profit, ExitReason::TakeProfit))
            } else {
                None
            }
        }
    }
}

fn bracket_is_valid(side: Side, price: Price, b: Bracket) -> bool {
    match side {
        Side::Buy => b.take_profit.0 > price.0 && b.stop_loss.0 < price.0,
        Side::Sell => b.take_profit.0 < price.0 && b.stop_loss.0 > price.0,
    }
}

#[async_trait]
impl<M: MarketData> MarketData for PaperExchange<M> {
    async fn klines(&self, limit: usize) -> Result<Vec<Candle>, ExchangeError> {
        self.market.klines(limit).await
    }

    async fn current_price(&self) -> Result<Price, ExchangeError> {
        self.market.current_price().await
    }
}

#[async_trait]
impl<M: MarketData> Exchange for PaperExchange<M> {
    async fn balance(&self) -> Result<Money, ExchangeError> {
        self.settle().await?;
        Ok(self.account.lock().await.balance)
    }

    async fn position(&self) -> Result<Option<Position>, ExchangeError> {
        self.settle().await?;
        Ok(self.account.lock().await.open.map(|o| o.position))
    }

    fn format_amount(&self, qty: Qty) -> Qty {
        round_down_to_step(qty, self.step)
    }

    async fn market_order_with_brackets(
        &self,
        side: Side,
        qty: Qty,
        bracket: Bracket,
    ) -> Result<OrderAck, ExchangeError> {
        if qty.0 <= 0.0 {
            return Err(ExchangeError::Rejected {
                code: -4003,
                msg: "quantity less than or equal to zero".into(),
            });
        }

        let price = self.market.current_price().await?;
        let opened_at = self
            .market
            .klines(1)
            .await?
            .last()
            .map(|c| c.ts)
            .ok_or(ExchangeError::NoMarketData)?;

        if !bracket_is_valid(side, price, bracket) {
            return Err(ExchangeError::Rejected {
                code: -2021,
                msg: "order would immediately trigger".into(),
            });
        }

        let mut acc = self.account.lock().await;
        if acc.open.is_some() {
            return Err(ExchangeError::Rejected {
                code: -2022,
                msg: "position already open".into(),
            });
        }

        let fill = self.model.fill_price(side, price);
        let notional = qty * fill;
        let fee = self.model.fee(notional);
        let required = Money(notional.0 / self.leverage) + fee;
        if required.0 > acc.balance.0 {
            return Err(ExchangeError::InsufficientBalance {
                required,
                available: acc.balance,
            });
        }

        acc.balance = acc.balance - fee;
        acc.stats.fees = acc.stats.fees + fee;
        acc.open = Some(OpenTrade {
            position: Position {
                side: PositionSide::from_entry(side),
                qty,
                entry_price: fill,
            },
            bracket,
            entry_fee: fee,
            opened_at,
        });

        debug!("paper {} {} filled at {}", side, qty.0, fill);

        Ok(OrderAck {
            order_id: Uuid::new_v4().to_string(),
            side,
            qty,
            avg_price: Some(fill),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replay::ReplayFeed;
    use std::sync::Arc;

    fn c(ts: i64, high: f64, low: f64, close: f64) -> Candle {
        Candle {
            ts: TimestampMs(ts),
            open: Price(close),
            high: Price(high),
            low: Price(low),
            close: Price(close),
            volume: Qty(1.0),
        }
    }

    fn exchange(candles: Vec<Candle>) -> PaperExchange<Arc<ReplayFeed>> {
        PaperExchange::new(Arc::new(ReplayFeed::new(candles)), Money(1000.0))
            .with_model(ExecutionModel {
                fee_bps: 0.0,
                spread_bps: 0.0,
                slippage_bps: 0.0,
            })
            .with_leverage(10.0)
    }

    fn long_bracket() -> Bracket {
        Bracket {
            take_profit: Price(101.0),
            stop_loss: Price(99.5),
        }
    }

    #[tokio::test]
    async fn take_profit_on_next_candle() {
        let ex = exchange(vec![c(0, 100.0, 100.0, 100.0), c(1, 102.0, 99.8, 101.0)]);
        ex.market_order_with_brackets(Side::Buy, Qty(1.0), long_bracket())
            .await
            .unwrap();
        assert!(ex.position().await.unwrap().is_some());

        ex.market().advance();
        assert!(ex.position().await.unwrap().is_none());
        assert_eq!(ex.balance().await.unwrap(), Money(1001.0));

        let stats = ex.stats().await;
        assert_eq!(stats.trades, 1);
        assert_eq!(stats.wins, 1);
    }

    #[tokio::test]
    async fn stop_wins_when_both_are_touched() {
        let ex = exchange(vec![c(0, 100.0, 100.0, 100.0), c(1, 102.0, 99.0, 100.0)]);
        ex.market_order_with_brackets(Side::Buy, Qty(1.0), long_bracket())
            .await
            .unwrap();

        ex.market().advance();
        assert_eq!(ex.balance().await.unwrap(), Money(999.5));
        assert_eq!(ex.stats().await.losses, 1);
    }

    #[tokio::test]
    async fn entry_candle_range_is_ignored() {
        let ex = exchange(vec![c(0, 105.0, 95.0, 100.0)]);
        ex.market_order_with_brackets(Side::Buy, Qty(1.0), long_bracket())
            .await
            .unwrap();

        assert!(ex.position().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn short_take_profit() {
        let ex = exchange(vec![c(0, 100.0, 100.0, 100.0), c(1, 100.2, 98.0, 98.5)]);
        let bracket = Bracket {
            take_profit: Price(99.0),
            stop_loss: Price(100.5),
        };
        ex.market_order_with_brackets(Side::Sell, Qty(2.0), bracket)
            .await
            .unwrap();

        ex.market().advance();
        assert_eq!(ex.balance().await.unwrap(), Money(1002.0));
    }

    #[tokio::test]
    async fn rejects_second_entry_and_bad_brackets() {
        let ex = exchange(vec![c(0, 100.0, 100.0, 100.0)]);

        let inverted = Bracket {
            take_profit: Price(99.0),
            stop_loss: Price(101.0),
        };
        assert!(matches!(
            ex.market_order_with_brackets(Side::Buy, Qty(1.0), inverted).await,
            Err(ExchangeError::Rejected { .. })
        ));

        ex.market_order_with_brackets(Side::Buy, Qty(1.0), long_bracket())
            .await
            .unwrap();
        assert!(matches!(
            ex.market_order_with_brackets(Side::Buy, Qty(1.0), long_bracket()).await,
            Err(ExchangeError::Rejected { code: -2022, .. })
        ));
    }

    #[tokio::test]
    async fn margin_is_checked() {
        let ex = exchange(vec![c(0, 100.0, 100.0, 100.0)]);
        // notional 200_000 at 10x needs 20_000 margin
        let res = ex
            .market_order_with_brackets(Side::Buy, Qty(2000.0), long_bracket())
            .await;
        assert!(matches!(res, Err(ExchangeError::InsufficientBalance { .. })));
    }

    #[test]
    fn amounts_round_to_step() {
        let ex = exchange(Vec::new()).with_step(Qty(0.01));
        assert_eq!(ex.format_amount(Qty(0.129)), Qty(0.12));
    }
}
