//! One trading cycle: check the open position, scan for an entry, place a
//! bracketed market order.

use domain::{Price, Qty, Ratio};
use execution::{Exchange, ExchangeError, OrderAck};
use indicators::atr::atr;
use indicators::bollinger::bollinger_bands;
use indicators::candle::closes;
use indicators::rsi::rsi;
use indicators::{Bands, WidthHistory};
use policy::risk::{bracket, position_size};
use policy::signal::{EntrySignal, SignalInput, Strategy, evaluate, first_entry};
use tracing::warn;

use crate::config::Settings;
use crate::trade_log::TradeLog;

#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// a position is open; TP/SL are working on the exchange
    Holding,
    NoSignal,
    /// not enough data or a non-positive order size
    Skipped,
    Entered { signal: EntrySignal, ack: OrderAck },
    /// entry filled but the exchange refused its TP/SL
    Unprotected { signal: EntrySignal, order_id: String },
    OrderFailed,
}

/// Indicator values of the latest fetched window
#[derive(Debug, Copy, Clone)]
struct Snapshot {
    close: Price,
    rsi: f64,
    bands: Bands,
    atr: Price,
}

pub struct Trader<E> {
    exchange: E,
    settings: Settings,
    log: TradeLog,
    widths: WidthHistory,
}

impl<E: Exchange> Trader<E> {
    pub fn new(exchange: E, settings: Settings, log: TradeLog) -> Self {
        let widths = WidthHistory::new(settings.squeeze_lookback);
        Self {
            exchange,
            settings,
            log,
            widths,
        }
    }

    pub fn exchange(&self) -> &E {
        &self.exchange
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Errors before an entry is chosen are returned; errors while entering are
    /// written to the trade log and reported as `OrderFailed`.
    pub async fn run_cycle(&mut self) -> Result<CycleOutcome, ExchangeError> {
        self.log.push("=".repeat(40));
        self.log.push("🚀 starting a new cycle...");

        if self.exchange.position().await?.is_some() {
            self.log.push("📊 holding a position, waiting for TP/SL.");
            return Ok(CycleOutcome::Holding);
        }

        self.log.push("🧐 scanning for a new entry.");
        let candles = self.exchange.klines(self.settings.kline_limit).await?;

        let Some(snap) = self.snapshot(&candles) else {
            self.log.push(format!(
                "⚠️ not enough candles for indicators ({} of {}), skipping.",
                candles.len(),
                self.settings.warmup()
            ));
            return Ok(CycleOutcome::Skipped);
        };

        let width = snap.bands.width();
        let squeezed = width
            .map(|w| self.widths.is_squeeze(w, self.settings.squeeze_ratio))
            .unwrap_or(false);
        if let Some(w) = width {
            self.widths.push(w);
        }

        let params = self.settings.signal_params();
        let decisions = evaluate(
            SignalInput {
                close: snap.close,
                rsi: snap.rsi,
                bands: snap.bands,
                squeezed,
            },
            params,
        );
        let signal = first_entry(&decisions);

        let breakout = matches!(signal, Some(s) if s.strategy == Strategy::BbBreakout);
        if params.use_rsi_reversal && !breakout {
            self.log.push(format!(
                "📈 RSI now: {:.2} (entry: <{} or >{})",
                snap.rsi, params.rsi.oversold, params.rsi.overbought
            ));
        }

        let Some(signal) = signal else {
            for (strategy, d) in &decisions {
                self.log.push(format!("   > {}: {}", strategy, d.reason));
            }
            self.log.push("😴 entry conditions not met, standing by.");
            return Ok(CycleOutcome::NoSignal);
        };

        self.log.push(format!("🎯 entry condition met! ({})", signal));
        match self.enter(signal, snap).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                warn!("entry failed: {}", e);
                self.log.push(format!("🔥 order execution error: {}", e));
                Ok(CycleOutcome::OrderFailed)
            }
        }
    }

    async fn enter(
        &self,
        signal: EntrySignal,
        snap: Snapshot,
    ) -> Result<CycleOutcome, ExchangeError> {
        let live = self.exchange.current_price().await?;
        self.log.push(format!("   > live price: ${:.2}", live.0));

        let balance = self.exchange.balance().await?;
        let raw = position_size(balance, Ratio(self.settings.risk_per_trade), snap.atr);
        if raw.0 <= 0.0 {
            self.log
                .push("⚠️ computed order size is not positive, order not placed.");
            return Ok(CycleOutcome::Skipped);
        }

        let qty: Qty = self.exchange.format_amount(raw);
        if qty.0 <= 0.0 {
            self.log.push(format!(
                "⚠️ order size {:.6} rounds down to zero, order not placed.",
                raw.0
            ));
            return Ok(CycleOutcome::Skipped);
        }

        let b = bracket(
            signal.side,
            live,
            Some(&snap.bands),
            self.settings.risk_params(),
        );
        self.log.push(format!(
            "   > final order: qty {} TP ${:.2}, SL ${:.2}",
            qty.0, b.take_profit.0, b.stop_loss.0
        ));

        match self
            .exchange
            .market_order_with_brackets(signal.side, qty, b)
            .await
        {
            Ok(ack) => {
                self.log.push(format!(
                    "✅ order accepted ({}), waiting {}s for the position to settle.",
                    ack.order_id,
                    self.settings.order_settle.as_secs()
                ));
                tokio::time::sleep(self.settings.order_settle).await;
                Ok(CycleOutcome::Entered { signal, ack })
            }
            Err(ExchangeError::Unprotected { order_id, reason }) => {
                warn!("entry {} has no TP/SL: {}", order_id, reason);
                self.log.push(format!(
                    "🚨 order {} filled but TP/SL was refused ({}). position is open WITHOUT protection!",
                    order_id, reason
                ));
                Ok(CycleOutcome::Unprotected { signal, order_id })
            }
            Err(e @ (ExchangeError::Rejected { .. } | ExchangeError::InsufficientBalance { .. })) => {
                self.log.push(format!(
                    "🔥 order was rejected ({}). retrying next cycle.",
                    e
                ));
                Ok(CycleOutcome::OrderFailed)
            }
            Err(e) => Err(e),
        }
    }

    fn snapshot(&self, candles: &[indicators::Candle]) -> Option<Snapshot> {
        let s = &self.settings;
        let cl = closes(candles);
        Some(Snapshot {
            close: candles.last()?.close,
            rsi: rsi(&cl, s.rsi_period)?,
            bands: bollinger_bands(&cl, s.bb_period, s.bb_std_dev)?,
            atr: atr(candles, s.atr_period)?,
        })
    }
}
