//! Bot handle shared by the control API and the background loop.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::{Mutex as AsyncMutex, broadcast, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use domain::{Position, Price};
use execution::{Exchange, ExchangeError};
use protocol::BotStatus;
use state_machine::cause::RunCause;
use state_machine::position_cause::PositionCause;
use state_machine::position_state::PositionState;
use state_machine::position_transition::position_transition;
use state_machine::state::RunState;
use state_machine::transition::run_transition;

use crate::config::Settings;
use crate::event::EngineEvent;
use crate::sink;
use crate::trade_log::TradeLog;
use crate::trader::{CycleOutcome, Trader};

#[derive(Debug, Default)]
struct Shared {
    run: RunState,
    position: PositionState,
    entry_price: Option<Price>,
}

pub struct Bot<E> {
    exchange: Arc<E>,
    trader: AsyncMutex<Trader<Arc<E>>>,
    log: TradeLog,
    cycle_interval: Duration,
    shared: Mutex<Shared>,
}

impl<E: Exchange + 'static> Bot<E> {
    pub fn new(exchange: E, settings: Settings, log: TradeLog) -> Self {
        let exchange = Arc::new(exchange);
        let cycle_interval = settings.cycle_interval;
        Self {
            trader: AsyncMutex::new(Trader::new(exchange.clone(), settings, log.clone())),
            exchange,
            log,
            cycle_interval,
            shared: Mutex::new(Shared::default()),
        }
    }

    pub fn exchange(&self) -> &E {
        &self.exchange
    }

    pub fn trade_log(&self) -> &TradeLog {
        &self.log
    }

    pub fn run_state(&self) -> RunState {
        self.lock().run
    }

    pub fn is_running(&self) -> bool {
        self.run_state().is_running()
    }

    pub fn start(&self) -> RunState {
        self.apply(RunCause::StartRequested, "✅ bot started")
    }

    pub fn stop(&self) -> RunState {
        self.apply(RunCause::StopRequested, "⏹️ bot stopped")
    }

    /// A repeated command leaves the state as is and logs nothing
    fn apply(&self, cause: RunCause, message: &str) -> RunState {
        let (from, next) = {
            let mut shared = self.lock();
            let from = shared.run;
            match run_transition(from, cause) {
                Ok(next) => {
                    shared.run = next;
                    (from, next)
                }
                Err(e) => {
                    debug!("ignored: {:?}", e);
                    return from;
                }
            }
        };

        self.log.push(message);
        sink::consume(vec![EngineEvent::RunTransition {
            from,
            cause,
            to: next,
        }]);
        next
    }

    /// Balance and position from the exchange, run state from the bot
    pub async fn status(&self) -> Result<BotStatus, ExchangeError> {
        let balance = self.exchange.balance().await?;
        let position = self.exchange.position().await?;
        self.sync_position(position.as_ref());

        let shared = self.lock();
        let position = match shared.position {
            PositionState::Flat => None,
            PositionState::Long => Some("long".to_string()),
            PositionState::Short => Some("short".to_string()),
        };

        Ok(BotStatus {
            running: shared.run.is_running(),
            balance: balance.0,
            position,
            entry_price: shared.entry_price.map(|p| p.0),
        })
    }

    pub fn logs(&self, limit: usize) -> Vec<String> {
        self.log.recent(limit)
    }

    pub fn subscribe_logs(&self) -> broadcast::Receiver<String> {
        self.log.subscribe()
    }

    /// Run one cycle now, regardless of the run state
    pub async fn cycle_once(&self) -> Result<CycleOutcome, ExchangeError> {
        let outcome = self.trader.lock().await.run_cycle().await?;

        let mut events = Vec::new();
        if let CycleOutcome::Entered { signal, .. } | CycleOutcome::Unprotected { signal, .. } =
            &outcome
        {
            events.push(EngineEvent::Entry(*signal));
            let position = self.exchange.position().await?;
            self.sync_position(position.as_ref());
        }
        events.push(EngineEvent::Cycle(outcome.clone()));
        sink::consume(events);

        Ok(outcome)
    }

    /// Cycle every `CYCLE_INTERVAL_SECS` while running, until `shutdown` flips
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.cycle_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("bot loop started, cycle every {:?}", self.cycle_interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if !self.is_running() {
                        continue;
                    }
                    if let Err(e) = self.cycle_once().await {
                        error!("cycle failed: {}", e);
                        self.log.push(format!("🔥 cycle error: {}", e));
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("bot loop stopped");
    }

    fn sync_position(&self, position: Option<&Position>) {
        let target = PositionState::from_position(position);
        let mut events = Vec::new();

        {
            let mut shared = self.lock();
            shared.entry_price = position.map(|p| p.entry_price);

            let mut state = shared.position;
            for cause in causes(state, target) {
                match position_transition(state, cause) {
                    Ok(next) => {
                        events.push(EngineEvent::PositionTransition {
                            from: state,
                            cause,
                            to: next,
                        });
                        state = next;
                    }
                    Err(e) => {
                        warn!("position resync: {:?}", e);
                        state = target;
                        break;
                    }
                }
            }
            shared.position = state;
        }

        sink::consume(events);
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Causes that walk `from` to `to`; a flip goes through flat
fn causes(from: PositionState, to: PositionState) -> Vec<PositionCause> {
    let filled = |s| match s {
        PositionState::Long => Some(PositionCause::LongFilled),
        PositionState::Short => Some(PositionCause::ShortFilled),
        PositionState::Flat => None,
    };

    if from == to {
        return Vec::new();
    }
    let mut out = Vec::new();
    if !from.is_flat() {
        out.push(PositionCause::Closed);
    }
    out.extend(filled(to));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;
    use domain::{Money, Qty, TimestampMs};
    use execution::{PaperExchange, ReplayFeed};
    use indicators::Candle;

    fn bot(balance: f64) -> Arc<Bot<PaperExchange<Arc<ReplayFeed>>>> {
        let candles = vec![Candle {
            ts: TimestampMs(0),
            open: Price(100.0),
            high: Price(100.0),
            low: Price(100.0),
            close: Price(100.0),
            volume: Qty(1.0),
        }];
        let paper = PaperExchange::new(Arc::new(ReplayFeed::new(candles)), Money(balance));
        let settings = Settings {
            cycle_interval: Duration::from_millis(10),
            order_settle: Duration::ZERO,
            ..Settings::default()
        };
        let log = TradeLog::new(200, FixedOffset::east_opt(0).unwrap());
        Arc::new(Bot::new(paper, settings, log))
    }

    #[test]
    fn start_and_stop_are_logged_once() {
        let b = bot(50.0);
        assert_eq!(b.start(), RunState::Running);
        assert_eq!(b.start(), RunState::Running);
        assert_eq!(b.stop(), RunState::Stopped);
        assert_eq!(b.stop(), RunState::Stopped);

        let logs = b.logs(100);
        assert_eq!(logs.len(), 2);
        assert!(logs[0].ends_with("✅ bot started"));
        assert!(logs[1].ends_with("⏹️ bot stopped"));
    }

    #[tokio::test]
    async fn status_reports_paper_account() {
        let b = bot(50.0);
        b.start();
        let s = b.status().await.unwrap();
        assert!(s.running);
        assert_eq!(s.balance, 50.0);
        assert_eq!(s.position, None);
        assert_eq!(s.entry_price, None);
    }

    #[tokio::test]
    async fn stopped_loop_does_not_trade_and_exits_on_shutdown() {
        let b = bot(50.0);
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(b.clone().run(rx));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(b.logs(100).is_empty());

        tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn running_loop_cycles() {
        let b = bot(50.0);
        b.start();
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(b.clone().run(rx));

        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        // one candle is too few for indicators, every cycle is skipped
        let logs = b.logs(200);
        assert!(logs.iter().any(|l| l.contains("🚀 starting a new cycle")));
        assert!(logs.iter().any(|l| l.contains("not enough candles")));
    }

    #[test]
    fn flips_go_through_flat() {
        assert!(causes(PositionState::Flat, PositionState::Flat).is_empty());
        assert_eq!(
            causes(PositionState::Flat, PositionState::Short),
            vec![PositionCause::ShortFilled]
        );
        assert_eq!(
            causes(PositionState::Long, PositionState::Short),
            vec![PositionCause::Closed, PositionCause::ShortFilled]
        );
        assert_eq!(
            causes(PositionState::Short, PositionState::Flat),
            vec![PositionCause::Closed]
        );
    }
}
