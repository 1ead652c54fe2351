use std::fmt;

use domain::{Price, Side};
use indicators::Bands;

/// Entry strategy that produced a signal
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Strategy {
    BbBreakout,
    RsiReversal,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::BbBreakout => f.write_str("BB Breakout"),
            Strategy::RsiReversal => f.write_str("RSI Reversal"),
        }
    }
}

/// Why a strategy did or did not fire (for logs)
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SignalReason {
    BreakoutAboveUpper,
    BreakoutBelowLower,
    NoSqueeze,
    InsideBands,
    RsiOversold,
    RsiOverbought,
    RsiNeutral,
}

impl fmt::Display for SignalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SignalReason::BreakoutAboveUpper => "close broke above the upper band",
            SignalReason::BreakoutBelowLower => "close broke below the lower band",
            SignalReason::NoSqueeze => "no squeeze",
            SignalReason::InsideBands => "squeezed, close inside the bands",
            SignalReason::RsiOversold => "RSI oversold",
            SignalReason::RsiOverbought => "RSI overbought",
            SignalReason::RsiNeutral => "RSI neutral",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SignalDecision {
    pub side: Option<Side>,
    pub reason: SignalReason,
}

/// Chosen entry
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct EntrySignal {
    pub side: Side,
    pub strategy: Strategy,
}

impl fmt::Display for EntrySignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dir = match self.side {
            Side::Buy => "Long",
            Side::Sell => "Short",
        };
        write!(f, "{} {}", self.strategy, dir)
    }
}

#[derive(Debug, Copy, Clone)]
pub struct RsiParams {
    pub oversold: f64,
    pub overbought: f64,
}

#[derive(Debug, Copy, Clone)]
pub struct SignalParams {
    pub use_bb_breakout: bool,
    pub use_rsi_reversal: bool,
    pub rsi: RsiParams,
}

/// Indicator values of the latest candle
#[derive(Debug, Copy, Clone)]
pub struct SignalInput {
    pub close: Price,
    pub rsi: f64,
    pub bands: Bands,
    /// band width was squeezed relative to its history
    pub squeezed: bool,
}

/// Mean reversion: buy oversold, sell overbought
pub fn rsi_reversal_decision(rsi: f64, params: RsiParams) -> SignalDecision {
    if rsi < params.oversold {
        return SignalDecision {
            side: Some(Side::Buy),
            reason: SignalReason::RsiOversold,
        };
    }

    if rsi > params.overbought {
        return SignalDecision {
            side: Some(Side::Sell),
            reason: SignalReason::RsiOverbought,
        };
    }

    SignalDecision {
        side: None,
        reason: SignalReason::RsiNeutral,
    }
}

/// Volatility breakout: close leaves the bands right after a squeeze
pub fn bb_breakout_decision(close: Price, bands: Bands, squeezed: bool) -> SignalDecision {
    if !squeezed {
        return SignalDecision {
            side: None,
            reason: SignalReason::NoSqueeze,
        };
    }

    if close.0 > bands.upper.0 {
        return SignalDecision {
            side: Some(Side::Buy),
            reason: SignalReason::BreakoutAboveUpper,
        };
    }

    if close.0 < bands.lower.0 {
        return SignalDecision {
            side: Some(Side::Sell),
            reason: SignalReason::BreakoutBelowLower,
        };
    }

    SignalDecision {
        side: None,
        reason: SignalReason::InsideBands,
    }
}

/// Decisions of the enabled strategies, breakout first
pub fn evaluate(input: SignalInput, params: SignalParams) -> Vec<(Strategy, SignalDecision)> {
    let mut out = Vec::with_capacity(2);
    if params.use_bb_breakout {
        out.push((
            Strategy::BbBreakout,
            bb_breakout_decision(input.close, input.bands, input.squeezed),
        ));
    }
    if params.use_rsi_reversal {
        out.push((
            Strategy::RsiReversal,
            rsi_reversal_decision(input.rsi, params.rsi),
        ));
    }
    out
}

/// First decision with a side, in evaluation order
pub fn first_entry(decisions: &[(Strategy, SignalDecision)]) -> Option<EntrySignal> {
    decisions.iter().find_map(|(strategy, d)| {
        d.side.map(|side| EntrySignal {
            side,
            strategy: *strategy,
        })
    })
}

/// Breakout has priority; RSI reversal is only consulted when nothing fired yet.
pub fn select_entry(input: SignalInput, params: SignalParams) -> Option<EntrySignal> {
    first_entry(&evaluate(input, params))
}
