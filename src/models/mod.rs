use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EngineError;

/// A closed OHLC candle as delivered by the data feed.
///
/// Immutable once produced. The `ema` field is populated by the decision loop
/// after the indicator update and stays `None` until warm-up completes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub ema: Option<f64>,
}

impl Candle {
    /// Sanity checks applied at the data-feed boundary. Anything failing here
    /// is discarded by the loop before it can touch engine state.
    pub fn validate(&self) -> Result<(), EngineError> {
        let fail = |reason: &str| EngineError::MalformedCandle {
            timestamp: self.timestamp.to_rfc3339(),
            reason: reason.to_string(),
        };

        if !(self.open.is_finite()
            && self.high.is_finite()
            && self.low.is_finite()
            && self.close.is_finite())
        {
            return Err(fail("non-finite price"));
        }
        if self.open <= 0.0 || self.high <= 0.0 || self.low <= 0.0 || self.close <= 0.0 {
            return Err(fail("non-positive price"));
        }
        if self.high < self.low {
            return Err(fail("high below low"));
        }
        if self.close > self.high || self.close < self.low {
            return Err(fail("close outside high/low range"));
        }
        if self.volume < 0.0 {
            return Err(fail("negative volume"));
        }
        Ok(())
    }
}

/// Trade direction (netting model: at most one open position).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Long,
    Short,
}

/// Entry signal produced by the crossover detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Signal {
    Buy,
    Sell,
    Hold,
}

/// Decision loop state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineState {
    Waiting,
    InTrade,
    Cooldown,
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineState::Waiting => write!(f, "WAITING"),
            EngineState::InTrade => write!(f, "IN_TRADE"),
            EngineState::Cooldown => write!(f, "COOLDOWN"),
        }
    }
}

/// Why a trade was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    EmaCrossback,
    OppositeMomentum,
    PriceStall,
    MaxDuration,
    TrailingStop,
    EndOfData,
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ExitReason::StopLoss => "SL hit",
            ExitReason::TakeProfit => "TP hit",
            ExitReason::EmaCrossback => "EMA crossback",
            ExitReason::OppositeMomentum => "Strong opposite momentum",
            ExitReason::PriceStall => "Price stalled",
            ExitReason::MaxDuration => "Max duration reached",
            ExitReason::TrailingStop => "Trailing stop hit",
            ExitReason::EndOfData => "End of data",
        };
        write!(f, "{s}")
    }
}

/// The single open trade, owned exclusively by the decision loop.
///
/// SL/TP are fixed at entry; the observer's trailing rule may propose exits
/// but never loosens these levels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: Uuid,
    pub direction: Direction,
    pub entry_price: f64,
    pub entry_time: DateTime<Utc>,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub size: f64,
    pub candles_in_trade: u32,
    pub highest_price_seen: f64,
    pub lowest_price_seen: f64,
    pub max_profit_pct: f64,
    pub max_loss_pct: f64,
}

impl Position {
    pub fn new(
        direction: Direction,
        entry_price: f64,
        entry_time: DateTime<Utc>,
        stop_loss: f64,
        take_profit: f64,
        size: f64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            direction,
            entry_price,
            entry_time,
            stop_loss,
            take_profit,
            size,
            candles_in_trade: 0,
            highest_price_seen: entry_price,
            lowest_price_seen: entry_price,
            max_profit_pct: 0.0,
            max_loss_pct: 0.0,
        }
    }

    /// Signed profit percentage at `price` for this position's direction.
    pub fn pnl_pct_at(&self, price: f64) -> f64 {
        match self.direction {
            Direction::Long => (price - self.entry_price) / self.entry_price * 100.0,
            Direction::Short => (self.entry_price - price) / self.entry_price * 100.0,
        }
    }

    /// Absorb one candle: extrema, candle count, running profit extremes.
    pub fn absorb_candle(&mut self, candle: &Candle) {
        self.candles_in_trade += 1;
        self.highest_price_seen = self.highest_price_seen.max(candle.high);
        self.lowest_price_seen = self.lowest_price_seen.min(candle.low);

        let pnl_pct = self.pnl_pct_at(candle.close);
        self.max_profit_pct = self.max_profit_pct.max(pnl_pct);
        self.max_loss_pct = self.max_loss_pct.min(pnl_pct);
    }
}

/// One closed trade, append-only once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub trade_id: Uuid,
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    pub duration_secs: i64,
    pub direction: Direction,
    pub entry_price: f64,
    pub exit_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub exit_reason: ExitReason,
    pub pnl: f64,
    pub pnl_pct: f64,
    pub risk_reward_achieved: f64,
    pub max_profit_pct: f64,
    pub max_loss_pct: f64,
    pub candles_in_trade: u32,
    pub position_size: f64,
    pub commission: f64,
    pub swap: f64,
    pub net_pnl: f64,
}
