use std::collections::VecDeque;

use crate::config::ObserverConfig;
use crate::models::{Candle, Direction, ExitReason};

/// Early-exit recommendation for the open trade.
#[derive(Debug, Clone, PartialEq)]
pub struct ExitAdvice {
    pub exit_price: f64,
    pub reason: ExitReason,
}

#[derive(Debug)]
struct TrackedTrade {
    direction: Direction,
    entry_price: f64,
    highest_price: f64,
    lowest_price: f64,
    candles_in_trade: u32,
    max_profit_pct: f64,
    max_loss_pct: f64,
    closes: VecDeque<f64>,
}

/// Per-candle monitor of the open position, proposing exits beyond the hard
/// SL/TP levels. Reset on every new entry.
///
/// Checks run in fixed precedence, first match wins:
/// 1. EMA crossback
/// 2. Strong opposite-momentum candle
/// 3. Price stall over a full rolling window of closes
/// 4. Max trade duration
/// 5. Trailing stop (armed once profit reaches the activation threshold)
pub struct TradeObserver {
    config: ObserverConfig,
    trade: Option<TrackedTrade>,
}

impl TradeObserver {
    pub fn new(config: ObserverConfig) -> Self {
        Self {
            config,
            trade: None,
        }
    }

    /// Begin tracking a fresh trade, discarding any previous state.
    pub fn start(&mut self, direction: Direction, entry_price: f64) {
        self.trade = Some(TrackedTrade {
            direction,
            entry_price,
            highest_price: entry_price,
            lowest_price: entry_price,
            candles_in_trade: 0,
            max_profit_pct: 0.0,
            max_loss_pct: 0.0,
            closes: VecDeque::with_capacity(self.config.stall_candles),
        });
        tracing::debug!(
            direction = ?direction,
            entry_price,
            "observer tracking new trade"
        );
    }

    /// Drop the tracked trade once it is closed.
    pub fn stop(&mut self) {
        self.trade = None;
    }

    pub fn max_profit_pct(&self) -> f64 {
        self.trade.as_ref().map_or(0.0, |t| t.max_profit_pct)
    }

    pub fn max_loss_pct(&self) -> f64 {
        self.trade.as_ref().map_or(0.0, |t| t.max_loss_pct)
    }

    /// Feed one closed candle; returns advice when an exit condition fires.
    pub fn update(&mut self, candle: &Candle, ema: Option<f64>) -> Option<ExitAdvice> {
        let config = &self.config;
        let trade = self.trade.as_mut()?;

        trade.candles_in_trade += 1;
        trade.highest_price = trade.highest_price.max(candle.high);
        trade.lowest_price = trade.lowest_price.min(candle.low);

        let close = candle.close;
        let pnl_frac = match trade.direction {
            Direction::Long => (close - trade.entry_price) / trade.entry_price,
            Direction::Short => (trade.entry_price - close) / trade.entry_price,
        };
        trade.max_profit_pct = trade.max_profit_pct.max(pnl_frac * 100.0);
        trade.max_loss_pct = trade.max_loss_pct.min(pnl_frac * 100.0);

        if trade.closes.len() == config.stall_candles {
            trade.closes.pop_front();
        }
        trade.closes.push_back(close);

        let reason = Self::check_ema_crossback(trade, close, ema)
            .or_else(|| Self::check_opposite_momentum(trade, candle, config.momentum_threshold))
            .or_else(|| Self::check_price_stall(trade, config))
            .or_else(|| Self::check_max_duration(trade, config.max_trade_duration))
            .or_else(|| Self::check_trailing_stop(trade, close, pnl_frac, config))?;

        tracing::debug!(
            reason = %reason,
            candles_in_trade = trade.candles_in_trade,
            pnl_pct = pnl_frac * 100.0,
            "observer recommends exit"
        );

        Some(ExitAdvice {
            exit_price: close,
            reason,
        })
    }

    fn check_ema_crossback(trade: &TrackedTrade, close: f64, ema: Option<f64>) -> Option<ExitReason> {
        let ema = ema?;
        let crossed = match trade.direction {
            Direction::Long => close < ema,
            Direction::Short => close > ema,
        };
        crossed.then_some(ExitReason::EmaCrossback)
    }

    fn check_opposite_momentum(
        trade: &TrackedTrade,
        candle: &Candle,
        momentum_threshold: f64,
    ) -> Option<ExitReason> {
        let body = (candle.close - candle.open).abs();
        let range = candle.high - candle.low;
        if range <= 0.0 || body / range < 0.7 {
            return None;
        }

        let opposite = match trade.direction {
            Direction::Long => candle.close < candle.open,
            Direction::Short => candle.close > candle.open,
        };
        let strong = body > trade.entry_price * momentum_threshold;

        (opposite && strong).then_some(ExitReason::OppositeMomentum)
    }

    fn check_price_stall(trade: &TrackedTrade, config: &ObserverConfig) -> Option<ExitReason> {
        // Only meaningful once the window is full.
        if trade.closes.len() < config.stall_candles {
            return None;
        }

        let max = trade.closes.iter().cloned().fold(f64::MIN, f64::max);
        let min = trade.closes.iter().cloned().fold(f64::MAX, f64::min);
        let mean = trade.closes.iter().sum::<f64>() / trade.closes.len() as f64;
        if mean <= 0.0 {
            return None;
        }

        (max - min < config.stall_fraction * mean).then_some(ExitReason::PriceStall)
    }

    fn check_max_duration(trade: &TrackedTrade, max_trade_duration: u32) -> Option<ExitReason> {
        (trade.candles_in_trade >= max_trade_duration).then_some(ExitReason::MaxDuration)
    }

    fn check_trailing_stop(
        trade: &TrackedTrade,
        close: f64,
        pnl_frac: f64,
        config: &ObserverConfig,
    ) -> Option<ExitReason> {
        if pnl_frac < config.trailing_activation {
            return None;
        }

        let hit = match trade.direction {
            Direction::Long => {
                let level = trade.highest_price * (1.0 - config.trailing_distance);
                close <= level
            }
            Direction::Short => {
                let level = trade.lowest_price * (1.0 + config.trailing_distance);
                close >= level
            }
        };
        hit.then_some(ExitReason::TrailingStop)
    }
}
