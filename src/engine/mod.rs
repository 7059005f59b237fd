use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::indicators::Ema;
use crate::models::{Candle, Direction, EngineState, ExitReason, Position, Signal};
use crate::observer::TradeObserver;
use crate::persistence::{StatusSnapshot, StatusWriter, TradeLog};
use crate::risk::RiskEngine;
use crate::strategy;
use crate::tracker::TradeTracker;

pub type OrderId = Uuid;

/// Source of closed candles. `None` means the stream has ended.
pub trait CandleFeed {
    fn next_candle(&mut self) -> Option<Candle>;
}

/// Execution venue boundary. The loop changes state only after the executor
/// confirms; a rejected order leaves the engine exactly where it was.
pub trait OrderExecutor {
    fn place_order(
        &mut self,
        direction: Direction,
        price: f64,
        size: f64,
        stop_loss: f64,
        take_profit: f64,
    ) -> anyhow::Result<OrderId>;

    fn close_position(&mut self, order_id: OrderId, exit_price: f64) -> anyhow::Result<()>;
}

/// The per-instrument decision state machine: WAITING -> IN_TRADE -> COOLDOWN.
///
/// All trading state lives here; construct several instances to run several
/// instruments side by side. The loop only ever sees closed candles, so a
/// signal present at candle close stays present.
pub struct DecisionLoop<E: OrderExecutor> {
    config: EngineConfig,
    executor: E,
    ema: Ema,
    risk: RiskEngine,
    observer: TradeObserver,
    tracker: TradeTracker,
    state: EngineState,
    position: Option<Position>,
    order_id: Option<OrderId>,
    balance: f64,
    prev_candle: Option<Candle>,
    last_timestamp: Option<DateTime<Utc>>,
    last_exit_time: Option<DateTime<Utc>>,
    /// Highs/lows of recent candles for the swing take-profit override.
    swings: VecDeque<(f64, f64)>,
    /// Direction of the last entry, used by the optional trend filter.
    last_trade_direction: Option<Direction>,
    status: Option<StatusWriter>,
}

impl<E: OrderExecutor> DecisionLoop<E> {
    pub fn new(config: EngineConfig, executor: E) -> Self {
        let balance = config.engine.initial_balance;
        Self {
            ema: Ema::new(config.strategy.ema_period),
            risk: RiskEngine::new(config.risk.clone()),
            observer: TradeObserver::new(config.observer.clone()),
            tracker: TradeTracker::new(
                config.risk.contract_value_factor,
                config.risk.commission_per_lot,
            ),
            state: EngineState::Waiting,
            position: None,
            order_id: None,
            balance,
            prev_candle: None,
            last_timestamp: None,
            last_exit_time: None,
            swings: VecDeque::with_capacity(config.risk.swing_window),
            last_trade_direction: None,
            status: None,
            config,
            executor,
        }
    }

    /// Route closed trades through a persistent log.
    pub fn with_trade_log(mut self, log: TradeLog) -> Self {
        self.tracker = self.tracker.with_log(log);
        self
    }

    /// Write an advisory status snapshot after every candle.
    pub fn with_status_writer(mut self, writer: StatusWriter) -> Self {
        self.status = Some(writer);
        self
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn balance(&self) -> f64 {
        self.balance
    }

    pub fn position(&self) -> Option<&Position> {
        self.position.as_ref()
    }

    pub fn ema_value(&self) -> Option<f64> {
        self.ema.current()
    }

    pub fn tracker(&self) -> &TradeTracker {
        &self.tracker
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Process one closed candle through the full decision sequence.
    ///
    /// Malformed or regressing candles are rejected by error without touching
    /// any state; a duplicate of the last candle is silently skipped.
    pub fn on_candle(&mut self, candle: Candle) -> Result<()> {
        candle.validate()?;

        if let Some(last) = self.last_timestamp {
            if candle.timestamp == last {
                tracing::warn!(timestamp = %candle.timestamp, "duplicate candle skipped");
                return Ok(());
            }
            if candle.timestamp < last {
                return Err(EngineError::DataGap(format!(
                    "candle {} arrived after {}",
                    candle.timestamp, last
                )));
            }
        }

        let mut candle = candle;
        candle.ema = self.ema.update(candle.close);

        if self.state == EngineState::InTrade {
            self.manage_open_trade(&candle)?;
        }

        if self.state == EngineState::Cooldown {
            self.check_cooldown(candle.timestamp);
        }

        if self.state == EngineState::Waiting {
            self.try_enter(&candle);
        }

        // Swing window and previous candle update last, so this candle only
        // influences decisions from the next one onward.
        if self.swings.len() == self.config.risk.swing_window {
            self.swings.pop_front();
        }
        self.swings.push_back((candle.high, candle.low));
        self.last_timestamp = Some(candle.timestamp);
        self.prev_candle = Some(candle.clone());

        self.write_status(&candle);
        Ok(())
    }

    /// Drain a feed to exhaustion. Bad candles are logged and dropped; any
    /// trade still open at the end is closed at the last known price.
    pub fn run(&mut self, feed: &mut dyn CandleFeed) {
        while let Some(candle) = feed.next_candle() {
            if let Err(e) = self.on_candle(candle) {
                tracing::warn!(error = %e, "candle rejected");
            }
        }
        self.close_out(ExitReason::EndOfData);
    }

    /// Force-close the open trade, if any, at the last candle's close.
    pub fn close_out(&mut self, reason: ExitReason) {
        let Some(prev) = self.prev_candle.clone() else {
            return;
        };
        if self.state == EngineState::InTrade {
            self.exit_trade(prev.close, reason, prev.timestamp);
        }
    }

    fn manage_open_trade(&mut self, candle: &Candle) -> Result<()> {
        let Some(position) = self.position.as_mut() else {
            return Err(EngineError::DataGap(
                "IN_TRADE with no position".to_string(),
            ));
        };

        position.absorb_candle(candle);
        let direction = position.direction;
        let stop_loss = position.stop_loss;
        let take_profit = position.take_profit;
        self.tracker.update_trade(candle.close, candle.timestamp);

        // Hard levels first, SL before TP when a candle spans both.
        let hard_exit = match direction {
            Direction::Long => {
                if candle.low <= stop_loss {
                    Some((stop_loss, ExitReason::StopLoss))
                } else if candle.high >= take_profit {
                    Some((take_profit, ExitReason::TakeProfit))
                } else {
                    None
                }
            }
            Direction::Short => {
                if candle.high >= stop_loss {
                    Some((stop_loss, ExitReason::StopLoss))
                } else if candle.low <= take_profit {
                    Some((take_profit, ExitReason::TakeProfit))
                } else {
                    None
                }
            }
        };

        if let Some((price, reason)) = hard_exit {
            self.exit_trade(price, reason, candle.timestamp);
            return Ok(());
        }

        if let Some(advice) = self.observer.update(candle, candle.ema) {
            self.exit_trade(advice.exit_price, advice.reason, candle.timestamp);
        }
        Ok(())
    }

    fn exit_trade(&mut self, exit_price: f64, reason: ExitReason, time: DateTime<Utc>) {
        let Some(order_id) = self.order_id else {
            return;
        };

        if let Err(e) = self.executor.close_position(order_id, exit_price) {
            tracing::error!(
                %order_id,
                error = %e,
                "close rejected, position stays open"
            );
            return;
        }

        if let Some(record) = self.tracker.close_trade(exit_price, reason, time) {
            self.balance += record.net_pnl;
            tracing::info!(
                reason = %reason,
                net_pnl = record.net_pnl,
                balance = self.balance,
                "position closed"
            );
        }

        self.observer.stop();
        self.position = None;
        self.order_id = None;
        self.last_exit_time = Some(time);
        self.state = EngineState::Cooldown;
    }

    fn check_cooldown(&mut self, now: DateTime<Utc>) {
        let Some(exit_time) = self.last_exit_time else {
            self.state = EngineState::Waiting;
            return;
        };
        if (now - exit_time).num_seconds() >= self.config.engine.cooldown_seconds {
            tracing::debug!("cooldown expired");
            self.state = EngineState::Waiting;
        }
    }

    fn try_enter(&mut self, candle: &Candle) {
        let Some(prev) = self.prev_candle.clone() else {
            return;
        };

        let signal = strategy::detect(candle, &prev, self.config.strategy.touch_threshold);
        let direction = match signal {
            Signal::Buy => Direction::Long,
            Signal::Sell => Direction::Short,
            Signal::Hold => return,
        };

        if self.config.strategy.require_trend_flip {
            match self.last_trade_direction {
                Some(last) if last == direction => {
                    tracing::debug!(?direction, "signal suppressed until trend flips");
                    return;
                }
                // An opposite cross resets the memory even if entry fails.
                Some(_) => self.last_trade_direction = None,
                None => {}
            }
        }

        // Entries fill half a spread against us.
        let half_spread = self.config.risk.spread / 2.0;
        let entry_price = match direction {
            Direction::Long => candle.close + half_spread,
            Direction::Short => candle.close - half_spread,
        };

        let stop_loss = self.risk.stop_loss(direction, entry_price, &prev);
        let swing = self.swing_target(direction);
        let take_profit = self.risk.take_profit(direction, entry_price, stop_loss, swing);
        let size = self.risk.position_size(self.balance, entry_price, stop_loss);

        match self
            .executor
            .place_order(direction, entry_price, size, stop_loss, take_profit)
        {
            Ok(order_id) => {
                let position = Position::new(
                    direction,
                    entry_price,
                    candle.timestamp,
                    stop_loss,
                    take_profit,
                    size,
                );
                self.tracker.start_trade(
                    position.id,
                    direction,
                    entry_price,
                    stop_loss,
                    take_profit,
                    size,
                    candle.timestamp,
                );
                self.observer.start(direction, entry_price);
                self.position = Some(position);
                self.order_id = Some(order_id);
                self.last_trade_direction = Some(direction);
                self.state = EngineState::InTrade;
                tracing::info!(
                    ?direction,
                    entry_price,
                    stop_loss,
                    take_profit,
                    size,
                    "position opened"
                );
            }
            Err(e) => {
                tracing::error!(?direction, error = %e, "order rejected");
            }
        }
    }

    /// Best recent swing extreme for the take-profit override: highest high
    /// for longs, lowest low for shorts.
    fn swing_target(&self, direction: Direction) -> Option<f64> {
        if self.swings.is_empty() {
            return None;
        }
        let target = match direction {
            Direction::Long => self
                .swings
                .iter()
                .map(|(high, _)| *high)
                .fold(f64::MIN, f64::max),
            Direction::Short => self
                .swings
                .iter()
                .map(|(_, low)| *low)
                .fold(f64::MAX, f64::min),
        };
        Some(target)
    }

    fn write_status(&self, candle: &Candle) {
        let Some(writer) = &self.status else {
            return;
        };
        let snapshot = StatusSnapshot {
            market: self.config.engine.symbol.clone(),
            state: self.state,
            ema: self.ema.current(),
            timestamp: candle.timestamp,
        };
        if let Err(e) = writer.write(&snapshot) {
            tracing::warn!(error = %e, "status snapshot write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    /// Executor that fills everything and remembers what it was asked.
    #[derive(Default)]
    struct RecordingExecutor {
        orders: Vec<(Direction, f64, f64, f64, f64)>,
        closes: Vec<(OrderId, f64)>,
        reject_orders: bool,
        reject_closes: bool,
    }

    impl OrderExecutor for RecordingExecutor {
        fn place_order(
            &mut self,
            direction: Direction,
            price: f64,
            size: f64,
            stop_loss: f64,
            take_profit: f64,
        ) -> anyhow::Result<OrderId> {
            if self.reject_orders {
                anyhow::bail!("venue offline");
            }
            self.orders.push((direction, price, size, stop_loss, take_profit));
            Ok(Uuid::new_v4())
        }

        fn close_position(&mut self, order_id: OrderId, exit_price: f64) -> anyhow::Result<()> {
            if self.reject_closes {
                anyhow::bail!("venue offline");
            }
            self.closes.push((order_id, exit_price));
            Ok(())
        }
    }

    fn ts(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 10 + minute / 60, minute % 60, 0)
            .unwrap()
    }

    fn candle_at(minute: u32, open: f64, high: f64, low: f64, close: f64) -> Candle {
        Candle {
            timestamp: ts(minute),
            open,
            high,
            low,
            close,
            volume: 100.0,
            ema: None,
        }
    }

    fn flat_candle(minute: u32, price: f64) -> Candle {
        candle_at(minute, price, price + 0.2, price - 0.2, price)
    }

    /// Short EMA period so tests reach warm-up fast; generous observer limits
    /// so only the condition under test fires.
    fn test_config() -> EngineConfig {
        let mut config = EngineConfig::default();
        config.strategy.ema_period = 3;
        config.risk.spread = 0.0;
        config.observer.max_trade_duration = 1000;
        config.observer.stall_candles = 1000;
        config.engine.cooldown_seconds = 120;
        config
    }

    fn engine(config: EngineConfig) -> DecisionLoop<RecordingExecutor> {
        DecisionLoop::new(config, RecordingExecutor::default())
    }

    /// Flat candles close exactly on the EMA: signal-neutral during warm-up,
    /// and the last one is a valid pre-cross setup for the next candle.
    fn warm_up(engine: &mut DecisionLoop<RecordingExecutor>, minutes: u32, price: f64) {
        for i in 0..minutes {
            engine.on_candle(flat_candle(i, price)).unwrap();
        }
    }

    #[test]
    fn test_no_entry_before_warmup() {
        let mut e = engine(test_config());

        e.on_candle(candle_at(0, 2050.0, 2051.0, 2049.0, 2050.0)).unwrap();
        e.on_candle(candle_at(1, 2050.0, 2056.0, 2049.5, 2055.0)).unwrap();

        assert_eq!(e.state(), EngineState::Waiting);
        assert!(e.executor.orders.is_empty());
    }

    #[test]
    fn test_buy_cross_opens_long() {
        let mut e = engine(test_config());
        warm_up(&mut e, 6, 2050.0);

        // Previous close sitting on the EMA, current decisively above.
        e.on_candle(candle_at(6, 2050.2, 2056.5, 2049.5, 2056.0)).unwrap();

        assert_eq!(e.state(), EngineState::InTrade);
        assert_eq!(e.executor.orders.len(), 1);
        let (direction, price, size, stop_loss, take_profit) = e.executor.orders[0];
        assert_eq!(direction, Direction::Long);
        assert_eq!(price, 2056.0);
        assert!(size >= 0.01);
        assert!(stop_loss < price);
        assert!(take_profit > price);
    }

    #[test]
    fn test_spread_shifts_entry_fill() {
        let mut config = test_config();
        config.risk.spread = 0.3;
        let mut e = engine(config);
        warm_up(&mut e, 6, 2050.0);

        e.on_candle(candle_at(6, 2050.2, 2056.5, 2049.5, 2056.0)).unwrap();

        let (_, price, ..) = e.executor.orders[0];
        assert!((price - 2056.15).abs() < 1e-9);
    }

    #[test]
    fn test_rejected_order_leaves_waiting() {
        let mut e = engine(test_config());
        e.executor.reject_orders = true;
        warm_up(&mut e, 6, 2050.0);

        e.on_candle(candle_at(6, 2050.2, 2056.5, 2049.5, 2056.0)).unwrap();

        assert_eq!(e.state(), EngineState::Waiting);
        assert!(e.position().is_none());
        assert_eq!(e.tracker().records().len(), 0);
    }

    fn open_long(e: &mut DecisionLoop<RecordingExecutor>) {
        warm_up(e, 6, 2050.0);
        e.on_candle(candle_at(6, 2050.2, 2056.5, 2049.5, 2056.0)).unwrap();
        assert_eq!(e.state(), EngineState::InTrade);
    }

    #[test]
    fn test_stop_loss_exit() {
        let mut e = engine(test_config());
        open_long(&mut e);
        let stop_loss = e.position().unwrap().stop_loss;

        // Candle trades straight through the stop.
        let sl_candle = candle_at(7, 2056.0, 2056.2, stop_loss - 1.0, stop_loss - 0.5);
        e.on_candle(sl_candle).unwrap();

        assert_eq!(e.state(), EngineState::Cooldown);
        let record = &e.tracker().records()[0];
        assert_eq!(record.exit_reason, ExitReason::StopLoss);
        // Filled at the stop level, not the candle close.
        assert!((record.exit_price - stop_loss).abs() < 1e-9);
        assert!(record.net_pnl < 0.0);
    }

    #[test]
    fn test_stop_loss_wins_over_take_profit_on_spanning_candle() {
        let mut e = engine(test_config());
        open_long(&mut e);
        let position = e.position().unwrap();
        let (stop_loss, take_profit) = (position.stop_loss, position.take_profit);

        // Candle covers both levels; the pessimistic fill is the stop.
        let wide = candle_at(7, 2056.0, take_profit + 1.0, stop_loss - 1.0, 2056.0);
        e.on_candle(wide).unwrap();

        assert_eq!(e.tracker().records()[0].exit_reason, ExitReason::StopLoss);
    }

    #[test]
    fn test_take_profit_exit() {
        let mut e = engine(test_config());
        open_long(&mut e);
        let take_profit = e.position().unwrap().take_profit;

        let tp_candle = candle_at(
            7,
            2056.0,
            take_profit + 0.5,
            2055.8,
            take_profit + 0.2,
        );
        e.on_candle(tp_candle).unwrap();

        let record = &e.tracker().records()[0];
        assert_eq!(record.exit_reason, ExitReason::TakeProfit);
        assert!((record.exit_price - take_profit).abs() < 1e-9);
        assert!(record.net_pnl > 0.0);
    }

    #[test]
    fn test_hard_stop_precedes_observer() {
        let mut e = engine(test_config());
        open_long(&mut e);
        let stop_loss = e.position().unwrap().stop_loss;

        // A crossback candle that also breaches the stop reports SL.
        let c = candle_at(7, 2056.0, 2056.1, stop_loss - 1.0, stop_loss - 0.8);
        e.on_candle(c).unwrap();

        assert_eq!(e.tracker().records()[0].exit_reason, ExitReason::StopLoss);
    }

    #[test]
    fn test_observer_crossback_exit() {
        let mut e = engine(test_config());
        open_long(&mut e);

        // Close back under the EMA without touching the stop; slim body so
        // the momentum check stays quiet.
        let ema = e.ema_value().unwrap();
        let close = ema - 0.1;
        let c = candle_at(7, close + 0.1, close + 1.0, close - 0.05, close);
        e.on_candle(c).unwrap();

        assert_eq!(e.state(), EngineState::Cooldown);
        assert_eq!(e.tracker().records()[0].exit_reason, ExitReason::EmaCrossback);
    }

    #[test]
    fn test_rejected_close_keeps_position() {
        let mut e = engine(test_config());
        open_long(&mut e);
        e.executor.reject_closes = true;
        let stop_loss = e.position().unwrap().stop_loss;

        let c = candle_at(7, 2056.0, 2056.2, stop_loss - 1.0, stop_loss - 0.5);
        e.on_candle(c).unwrap();

        assert_eq!(e.state(), EngineState::InTrade);
        assert!(e.position().is_some());
        assert!(e.tracker().records().is_empty());

        // Venue recovers; the next breach closes normally.
        e.executor.reject_closes = false;
        let c = candle_at(8, stop_loss, stop_loss + 0.1, stop_loss - 1.0, stop_loss - 0.5);
        e.on_candle(c).unwrap();
        assert_eq!(e.state(), EngineState::Cooldown);
    }

    #[test]
    fn test_cooldown_blocks_reentry() {
        let mut e = engine(test_config());
        open_long(&mut e);
        let stop_loss = e.position().unwrap().stop_loss;
        e.on_candle(candle_at(7, 2056.0, 2056.2, stop_loss - 1.0, stop_loss - 0.5))
            .unwrap();
        assert_eq!(e.state(), EngineState::Cooldown);

        // A fresh buy cross one minute after the exit: still cooling down.
        e.on_candle(candle_at(8, 2048.5, 2057.0, 2048.0, 2056.5)).unwrap();
        assert_eq!(e.state(), EngineState::Cooldown);
        assert_eq!(e.executor.orders.len(), 1);

        // Two minutes past the exit the cooldown has lapsed; this flat candle
        // carries no signal so the engine just waits.
        e.on_candle(candle_at(9, 2056.5, 2057.0, 2056.0, 2056.6)).unwrap();
        assert_eq!(e.state(), EngineState::Waiting);
        assert_eq!(e.executor.orders.len(), 1);
    }

    #[test]
    fn test_duplicate_candle_skipped() {
        let mut e = engine(test_config());
        let c = flat_candle(0, 2050.0);
        e.on_candle(c.clone()).unwrap();
        e.on_candle(c).unwrap();
        assert_eq!(e.ema.samples_seen(), 1);
    }

    #[test]
    fn test_out_of_order_candle_rejected() {
        let mut e = engine(test_config());
        e.on_candle(flat_candle(5, 2050.0)).unwrap();
        let err = e.on_candle(flat_candle(3, 2050.0)).unwrap_err();
        assert!(matches!(err, EngineError::DataGap(_)));
    }

    #[test]
    fn test_malformed_candle_rejected_without_state_change() {
        let mut e = engine(test_config());
        e.on_candle(flat_candle(0, 2050.0)).unwrap();

        let bad = candle_at(1, 2050.0, 2049.0, 2051.0, 2050.0);
        assert!(e.on_candle(bad).is_err());
        assert_eq!(e.ema.samples_seen(), 1);
        assert_eq!(e.state(), EngineState::Waiting);
    }

    #[test]
    fn test_trend_filter_suppresses_same_direction() {
        let mut config = test_config();
        config.strategy.require_trend_flip = true;
        config.engine.cooldown_seconds = 60;
        let mut e = engine(config);
        open_long(&mut e);

        let stop_loss = e.position().unwrap().stop_loss;
        e.on_candle(candle_at(7, 2056.0, 2056.2, stop_loss - 1.0, stop_loss - 0.5))
            .unwrap();
        assert_eq!(e.state(), EngineState::Cooldown);

        // Cooldown has lapsed and a fresh buy cross forms, but the filter
        // refuses another long until a sell cross resets the memory.
        e.on_candle(candle_at(8, 2048.5, 2057.0, 2048.0, 2056.5)).unwrap();
        assert_eq!(e.executor.orders.len(), 1);
        assert_eq!(e.state(), EngineState::Waiting);
    }

    #[test]
    fn test_close_out_at_end_of_data() {
        let mut e = engine(test_config());
        open_long(&mut e);

        e.close_out(ExitReason::EndOfData);
        assert_eq!(e.state(), EngineState::Cooldown);
        assert_eq!(e.tracker().records()[0].exit_reason, ExitReason::EndOfData);
    }

    #[test]
    fn test_balance_tracks_net_pnl() {
        let mut e = engine(test_config());
        let initial = e.balance();
        open_long(&mut e);
        let take_profit = e.position().unwrap().take_profit;

        e.on_candle(candle_at(7, 2056.0, take_profit + 0.5, 2055.8, take_profit + 0.2))
            .unwrap();

        let record = &e.tracker().records()[0];
        assert!((e.balance() - (initial + record.net_pnl)).abs() < 1e-9);
    }
}
