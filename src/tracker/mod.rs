use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Direction, ExitReason, TradeRecord};
use crate::persistence::TradeLog;

/// In-flight bookkeeping for the trade currently open.
#[derive(Debug, Clone)]
struct OpenTrade {
    trade_id: Uuid,
    direction: Direction,
    entry_price: f64,
    entry_time: DateTime<Utc>,
    stop_loss: f64,
    take_profit: f64,
    size: f64,
    candles_in_trade: u32,
    max_profit_pct: f64,
    max_loss_pct: f64,
}

/// Aggregate performance, recomputed on demand from the closed-trade set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Statistics {
    pub total_trades: usize,
    pub profitable_trades: usize,
    pub losing_trades: usize,
    pub win_rate: f64,
    pub total_pnl: f64,
    pub avg_pnl: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
    pub profit_factor: f64,
    pub expectancy: f64,
}

/// Records the lifecycle of every trade and aggregates outcomes.
///
/// `update_trade` is bookkeeping only; it never decides exits. Statistics are
/// pure functions of the stored records, with no running accumulators that
/// could drift from the log.
pub struct TradeTracker {
    contract_value_factor: f64,
    commission_per_lot: f64,
    open: Option<OpenTrade>,
    records: Vec<TradeRecord>,
    log: Option<TradeLog>,
    persistence_failures: u32,
}

impl TradeTracker {
    pub fn new(contract_value_factor: f64, commission_per_lot: f64) -> Self {
        Self {
            contract_value_factor,
            commission_per_lot,
            open: None,
            records: Vec::new(),
            log: None,
            persistence_failures: 0,
        }
    }

    /// Attach an append-only log; every closed trade is written through.
    pub fn with_log(mut self, log: TradeLog) -> Self {
        self.log = Some(log);
        self
    }

    #[allow(clippy::too_many_arguments)]
    pub fn start_trade(
        &mut self,
        trade_id: Uuid,
        direction: Direction,
        entry_price: f64,
        stop_loss: f64,
        take_profit: f64,
        size: f64,
        entry_time: DateTime<Utc>,
    ) {
        self.open = Some(OpenTrade {
            trade_id,
            direction,
            entry_price,
            entry_time,
            stop_loss,
            take_profit,
            size,
            candles_in_trade: 0,
            max_profit_pct: 0.0,
            max_loss_pct: 0.0,
        });
        tracing::info!(
            %trade_id,
            ?direction,
            entry_price,
            stop_loss,
            take_profit,
            size,
            "trade opened"
        );
    }

    fn pnl_at(&self, trade: &OpenTrade, price: f64) -> (f64, f64) {
        let diff = match trade.direction {
            Direction::Long => price - trade.entry_price,
            Direction::Short => trade.entry_price - price,
        };
        let pnl = diff * trade.size * self.contract_value_factor;
        let pnl_pct = diff / trade.entry_price * 100.0;
        (pnl, pnl_pct)
    }

    /// Refresh running pnl and extrema with the latest price. Side effect
    /// only; returns the running numbers for logging.
    pub fn update_trade(&mut self, price: f64, _time: DateTime<Utc>) -> Option<(f64, f64)> {
        let trade = self.open.as_ref()?;
        let (pnl, pnl_pct) = self.pnl_at(trade, price);

        let trade = self.open.as_mut()?;
        trade.candles_in_trade += 1;
        trade.max_profit_pct = trade.max_profit_pct.max(pnl_pct);
        trade.max_loss_pct = trade.max_loss_pct.min(pnl_pct);

        Some((pnl, pnl_pct))
    }

    /// Finalize the open trade into an append-only record.
    ///
    /// The trade is always closed in memory first; a failing log write is
    /// escalated (`error!` + failure counter) because it silently corrupts
    /// reported statistics, but it never re-opens the trade.
    pub fn close_trade(
        &mut self,
        exit_price: f64,
        exit_reason: ExitReason,
        exit_time: DateTime<Utc>,
    ) -> Option<TradeRecord> {
        let trade = self.open.take()?;
        let (pnl, pnl_pct) = self.pnl_at(&trade, exit_price);

        let risk = match trade.direction {
            Direction::Long => trade.entry_price - trade.stop_loss,
            Direction::Short => trade.stop_loss - trade.entry_price,
        };
        let reward_achieved = match trade.direction {
            Direction::Long => exit_price - trade.entry_price,
            Direction::Short => trade.entry_price - exit_price,
        };
        let risk_reward_achieved = if risk > 0.0 {
            reward_achieved / risk
        } else {
            0.0
        };

        let commission = self.commission_per_lot * trade.size;
        let swap = 0.0;
        let net_pnl = pnl - commission + swap;

        let record = TradeRecord {
            trade_id: trade.trade_id,
            entry_time: trade.entry_time,
            exit_time,
            duration_secs: (exit_time - trade.entry_time).num_seconds(),
            direction: trade.direction,
            entry_price: trade.entry_price,
            exit_price,
            stop_loss: trade.stop_loss,
            take_profit: trade.take_profit,
            exit_reason,
            pnl,
            pnl_pct,
            risk_reward_achieved,
            max_profit_pct: trade.max_profit_pct,
            max_loss_pct: trade.max_loss_pct,
            candles_in_trade: trade.candles_in_trade,
            position_size: trade.size,
            commission,
            swap,
            net_pnl,
        };

        tracing::info!(
            trade_id = %record.trade_id,
            exit_reason = %record.exit_reason,
            pnl = record.pnl,
            pnl_pct = record.pnl_pct,
            candles = record.candles_in_trade,
            "trade closed"
        );

        self.records.push(record.clone());

        if let Some(log) = self.log.as_mut() {
            if let Err(e) = log.append(&record) {
                self.persistence_failures += 1;
                tracing::error!(
                    trade_id = %record.trade_id,
                    error = %e,
                    "trade log write failed; statistics derived from the log are now incomplete"
                );
            }
        }

        Some(record)
    }

    pub fn has_open_trade(&self) -> bool {
        self.open.is_some()
    }

    pub fn records(&self) -> &[TradeRecord] {
        &self.records
    }

    pub fn persistence_failures(&self) -> u32 {
        self.persistence_failures
    }

    /// Recompute aggregate statistics from the full closed-trade set.
    pub fn statistics(&self) -> Statistics {
        Statistics::from_records(&self.records)
    }
}

impl Statistics {
    pub fn from_records(records: &[TradeRecord]) -> Self {
        let total_trades = records.len();
        if total_trades == 0 {
            return Self::empty();
        }

        let wins: Vec<&TradeRecord> = records.iter().filter(|r| r.pnl > 0.0).collect();
        let losses: Vec<&TradeRecord> = records.iter().filter(|r| r.pnl <= 0.0).collect();

        let win_rate = wins.len() as f64 / total_trades as f64 * 100.0;

        let total_pnl: f64 = records.iter().map(|r| r.pnl).sum();
        let avg_pnl = total_pnl / total_trades as f64;

        let gross_profit: f64 = wins.iter().map(|r| r.pnl).sum();
        let gross_loss: f64 = losses.iter().map(|r| r.pnl.abs()).sum();

        let avg_win = if wins.is_empty() {
            0.0
        } else {
            gross_profit / wins.len() as f64
        };
        let avg_loss = if losses.is_empty() {
            0.0
        } else {
            losses.iter().map(|r| r.pnl).sum::<f64>() / losses.len() as f64
        };

        let largest_win = records
            .iter()
            .map(|r| r.pnl)
            .fold(f64::NEG_INFINITY, f64::max)
            .max(0.0);
        let largest_loss = records
            .iter()
            .map(|r| r.pnl)
            .fold(f64::INFINITY, f64::min)
            .min(0.0);

        let profit_factor = if gross_loss > 0.0 {
            gross_profit / gross_loss
        } else if gross_profit > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };

        let win_frac = wins.len() as f64 / total_trades as f64;
        let loss_frac = losses.len() as f64 / total_trades as f64;
        let expectancy = win_frac * avg_win - loss_frac * avg_loss.abs();

        Self {
            total_trades,
            profitable_trades: wins.len(),
            losing_trades: losses.len(),
            win_rate,
            total_pnl,
            avg_pnl,
            avg_win,
            avg_loss,
            largest_win,
            largest_loss,
            profit_factor,
            expectancy,
        }
    }

    fn empty() -> Self {
        Self {
            total_trades: 0,
            profitable_trades: 0,
            losing_trades: 0,
            win_rate: 0.0,
            total_pnl: 0.0,
            avg_pnl: 0.0,
            avg_win: 0.0,
            avg_loss: 0.0,
            largest_win: 0.0,
            largest_loss: 0.0,
            profit_factor: 0.0,
            expectancy: 0.0,
        }
    }
}
