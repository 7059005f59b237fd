use std::collections::BTreeMap;

use uuid::Uuid;

use crate::config::EngineConfig;
use crate::engine::{CandleFeed, DecisionLoop, OrderExecutor, OrderId};
use crate::models::{Candle, Direction, TradeRecord};
use crate::tracker::Statistics;

/// Replays a candle series into a feed.
pub struct VecFeed {
    candles: std::vec::IntoIter<Candle>,
}

impl VecFeed {
    pub fn new(candles: Vec<Candle>) -> Self {
        Self {
            candles: candles.into_iter(),
        }
    }
}

impl CandleFeed for VecFeed {
    fn next_candle(&mut self) -> Option<Candle> {
        self.candles.next()
    }
}

/// Frictionless venue: every order and close fills as requested.
#[derive(Default)]
pub struct SimulatedExecutor {
    orders_placed: usize,
    closes: usize,
}

impl SimulatedExecutor {
    pub fn orders_placed(&self) -> usize {
        self.orders_placed
    }

    pub fn positions_closed(&self) -> usize {
        self.closes
    }
}

impl OrderExecutor for SimulatedExecutor {
    fn place_order(
        &mut self,
        direction: Direction,
        price: f64,
        size: f64,
        stop_loss: f64,
        take_profit: f64,
    ) -> anyhow::Result<OrderId> {
        self.orders_placed += 1;
        tracing::debug!(?direction, price, size, stop_loss, take_profit, "simulated fill");
        Ok(Uuid::new_v4())
    }

    fn close_position(&mut self, _order_id: OrderId, exit_price: f64) -> anyhow::Result<()> {
        self.closes += 1;
        tracing::debug!(exit_price, "simulated close");
        Ok(())
    }
}

/// Outcome of one backtest run.
pub struct BacktestReport {
    pub initial_balance: f64,
    pub final_balance: f64,
    pub candles_processed: usize,
    pub statistics: Statistics,
    pub trades: Vec<TradeRecord>,
}

impl BacktestReport {
    pub fn return_pct(&self) -> f64 {
        (self.final_balance - self.initial_balance) / self.initial_balance * 100.0
    }

    /// Trade count per exit reason, for post-run analysis.
    pub fn exits_by_reason(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for trade in &self.trades {
            *counts.entry(trade.exit_reason.to_string()).or_insert(0) += 1;
        }
        counts
    }

    pub fn print_report(&self) {
        println!("\n╔═══════════════════════════════════════════════════════╗");
        println!("║              BACKTEST PERFORMANCE REPORT              ║");
        println!("╚═══════════════════════════════════════════════════════╝\n");

        println!("📊 P&L SUMMARY");
        println!("  Initial Balance:       ${:.2}", self.initial_balance);
        println!("  Final Balance:         ${:.2}", self.final_balance);
        println!(
            "  Net P&L:               ${:.2} ({:+.2}%)",
            self.final_balance - self.initial_balance,
            self.return_pct()
        );
        println!("  Candles Processed:     {}", self.candles_processed);

        let stats = &self.statistics;
        println!("\n📈 TRADE STATISTICS");
        println!("  Total Trades:          {}", stats.total_trades);
        println!(
            "  Winning Trades:        {} ({:.1}%)",
            stats.profitable_trades, stats.win_rate
        );
        println!("  Losing Trades:         {}", stats.losing_trades);

        if stats.total_trades > 0 {
            println!("\n💰 WIN/LOSS ANALYSIS");
            println!("  Average Win:           ${:.2}", stats.avg_win);
            println!("  Average Loss:          ${:.2}", stats.avg_loss);
            println!("  Largest Win:           ${:.2}", stats.largest_win);
            println!("  Largest Loss:          ${:.2}", stats.largest_loss);
            if stats.profit_factor.is_finite() {
                println!("  Profit Factor:         {:.2}", stats.profit_factor);
            } else {
                println!("  Profit Factor:         inf (no losing trades)");
            }
            println!("  Expectancy:            ${:.2}", stats.expectancy);

            println!("\n🚪 EXITS BY REASON");
            for (reason, count) in self.exits_by_reason() {
                println!("  {:<22} {}", reason, count);
            }
        }

        println!("\n═══════════════════════════════════════════════════════\n");
    }
}

/// Drives a `DecisionLoop` over historical candles with a simulated venue.
pub struct BacktestRunner {
    config: EngineConfig,
}

impl BacktestRunner {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn run(&self, candles: Vec<Candle>) -> BacktestReport {
        let candle_count = candles.len();
        let initial_balance = self.config.engine.initial_balance;

        let mut engine = DecisionLoop::new(self.config.clone(), SimulatedExecutor::default());
        let mut feed = VecFeed::new(candles);
        engine.run(&mut feed);

        BacktestReport {
            initial_balance,
            final_balance: engine.balance(),
            candles_processed: candle_count,
            statistics: engine.tracker().statistics(),
            trades: engine.tracker().records().to_vec(),
        }
    }
}
