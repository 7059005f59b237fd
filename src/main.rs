use clap::{Parser, Subcommand, ValueEnum};
use tokio::time::Duration;

use crossbot::backtest::{
    BacktestReport, BacktestRunner, MarketScenario, SimulatedExecutor, SyntheticDataGenerator,
};
use crossbot::config::EngineConfig;
use crossbot::engine::DecisionLoop;
use crossbot::models::ExitReason;
use crossbot::persistence::{StatusWriter, TradeLog};

#[derive(Parser)]
#[command(name = "crossbot", about = "EMA(200) crossover decision engine", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Scenario {
    Uptrend,
    Downtrend,
    Sideways,
    Volatile,
    TrendReversal,
}

impl From<Scenario> for MarketScenario {
    fn from(s: Scenario) -> Self {
        match s {
            Scenario::Uptrend => MarketScenario::Uptrend,
            Scenario::Downtrend => MarketScenario::Downtrend,
            Scenario::Sideways => MarketScenario::Sideways,
            Scenario::Volatile => MarketScenario::Volatile,
            Scenario::TrendReversal => MarketScenario::TrendReversal,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Run the decision loop over synthetic history and print a report
    Backtest {
        #[arg(long, value_enum, default_value_t = Scenario::TrendReversal)]
        scenario: Scenario,
        #[arg(long, default_value_t = 2000)]
        candles: usize,
        #[arg(long, default_value_t = 42)]
        seed: u64,
        #[arg(long, default_value_t = 1)]
        interval_minutes: i64,
    },
    /// Paper-trade a simulated feed in real time until Ctrl+C
    Paper {
        #[arg(long, value_enum, default_value_t = Scenario::TrendReversal)]
        scenario: Scenario,
        #[arg(long, default_value_t = 42)]
        seed: u64,
        /// Seconds between simulated candles
        #[arg(long, default_value_t = 1)]
        interval_secs: u64,
        #[arg(long, default_value_t = 2000)]
        candles: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let cli = Cli::parse();
    let config = EngineConfig::load()?;

    match cli.command {
        Command::Backtest {
            scenario,
            candles,
            seed,
            interval_minutes,
        } => {
            tracing::info!(?scenario, candles, seed, "starting backtest");
            let data = SyntheticDataGenerator::new(seed).generate(
                scenario.into(),
                candles,
                interval_minutes,
            );
            let report = BacktestRunner::new(config).run(data);
            report.print_report();
        }
        Command::Paper {
            scenario,
            seed,
            interval_secs,
            candles,
        } => {
            run_paper(config, scenario.into(), seed, interval_secs, candles).await?;
        }
    }

    Ok(())
}

async fn run_paper(
    config: EngineConfig,
    scenario: MarketScenario,
    seed: u64,
    interval_secs: u64,
    num_candles: usize,
) -> anyhow::Result<()> {
    let initial_balance = config.engine.initial_balance;
    let mut engine = DecisionLoop::new(config.clone(), SimulatedExecutor::default());

    if !config.engine.trade_log_path.is_empty() {
        engine = engine.with_trade_log(TradeLog::open(&config.engine.trade_log_path)?);
    }
    if !config.engine.status_path.is_empty() {
        engine = engine.with_status_writer(StatusWriter::new(&config.engine.status_path));
    }

    tracing::info!(
        symbol = %config.engine.symbol,
        interval_secs,
        "paper trading started, press Ctrl+C to stop"
    );

    let series = SyntheticDataGenerator::new(seed).generate(scenario, num_candles, 1);
    let mut feed = series.into_iter();
    let mut processed = 0usize;
    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("received Ctrl+C, shutting down");
                break;
            }
            _ = ticker.tick() => {
                match feed.next() {
                    Some(candle) => {
                        if let Err(e) = engine.on_candle(candle) {
                            tracing::warn!(error = %e, "candle rejected");
                        }
                        processed += 1;
                    }
                    None => {
                        tracing::info!("feed exhausted");
                        break;
                    }
                }
            }
        }
    }

    engine.close_out(ExitReason::EndOfData);

    let report = BacktestReport {
        initial_balance,
        final_balance: engine.balance(),
        candles_processed: processed,
        statistics: engine.tracker().statistics(),
        trades: engine.tracker().records().to_vec(),
    };
    report.print_report();

    Ok(())
}

fn setup_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "crossbot=info".into()),
        )
        .init();
}
