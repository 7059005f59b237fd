pub mod runner;
pub mod synthetic;

pub use runner::{BacktestReport, BacktestRunner, SimulatedExecutor, VecFeed};
pub use synthetic::{MarketScenario, SyntheticDataGenerator};
