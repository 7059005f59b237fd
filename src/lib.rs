// Core modules
pub mod backtest;
pub mod config;
pub mod engine;
pub mod error;
pub mod indicators;
pub mod models;
pub mod observer;
pub mod persistence;
pub mod risk;
pub mod strategy;
pub mod tracker;

// Re-export commonly used types
pub use config::EngineConfig;
pub use engine::{CandleFeed, DecisionLoop, OrderExecutor, OrderId};
pub use error::{EngineError, Result};
pub use models::{Candle, Direction, EngineState, ExitReason, Position, Signal, TradeRecord};
