use thiserror::Error;

/// Errors surfaced by the decision engine and its persistence layer.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("malformed candle at {timestamp}: {reason}")]
    MalformedCandle { timestamp: String, reason: String },

    #[error("data stream problem: {0}")]
    DataGap(String),

    #[error("indicator warm-up incomplete: {observed}/{required} samples")]
    WarmupIncomplete { observed: usize, required: usize },

    #[error("order rejected: {0}")]
    OrderRejected(String),

    #[error("persistence failure: {0}")]
    Persistence(#[from] std::io::Error),

    #[error("serialization failure: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
