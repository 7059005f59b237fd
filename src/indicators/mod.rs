// Streaming technical indicators

pub mod ema;

pub use ema::Ema;
