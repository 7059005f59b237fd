// Entry signal detection

pub mod ema_cross;

pub use ema_cross::detect;
