use crate::models::{Candle, Signal};

/// EMA crossover detection on closed candles.
///
/// BUY when the current candle closes above its EMA while the previous candle
/// closed at or below its EMA (within `touch_threshold`); SELL is the mirror.
/// The touch threshold treats a previous close that landed exactly on or a
/// hair inside the average as a valid pre-cross condition, so a candle sitting
/// on the line does not swallow the crossing.
///
/// Pure function: same candle pair, same result. Candles without an EMA value
/// (warm-up incomplete) always yield `Hold`.
pub fn detect(current: &Candle, previous: &Candle, touch_threshold: f64) -> Signal {
    let (Some(curr_ema), Some(prev_ema)) = (current.ema, previous.ema) else {
        return Signal::Hold;
    };

    if current.close > curr_ema && previous.close <= prev_ema + touch_threshold {
        Signal::Buy
    } else if current.close < curr_ema && previous.close >= prev_ema - touch_threshold {
        Signal::Sell
    } else {
        Signal::Hold
    }
}
