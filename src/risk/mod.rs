use crate::config::RiskConfig;
use crate::models::{Candle, Direction};

/// Stop-loss, take-profit, and position sizing.
///
/// Levels follow the previous candle: SL sits a buffer beyond its extreme,
/// clamped so the risked distance never exceeds `max_risk_fraction` of entry.
/// TP starts from the risk-reward target and may be replaced by a recent swing
/// extreme only when that strictly lengthens the reward.
pub struct RiskEngine {
    config: RiskConfig,
}

impl RiskEngine {
    pub fn new(config: RiskConfig) -> Self {
        Self { config }
    }

    /// SL for a trade entered at `entry` after `previous` closed.
    pub fn stop_loss(&self, direction: Direction, entry: f64, previous: &Candle) -> f64 {
        let max_distance = entry * self.config.max_risk_fraction;

        match direction {
            Direction::Long => {
                let sl = previous.low - self.config.sl_buffer;
                if entry - sl > max_distance {
                    entry - max_distance
                } else {
                    sl
                }
            }
            Direction::Short => {
                let sl = previous.high + self.config.sl_buffer;
                if sl - entry > max_distance {
                    entry + max_distance
                } else {
                    sl
                }
            }
        }
    }

    /// TP from the risk-reward target, with a monotonic swing override: a
    /// swing extreme replaces the base target only when strictly better.
    pub fn take_profit(
        &self,
        direction: Direction,
        entry: f64,
        stop_loss: f64,
        swing: Option<f64>,
    ) -> f64 {
        let risk = (entry - stop_loss).abs();

        match direction {
            Direction::Long => {
                let base = entry + risk * self.config.risk_reward_ratio;
                match swing {
                    Some(s) if s > base => s,
                    _ => base,
                }
            }
            Direction::Short => {
                let base = entry - risk * self.config.risk_reward_ratio;
                match swing {
                    Some(s) if s < base => s,
                    _ => base,
                }
            }
        }
    }

    /// Lot size risking `risk_pct` of balance to the stop, clamped to the
    /// instrument's lot limits and rounded down to the lot step. A degenerate
    /// (zero or negative) price risk falls back to the minimum lot.
    pub fn position_size(&self, balance: f64, entry: f64, stop_loss: f64) -> f64 {
        let price_risk = (entry - stop_loss).abs();
        if price_risk <= 0.0 {
            return self.config.min_lot;
        }

        let risk_amount = balance * self.config.risk_pct;
        let raw = risk_amount / (price_risk * self.config.contract_value_factor);

        let clamped = raw.clamp(self.config.min_lot, self.config.max_lot);
        let steps = (clamped / self.config.lot_step).floor();
        (steps * self.config.lot_step).max(self.config.min_lot)
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn engine() -> RiskEngine {
        RiskEngine::new(RiskConfig::default())
    }

    fn candle(high: f64, low: f64) -> Candle {
        Candle {
            timestamp: Utc::now(),
            open: (high + low) / 2.0,
            high,
            low,
            close: (high + low) / 2.0,
            volume: 100.0,
            ema: None,
        }
    }

    #[test]
    fn test_buy_stop_loss_below_previous_low() {
        // Worked example: prev low 2048.5, buffer 0.05 -> SL 2048.45.
        let sl = engine().stop_loss(Direction::Long, 2050.0, &candle(2051.5, 2048.5));
        assert!((sl - 2048.45).abs() < 1e-9);
    }

    #[test]
    fn test_sell_stop_loss_above_previous_high() {
        let sl = engine().stop_loss(Direction::Short, 2050.0, &candle(2051.5, 2048.5));
        assert!((sl - 2051.55).abs() < 1e-9);
    }

    #[test]
    fn test_stop_loss_clamped_to_max_risk() {
        // Previous low 40 points away; 1% of 2050 = 20.5 caps the distance.
        let sl = engine().stop_loss(Direction::Long, 2050.0, &candle(2051.0, 2010.0));
        assert!((sl - (2050.0 - 20.5)).abs() < 1e-9);

        let sl = engine().stop_loss(Direction::Short, 2050.0, &candle(2090.0, 2049.0));
        assert!((sl - (2050.0 + 20.5)).abs() < 1e-9);
    }

    #[test]
    fn test_take_profit_base_target() {
        // risk 1.55, RR 1.5 -> 2050 + 2.325 = 2052.325
        let tp = engine().take_profit(Direction::Long, 2050.0, 2048.45, None);
        assert!((tp - 2052.325).abs() < 1e-9);
    }

    #[test]
    fn test_swing_override_only_improves() {
        let e = engine();

        // Swing above the base target: used.
        let tp = e.take_profit(Direction::Long, 2050.0, 2048.45, Some(2055.0));
        assert!((tp - 2055.0).abs() < 1e-9);

        // Swing below the base target: ignored.
        let tp = e.take_profit(Direction::Long, 2050.0, 2048.45, Some(2051.0));
        assert!((tp - 2052.325).abs() < 1e-9);

        // Short mirror: lower swing is better.
        let tp = e.take_profit(Direction::Short, 2050.0, 2051.55, Some(2040.0));
        assert!((tp - 2040.0).abs() < 1e-9);
        let tp = e.take_profit(Direction::Short, 2050.0, 2051.55, Some(2049.0));
        assert!((tp - (2050.0 - 1.55 * 1.5)).abs() < 1e-9);
    }

    #[test]
    fn test_position_size_risks_fixed_fraction() {
        // 10k balance, 1% risk = $100; risk 1.55 * factor 100 = $155/lot.
        // 100/155 = 0.645 -> floored to 0.64 lots.
        let size = engine().position_size(10_000.0, 2050.0, 2048.45);
        assert!((size - 0.64).abs() < 1e-9);
    }

    #[test]
    fn test_position_size_clamps() {
        let e = engine();

        // Tiny balance: below min lot, clamped up.
        assert_eq!(e.position_size(10.0, 2050.0, 2048.45), 0.01);

        // Tiny risk distance: huge raw size, clamped to max lot.
        assert_eq!(e.position_size(100_000.0, 2050.0, 2049.99), 1.0);
    }

    #[test]
    fn test_zero_price_risk_returns_min_lot() {
        assert_eq!(engine().position_size(10_000.0, 2050.0, 2050.0), 0.01);
    }
}
