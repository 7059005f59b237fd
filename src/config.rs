use serde::Deserialize;

/// Crossover detection settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    pub ema_period: usize,
    /// Price-unit tolerance for the previous candle "touching" the EMA.
    pub touch_threshold: f64,
    /// Optional trend memory: refuse to re-enter in the direction of the last
    /// trade until an opposite cross resets it.
    pub require_trend_flip: bool,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            ema_period: 200,
            touch_threshold: 0.05, // 0.5 pips for XAUUSD
            require_trend_flip: false,
        }
    }
}

/// Stop-loss, take-profit, and sizing settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Price-unit buffer beyond the previous candle extreme.
    pub sl_buffer: f64,
    /// Cap on SL distance as a fraction of entry price.
    pub max_risk_fraction: f64,
    pub risk_reward_ratio: f64,
    /// Fraction of balance risked per trade.
    pub risk_pct: f64,
    pub min_lot: f64,
    pub max_lot: f64,
    pub lot_step: f64,
    /// Account-currency value of one price unit per lot.
    pub contract_value_factor: f64,
    pub commission_per_lot: f64,
    /// Full bid/ask spread in price units; entries fill half a spread away
    /// from the candle close.
    pub spread: f64,
    /// Candles of recent highs/lows considered for the swing TP override.
    pub swing_window: usize,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            sl_buffer: 0.05,
            max_risk_fraction: 0.01, // max 1% of entry at risk
            risk_reward_ratio: 1.5,
            risk_pct: 0.01,
            min_lot: 0.01,
            max_lot: 1.0,
            lot_step: 0.01,
            contract_value_factor: 100.0,
            commission_per_lot: 7.0,
            spread: 0.3,
            swing_window: 5,
        }
    }
}

/// Early-exit monitor tuning.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ObserverConfig {
    /// Candle body must exceed this fraction of entry price to count as a
    /// strong opposite-momentum candle.
    pub momentum_threshold: f64,
    pub stall_candles: usize,
    /// Stall fires when (max - min) < stall_fraction * mean over the window.
    pub stall_fraction: f64,
    /// Maximum candles a trade may stay open.
    pub max_trade_duration: u32,
    /// Unrealized profit fraction that arms the trailing stop.
    pub trailing_activation: f64,
    /// Trailing distance as a fraction of the tracked extreme.
    pub trailing_distance: f64,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            momentum_threshold: 0.001, // 0.1% of entry
            stall_candles: 10,
            stall_fraction: 0.001,
            max_trade_duration: 60,
            trailing_activation: 0.005, // 0.5% profit
            trailing_distance: 0.002,   // 0.2% off the extreme
        }
    }
}

/// Full engine configuration. One instance parametrizes one decision loop, so
/// several independent instruments/backtests can run without interference.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub engine: EngineSettings,
    pub strategy: StrategyConfig,
    pub risk: RiskConfig,
    pub observer: ObserverConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub symbol: String,
    pub cooldown_seconds: i64,
    pub initial_balance: f64,
    /// Where closed trades are appended (JSON lines). Empty disables the log.
    pub trade_log_path: String,
    /// Advisory status snapshot, overwritten per candle. Empty disables it.
    pub status_path: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            symbol: "XAUUSD".to_string(),
            cooldown_seconds: 60,
            initial_balance: 10_000.0,
            trade_log_path: "logs/trades.jsonl".to_string(),
            status_path: "logs/engine_status.json".to_string(),
        }
    }
}

impl EngineConfig {
    /// Layered load: optional `crossbot.toml`, then `CROSSBOT_*` environment
    /// overrides (e.g. `CROSSBOT_RISK__RISK_PCT=0.02`).
    pub fn load() -> anyhow::Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name("crossbot").required(false))
            .add_source(
                config::Environment::with_prefix("CROSSBOT")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.strategy.ema_period, 200);
        assert_eq!(cfg.strategy.touch_threshold, 0.05);
        assert_eq!(cfg.risk.risk_reward_ratio, 1.5);
        assert_eq!(cfg.risk.max_risk_fraction, 0.01);
        assert_eq!(cfg.observer.stall_candles, 10);
        assert_eq!(cfg.engine.cooldown_seconds, 60);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let cfg: EngineConfig = config::Config::builder()
            .add_source(config::File::from_str(
                "[strategy]\nema_period = 50\n[risk]\nrisk_pct = 0.02\n",
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(cfg.strategy.ema_period, 50);
        assert_eq!(cfg.risk.risk_pct, 0.02);
        // Untouched sections keep their defaults.
        assert_eq!(cfg.risk.risk_reward_ratio, 1.5);
        assert_eq!(cfg.observer.max_trade_duration, 60);
    }
}
