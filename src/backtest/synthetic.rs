use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::models::Candle;

/// Market scenario types for synthetic data generation
#[derive(Debug, Clone, Copy)]
pub enum MarketScenario {
    /// Steady uptrend with noise
    Uptrend,
    /// Steady downtrend with noise
    Downtrend,
    /// Sideways mean-reverting chop around the base price
    Sideways,
    /// High volatility, large swings in both directions
    Volatile,
    /// Downtrend that reverses into an uptrend, forcing EMA crosses
    TrendReversal,
}

/// Generates seeded synthetic candles for backtesting. Prices are scaled for
/// a gold-like instrument around 2050.
pub struct SyntheticDataGenerator {
    rng: StdRng,
    base_price: f64,
    base_volume: f64,
}

impl SyntheticDataGenerator {
    /// Create a new generator with a seed for reproducibility
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            base_price: 2050.0,
            base_volume: 1_000.0,
        }
    }

    /// Generate `num_candles` candles at `interval_minutes` spacing for the
    /// given scenario. 500+ candles are needed before the EMA(200) warms up.
    pub fn generate(
        &mut self,
        scenario: MarketScenario,
        num_candles: usize,
        interval_minutes: i64,
    ) -> Vec<Candle> {
        let start_time = Utc::now() - Duration::minutes(num_candles as i64 * interval_minutes);

        match scenario {
            MarketScenario::Uptrend => {
                self.generate_drift(start_time, num_candles, interval_minutes, 0.02)
            }
            MarketScenario::Downtrend => {
                self.generate_drift(start_time, num_candles, interval_minutes, -0.02)
            }
            MarketScenario::Sideways => {
                self.generate_sideways(start_time, num_candles, interval_minutes)
            }
            MarketScenario::Volatile => {
                self.generate_volatile(start_time, num_candles, interval_minutes)
            }
            MarketScenario::TrendReversal => {
                self.generate_reversal(start_time, num_candles, interval_minutes)
            }
        }
    }

    /// Trending walk: `daily_drift` per day plus ±0.05% noise per candle.
    fn generate_drift(
        &mut self,
        start_time: DateTime<Utc>,
        num_candles: usize,
        interval_minutes: i64,
        daily_drift: f64,
    ) -> Vec<Candle> {
        let mut candles = Vec::with_capacity(num_candles);
        let mut current_price = self.base_price;

        let drift_per_interval = daily_drift / (24.0 * 60.0 / interval_minutes as f64);

        for i in 0..num_candles {
            let timestamp = start_time + Duration::minutes(i as i64 * interval_minutes);

            let drift = current_price * drift_per_interval;
            let noise = current_price * self.rng.gen_range(-0.0005..0.0005);
            current_price += drift + noise;

            candles.push(self.create_candle(current_price, timestamp));
        }

        candles
    }

    /// Mean-reverting random walk around the base price.
    fn generate_sideways(
        &mut self,
        start_time: DateTime<Utc>,
        num_candles: usize,
        interval_minutes: i64,
    ) -> Vec<Candle> {
        let mut candles = Vec::with_capacity(num_candles);
        let mut current_price = self.base_price;
        let mean_price = self.base_price;

        for i in 0..num_candles {
            let timestamp = start_time + Duration::minutes(i as i64 * interval_minutes);

            let reversion = (mean_price - current_price) * 0.1;
            let noise = current_price * self.rng.gen_range(-0.002..0.002);
            current_price += reversion + noise;

            candles.push(self.create_candle(current_price, timestamp));
        }

        candles
    }

    fn generate_volatile(
        &mut self,
        start_time: DateTime<Utc>,
        num_candles: usize,
        interval_minutes: i64,
    ) -> Vec<Candle> {
        let mut candles = Vec::with_capacity(num_candles);
        let mut current_price = self.base_price;

        for i in 0..num_candles {
            let timestamp = start_time + Duration::minutes(i as i64 * interval_minutes);

            let change = current_price * self.rng.gen_range(-0.01..0.01);
            current_price += change;

            if current_price < self.base_price * 0.5 {
                current_price = self.base_price * 0.5;
            }

            candles.push(self.create_candle(current_price, timestamp));
        }

        candles
    }

    /// First half drifts down, second half drifts up. Price crossing back
    /// through the long EMA is what the strategy trades, so this scenario is
    /// the one guaranteed to produce entries.
    fn generate_reversal(
        &mut self,
        start_time: DateTime<Utc>,
        num_candles: usize,
        interval_minutes: i64,
    ) -> Vec<Candle> {
        let mut candles = Vec::with_capacity(num_candles);
        let mut current_price = self.base_price;

        let daily = 0.03 / (24.0 * 60.0 / interval_minutes as f64);

        for i in 0..num_candles {
            let timestamp = start_time + Duration::minutes(i as i64 * interval_minutes);

            let drift_sign = if i < num_candles / 2 { -1.0 } else { 1.0 };
            let drift = current_price * daily * drift_sign;
            let noise = current_price * self.rng.gen_range(-0.0005..0.0005);
            current_price += drift + noise;

            candles.push(self.create_candle(current_price, timestamp));
        }

        candles
    }

    /// Realistic OHLC around a close price, ±0.05% intrabar movement.
    fn create_candle(&mut self, price: f64, timestamp: DateTime<Utc>) -> Candle {
        let noise_pct = 0.0005;

        let high = price * (1.0 + self.rng.gen_range(0.0..noise_pct));
        let low = price * (1.0 - self.rng.gen_range(0.0..noise_pct));

        let open_raw = price * (1.0 + self.rng.gen_range(-noise_pct..noise_pct));
        let open = open_raw.clamp(low, high);

        let volume = self.base_volume * self.rng.gen_range(0.7..1.3);

        Candle {
            timestamp,
            open,
            high,
            low,
            close: price,
            volume,
            ema: None,
        }
    }
}
