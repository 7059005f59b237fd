/// Streaming Exponential Moving Average.
///
/// Seeding convention: the running value is seeded with the **first** close
/// received, then updated with `ema = close * alpha + ema * (1 - alpha)` where
/// `alpha = 2 / (period + 1)`. The value is only exposed once at least
/// `period` closes have been observed; before that no signal may be derived
/// from it.
#[derive(Debug, Clone)]
pub struct Ema {
    period: usize,
    alpha: f64,
    value: Option<f64>,
    samples: usize,
}

impl Ema {
    pub fn new(period: usize) -> Self {
        assert!(period > 0, "EMA period must be positive");
        Self {
            period,
            alpha: 2.0 / (period as f64 + 1.0),
            value: None,
            samples: 0,
        }
    }

    /// Reconstruct a persisted EMA so a restarted loop reproduces the exact
    /// value stream a cold run over the same history would have produced.
    pub fn resume(period: usize, value: f64, samples: usize) -> Self {
        let mut ema = Self::new(period);
        ema.value = Some(value);
        ema.samples = samples;
        ema
    }

    /// Feed one close price. Returns the EMA only once warm-up is complete.
    pub fn update(&mut self, close: f64) -> Option<f64> {
        self.samples += 1;
        self.value = Some(match self.value {
            None => close,
            Some(prev) => close * self.alpha + prev * (1.0 - self.alpha),
        });
        self.current()
    }

    /// Current EMA value, `None` until warm-up completes.
    pub fn current(&self) -> Option<f64> {
        if self.is_warm() {
            self.value
        } else {
            None
        }
    }

    /// Running value regardless of warm-up, for persistence.
    pub fn raw_value(&self) -> Option<f64> {
        self.value
    }

    pub fn is_warm(&self) -> bool {
        self.samples >= self.period
    }

    pub fn samples_seen(&self) -> usize {
        self.samples
    }

    pub fn period(&self) -> usize {
        self.period
    }
}
