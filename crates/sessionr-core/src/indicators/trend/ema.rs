use crate::indicators::indicator_trait::Indicator;
use sessionr_data::Bar;

/// Exponential moving average seeded with the simple average of the
/// first `period` values.
#[derive(Debug)]
pub struct Ema {
    period: usize,
    multiplier: f64,
    count: usize,
    seed_sum: f64,
    current_value: Option<f64>,
}

impl Ema {
    pub fn new(period: usize) -> Self {
        let period = period.max(1);
        Self {
            period,
            multiplier: 2.0 / (period as f64 + 1.0),
            count: 0,
            seed_sum: 0.0,
            current_value: None,
        }
    }

    /// Raw-value update, shared with composites (MACD signal line).
    pub fn update_value(&mut self, value: f64) -> Option<f64> {
        self.count += 1;

        if self.count < self.period {
            self.seed_sum += value;
            None
        } else if self.count == self.period {
            self.seed_sum += value;
            let seed = self.seed_sum / self.period as f64;
            self.current_value = Some(seed);
            Some(seed)
        } else {
            // current_value is always set once count > period
            let prev = self.current_value.unwrap_or(value);
            let next = (value - prev) * self.multiplier + prev;
            self.current_value = Some(next);
            Some(next)
        }
    }
}

impl Indicator for Ema {
    fn name(&self) -> &str {
        "ema"
    }

    fn warm_up_period(&self) -> usize {
        self.period
    }

    fn update(&mut self, bar: &Bar) -> Option<f64> {
        self.update_value(bar.close)
    }

    fn current(&self) -> Option<f64> {
        self.current_value
    }

    fn reset(&mut self) {
        self.count = 0;
        self.seed_sum = 0.0;
        self.current_value = None;
    }
}
