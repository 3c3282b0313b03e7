use crate::indicators::indicator_trait::Indicator;
use sessionr_data::Bar;

/// Wilder RSI: simple averages over the first `period` deltas, then
/// smoothed incrementally.
#[derive(Debug)]
pub struct Rsi {
    period: usize,
    deltas_seen: usize,
    gain_sum: f64,
    loss_sum: f64,
    avg_gain: Option<f64>,
    avg_loss: Option<f64>,
    previous_close: Option<f64>,
    current_value: Option<f64>,
}

impl Rsi {
    pub fn new(period: usize) -> Self {
        Self {
            period: period.max(1),
            deltas_seen: 0,
            gain_sum: 0.0,
            loss_sum: 0.0,
            avg_gain: None,
            avg_loss: None,
            previous_close: None,
            current_value: None,
        }
    }

    fn rsi_from(avg_gain: f64, avg_loss: f64) -> f64 {
        if avg_loss == 0.0 {
            100.0
        } else if avg_gain == 0.0 {
            0.0
        } else {
            let rs = avg_gain / avg_loss;
            100.0 - (100.0 / (1.0 + rs))
        }
    }
}

impl Indicator for Rsi {
    fn name(&self) -> &str {
        "rsi"
    }

    fn warm_up_period(&self) -> usize {
        self.period + 1
    }

    fn update(&mut self, bar: &Bar) -> Option<f64> {
        let close = bar.close;
        let prev = match self.previous_close.replace(close) {
            Some(prev) => prev,
            None => return None,
        };

        let change = close - prev;
        let gain = change.max(0.0);
        let loss = (-change).max(0.0);
        self.deltas_seen += 1;

        match (self.avg_gain, self.avg_loss) {
            (Some(prev_gain), Some(prev_loss)) => {
                let avg_gain = (prev_gain * (self.period - 1) as f64 + gain) / self.period as f64;
                let avg_loss = (prev_loss * (self.period - 1) as f64 + loss) / self.period as f64;
                self.avg_gain = Some(avg_gain);
                self.avg_loss = Some(avg_loss);
                self.current_value = Some(Self::rsi_from(avg_gain, avg_loss));
            }
            _ => {
                self.gain_sum += gain;
                self.loss_sum += loss;
                if self.deltas_seen == self.period {
                    let avg_gain = self.gain_sum / self.period as f64;
                    let avg_loss = self.loss_sum / self.period as f64;
                    self.avg_gain = Some(avg_gain);
                    self.avg_loss = Some(avg_loss);
                    self.current_value = Some(Self::rsi_from(avg_gain, avg_loss));
                }
            }
        }

        self.current_value
    }

    fn current(&self) -> Option<f64> {
        self.current_value
    }

    fn reset(&mut self) {
        self.deltas_seen = 0;
        self.gain_sum = 0.0;
        self.loss_sum = 0.0;
        self.avg_gain = None;
        self.avg_loss = None;
        self.previous_close = None;
        self.current_value = None;
    }
}
