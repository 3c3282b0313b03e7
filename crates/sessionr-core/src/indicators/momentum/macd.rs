use crate::indicators::indicator_trait::Indicator;
use crate::indicators::trend::Ema;
use sessionr_data::Bar;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MacdOutput {
    pub macd: f64,
    pub signal: f64,
    pub histogram: f64,
}

#[derive(Debug)]
pub struct Macd {
    slow_period: usize,
    signal_period: usize,
    fast_ema: Ema,
    slow_ema: Ema,
    signal_ema: Ema,
    current_macd: Option<f64>,
    current_signal: Option<f64>,
}

impl Macd {
    pub fn new(fast_period: usize, slow_period: usize, signal_period: usize) -> Self {
        Self {
            slow_period,
            signal_period,
            fast_ema: Ema::new(fast_period),
            slow_ema: Ema::new(slow_period),
            signal_ema: Ema::new(signal_period),
            current_macd: None,
            current_signal: None,
        }
    }

    pub fn output(&self) -> Option<MacdOutput> {
        match (self.current_macd, self.current_signal) {
            (Some(macd), Some(signal)) => Some(MacdOutput {
                macd,
                signal,
                histogram: macd - signal,
            }),
            _ => None,
        }
    }
}

impl Indicator for Macd {
    fn name(&self) -> &str {
        "macd"
    }

    fn warm_up_period(&self) -> usize {
        self.slow_period + self.signal_period - 1
    }

    fn update(&mut self, bar: &Bar) -> Option<f64> {
        let fast = self.fast_ema.update_value(bar.close);
        let slow = self.slow_ema.update_value(bar.close);

        if let (Some(fast), Some(slow)) = (fast, slow) {
            let macd_line = fast - slow;
            self.current_macd = Some(macd_line);

            if let Some(signal) = self.signal_ema.update_value(macd_line) {
                self.current_signal = Some(signal);
                return Some(macd_line);
            }
        }

        None
    }

    fn current(&self) -> Option<f64> {
        self.output().map(|o| o.macd)
    }

    fn reset(&mut self) {
        self.fast_ema.reset();
        self.slow_ema.reset();
        self.signal_ema.reset();
        self.current_macd = None;
        self.current_signal = None;
    }
}
