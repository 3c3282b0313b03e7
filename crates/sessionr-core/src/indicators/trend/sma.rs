use crate::indicators::indicator_trait::Indicator;
use sessionr_data::Bar;
use std::collections::VecDeque;

#[derive(Debug)]
pub struct Sma {
    period: usize,
    window: VecDeque<f64>,
    sum: f64,
    current_value: Option<f64>,
}

impl Sma {
    pub fn new(period: usize) -> Self {
        Self {
            period: period.max(1),
            window: VecDeque::with_capacity(period.max(1)),
            sum: 0.0,
            current_value: None,
        }
    }
}

impl Indicator for Sma {
    fn name(&self) -> &str {
        "sma"
    }

    fn warm_up_period(&self) -> usize {
        self.period
    }

    fn update(&mut self, bar: &Bar) -> Option<f64> {
        self.window.push_back(bar.close);
        self.sum += bar.close;

        if self.window.len() > self.period {
            if let Some(dropped) = self.window.pop_front() {
                self.sum -= dropped;
            }
        }

        if self.window.len() == self.period {
            self.current_value = Some(self.sum / self.period as f64);
        }

        self.current_value
    }

    fn current(&self) -> Option<f64> {
        self.current_value
    }

    fn reset(&mut self) {
        self.window.clear();
        self.sum = 0.0;
        self.current_value = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sessionr_data::Interval;

    fn bar(i: i64, close: f64) -> Bar {
        Bar::new("TEST", Interval::MIN_1, i * 60_000, close, close, close, close, 1_000)
    }

    #[test]
    fn test_sma_warm_up() {
        let mut sma = Sma::new(3);
        assert_eq!(sma.update(&bar(0, 1.0)), None);
        assert_eq!(sma.update(&bar(1, 2.0)), None);
        assert_eq!(sma.update(&bar(2, 3.0)), Some(2.0));
        assert!(sma.is_ready());
    }

    #[test]
    fn test_sma_rolls_window() {
        let mut sma = Sma::new(3);
        for (i, close) in [1.0, 2.0, 3.0, 4.0].into_iter().enumerate() {
            sma.update(&bar(i as i64, close));
        }
        assert_eq!(sma.current(), Some(3.0));
    }

    #[test]
    fn test_sma_reset() {
        let mut sma = Sma::new(2);
        sma.update(&bar(0, 1.0));
        sma.update(&bar(1, 2.0));
        assert!(sma.is_ready());

        sma.reset();
        assert!(!sma.is_ready());
        assert_eq!(sma.current(), None);
    }
}
