use crate::indicators::indicator_trait::Indicator;
use sessionr_data::Bar;
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BollingerBands {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
}

/// Bollinger bands over a rolling close window. The scalar surface
/// reports the middle band; `bands()` exposes the full triple.
#[derive(Debug)]
pub struct Bollinger {
    period: usize,
    std_devs: f64,
    window: VecDeque<f64>,
    current: Option<BollingerBands>,
}

impl Bollinger {
    pub fn new(period: usize, std_devs: f64) -> Self {
        Self {
            period: period.max(2),
            std_devs,
            window: VecDeque::with_capacity(period.max(2)),
            current: None,
        }
    }

    pub fn bands(&self) -> Option<BollingerBands> {
        self.current
    }

    fn recompute(&mut self) {
        if self.window.len() < self.period {
            return;
        }
        let n = self.period as f64;
        let mean = self.window.iter().sum::<f64>() / n;
        let variance = self
            .window
            .iter()
            .map(|v| (v - mean) * (v - mean))
            .sum::<f64>()
            / n;
        let std_dev = variance.sqrt();

        self.current = Some(BollingerBands {
            upper: mean + self.std_devs * std_dev,
            middle: mean,
            lower: mean - self.std_devs * std_dev,
        });
    }
}

impl Indicator for Bollinger {
    fn name(&self) -> &str {
        "bollinger"
    }

    fn warm_up_period(&self) -> usize {
        self.period
    }

    fn update(&mut self, bar: &Bar) -> Option<f64> {
        self.window.push_back(bar.close);
        if self.window.len() > self.period {
            self.window.pop_front();
        }
        self.recompute();
        self.current()
    }

    fn current(&self) -> Option<f64> {
        self.current.map(|b| b.middle)
    }

    fn reset(&mut self) {
        self.window.clear();
        self.current = None;
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
    fn test_bands_order() {
        let mut bb = Bollinger::new(5, 2.0);
        for (i, close) in [10.0, 11.0, 9.0, 10.5, 10.0, 11.5].into_iter().enumerate() {
            bb.update(&bar(i as i64, close));
        }
        let bands = bb.bands().unwrap();
        assert!(bands.lower < bands.middle);
        assert!(bands.middle < bands.upper);
    }

    #[test]
    fn test_flat_series_collapses_bands() {
        let mut bb = Bollinger::new(4, 2.0);
        for i in 0..6 {
            bb.update(&bar(i, 50.0));
        }
        let bands = bb.bands().unwrap();
        assert_eq!(bands.upper, 50.0);
        assert_eq!(bands.middle, 50.0);
        assert_eq!(bands.lower, 50.0);
    }

    #[test]
    fn test_not_ready_during_warm_up() {
        let mut bb = Bollinger::new(5, 2.0);
        for i in 0..4 {
            assert_eq!(bb.update(&bar(i, 10.0 + i as f64)), None);
        }
        assert!(bb.update(&bar(4, 14.0)).is_some());
    }
}
