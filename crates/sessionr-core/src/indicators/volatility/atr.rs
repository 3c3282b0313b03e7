use crate::indicators::indicator_trait::Indicator;
use sessionr_data::Bar;

/// Wilder average true range.
#[derive(Debug)]
pub struct Atr {
    period: usize,
    ranges_seen: usize,
    tr_sum: f64,
    previous_close: Option<f64>,
    current_value: Option<f64>,
}

impl Atr {
    pub fn new(period: usize) -> Self {
        Self {
            period: period.max(1),
            ranges_seen: 0,
            tr_sum: 0.0,
            previous_close: None,
            current_value: None,
        }
    }

    fn true_range(bar: &Bar, previous_close: f64) -> f64 {
        let hl = bar.high - bar.low;
        let hc = (bar.high - previous_close).abs();
        let lc = (bar.low - previous_close).abs();
        hl.max(hc).max(lc)
    }
}

impl Indicator for Atr {
    fn name(&self) -> &str {
        "atr"
    }

    fn warm_up_period(&self) -> usize {
        self.period + 1
    }

    fn update(&mut self, bar: &Bar) -> Option<f64> {
        let prev_close = match self.previous_close.replace(bar.close) {
            Some(prev) => prev,
            None => return None,
        };

        let tr = Self::true_range(bar, prev_close);
        self.ranges_seen += 1;

        match self.current_value {
            Some(prev_atr) => {
                let atr = (prev_atr * (self.period - 1) as f64 + tr) / self.period as f64;
                self.current_value = Some(atr);
            }
            None => {
                self.tr_sum += tr;
                if self.ranges_seen == self.period {
                    self.current_value = Some(self.tr_sum / self.period as f64);
                }
            }
        }

        self.current_value
    }

    fn current(&self) -> Option<f64> {
        self.current_value
    }

    fn reset(&mut self) {
        self.ranges_seen = 0;
        self.tr_sum = 0.0;
        self.previous_close = None;
        self.current_value = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sessionr_data::Interval;

    fn bar(i: i64, high: f64, low: f64, close: f64) -> Bar {
        Bar::new("TEST", Interval::MIN_1, i * 60_000, close, high, low, close, 1_000)
    }

    #[test]
    fn test_atr_constant_range() {
        let mut atr = Atr::new(3);
        for i in 0..8 {
            atr.update(&bar(i, 101.0, 99.0, 100.0));
        }
        // Every true range is 2.0, so ATR converges to exactly 2.0.
        assert!((atr.current().unwrap() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_atr_warm_up() {
        let mut atr = Atr::new(3);
        assert_eq!(atr.update(&bar(0, 101.0, 99.0, 100.0)), None);
        assert_eq!(atr.update(&bar(1, 101.0, 99.0, 100.0)), None);
        assert_eq!(atr.update(&bar(2, 101.0, 99.0, 100.0)), None);
        assert!(atr.update(&bar(3, 101.0, 99.0, 100.0)).is_some());
    }

    #[test]
    fn test_atr_reacts_to_gaps() {
        let mut atr = Atr::new(3);
        for i in 0..4 {
            atr.update(&bar(i, 101.0, 99.0, 100.0));
        }
        let calm = atr.current().unwrap();

        // Gap: close 100 -> low 109 pushes true range to 10.
        atr.update(&bar(4, 111.0, 109.0, 110.0));
        assert!(atr.current().unwrap() > calm);
    }
}
