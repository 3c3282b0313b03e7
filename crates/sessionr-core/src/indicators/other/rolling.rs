use crate::indicators::indicator_trait::Indicator;
use sessionr_data::Bar;
use std::collections::VecDeque;

/// Rolling highest high over the trailing window.
#[derive(Debug)]
pub struct RollingHigh {
    period: usize,
    window: VecDeque<f64>,
}

impl RollingHigh {
    pub fn new(period: usize) -> Self {
        Self {
            period: period.max(1),
            window: VecDeque::with_capacity(period.max(1)),
        }
    }
}

impl Indicator for RollingHigh {
    fn name(&self) -> &str {
        "rolling_high"
    }

    fn warm_up_period(&self) -> usize {
        self.period
    }

    fn update(&mut self, bar: &Bar) -> Option<f64> {
        self.window.push_back(bar.high);
        if self.window.len() > self.period {
            self.window.pop_front();
        }
        self.current()
    }

    fn current(&self) -> Option<f64> {
        if self.window.len() < self.period {
            return None;
        }
        self.window.iter().copied().reduce(f64::max)
    }

    fn reset(&mut self) {
        self.window.clear();
    }
}

/// Rolling lowest low over the trailing window.
#[derive(Debug)]
pub struct RollingLow {
    period: usize,
    window: VecDeque<f64>,
}

impl RollingLow {
    pub fn new(period: usize) -> Self {
        Self {
            period: period.max(1),
            window: VecDeque::with_capacity(period.max(1)),
        }
    }
}

impl Indicator for RollingLow {
    fn name(&self) -> &str {
        "rolling_low"
    }

    fn warm_up_period(&self) -> usize {
        self.period
    }

    fn update(&mut self, bar: &Bar) -> Option<f64> {
        self.window.push_back(bar.low);
        if self.window.len() > self.period {
            self.window.pop_front();
        }
        self.current()
    }

    fn current(&self) -> Option<f64> {
        if self.window.len() < self.period {
            return None;
        }
        self.window.iter().copied().reduce(f64::min)
    }

    fn reset(&mut self) {
        self.window.clear();
    }
}
