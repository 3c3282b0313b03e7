use crate::indicators::indicator_trait::Indicator;
use sessionr_data::Bar;

/// Volume-weighted average price, cumulative across the session.
/// Valid from the first bar with volume; `reset` at session roll
/// starts a fresh accumulation.
#[derive(Debug)]
pub struct Vwap {
    cumulative_pv: f64,
    cumulative_volume: f64,
    bars_seen: usize,
    current_value: Option<f64>,
}

impl Vwap {
    pub fn new() -> Self {
        Self {
            cumulative_pv: 0.0,
            cumulative_volume: 0.0,
            bars_seen: 0,
            current_value: None,
        }
    }
}

impl Default for Vwap {
    fn default() -> Self {
        Self::new()
    }
}

impl Indicator for Vwap {
    fn name(&self) -> &str {
        "vwap"
    }

    fn warm_up_period(&self) -> usize {
        1
    }

    fn update(&mut self, bar: &Bar) -> Option<f64> {
        self.bars_seen += 1;
        self.cumulative_pv += bar.typical_price() * bar.volume as f64;
        self.cumulative_volume += bar.volume as f64;

        if self.cumulative_volume > 0.0 {
            self.current_value = Some(self.cumulative_pv / self.cumulative_volume);
        }
        self.current_value
    }

    fn current(&self) -> Option<f64> {
        self.current_value
    }

    fn reset(&mut self) {
        self.cumulative_pv = 0.0;
        self.cumulative_volume = 0.0;
        self.bars_seen = 0;
        self.current_value = None;
    }
}
