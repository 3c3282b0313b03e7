use crate::indicators::indicator_trait::Indicator;
use sessionr_data::Bar;

/// Average directional index with Wilder smoothing over +DM/-DM/TR
/// and then over DX itself.
#[derive(Debug)]
pub struct Adx {
    period: usize,
    previous: Option<(f64, f64, f64)>, // (high, low, close)
    seeds_seen: usize,
    tr_sum: f64,
    plus_dm_sum: f64,
    minus_dm_sum: f64,
    smoothed_tr: Option<f64>,
    smoothed_plus_dm: Option<f64>,
    smoothed_minus_dm: Option<f64>,
    dx_seen: usize,
    dx_sum: f64,
    current_value: Option<f64>,
}

impl Adx {
    pub fn new(period: usize) -> Self {
        Self {
            period: period.max(1),
            previous: None,
            seeds_seen: 0,
            tr_sum: 0.0,
            plus_dm_sum: 0.0,
            minus_dm_sum: 0.0,
            smoothed_tr: None,
            smoothed_plus_dm: None,
            smoothed_minus_dm: None,
            dx_seen: 0,
            dx_sum: 0.0,
            current_value: None,
        }
    }

    fn dx(plus_di: f64, minus_di: f64) -> f64 {
        let sum = plus_di + minus_di;
        if sum == 0.0 {
            0.0
        } else {
            ((plus_di - minus_di).abs() / sum) * 100.0
        }
    }
}

impl Indicator for Adx {
    fn name(&self) -> &str {
        "adx"
    }

    fn warm_up_period(&self) -> usize {
        // One bar to anchor the deltas, `period` to seed DI, and the
        // remaining DX values to seed ADX land at bar 2*period.
        self.period * 2
    }

    fn update(&mut self, bar: &Bar) -> Option<f64> {
        let (prev_high, prev_low, prev_close) =
            match self.previous.replace((bar.high, bar.low, bar.close)) {
                Some(prev) => prev,
                None => return None,
            };

        let up_move = bar.high - prev_high;
        let down_move = prev_low - bar.low;
        let plus_dm = if up_move > down_move && up_move > 0.0 {
            up_move
        } else {
            0.0
        };
        let minus_dm = if down_move > up_move && down_move > 0.0 {
            down_move
        } else {
            0.0
        };
        let tr = (bar.high - bar.low)
            .max((bar.high - prev_close).abs())
            .max((bar.low - prev_close).abs());

        let (s_tr, s_plus, s_minus) = match (
            self.smoothed_tr,
            self.smoothed_plus_dm,
            self.smoothed_minus_dm,
        ) {
            (Some(s_tr), Some(s_plus), Some(s_minus)) => {
                let n = self.period as f64;
                let s_tr = s_tr - s_tr / n + tr;
                let s_plus = s_plus - s_plus / n + plus_dm;
                let s_minus = s_minus - s_minus / n + minus_dm;
                (s_tr, s_plus, s_minus)
            }
            _ => {
                self.seeds_seen += 1;
                self.tr_sum += tr;
                self.plus_dm_sum += plus_dm;
                self.minus_dm_sum += minus_dm;
                if self.seeds_seen < self.period {
                    return None;
                }
                (self.tr_sum, self.plus_dm_sum, self.minus_dm_sum)
            }
        };

        self.smoothed_tr = Some(s_tr);
        self.smoothed_plus_dm = Some(s_plus);
        self.smoothed_minus_dm = Some(s_minus);

        if s_tr == 0.0 {
            return self.current_value;
        }

        let plus_di = (s_plus / s_tr) * 100.0;
        let minus_di = (s_minus / s_tr) * 100.0;
        let dx = Self::dx(plus_di, minus_di);

        match self.current_value {
            Some(prev_adx) => {
                let adx = (prev_adx * (self.period - 1) as f64 + dx) / self.period as f64;
                self.current_value = Some(adx);
            }
            None => {
                self.dx_seen += 1;
                self.dx_sum += dx;
                if self.dx_seen == self.period {
                    self.current_value = Some(self.dx_sum / self.period as f64);
                }
            }
        }

        self.current_value
    }

    fn current(&self) -> Option<f64> {
        self.current_value
    }

    fn reset(&mut self) {
        self.previous = None;
        self.seeds_seen = 0;
        self.tr_sum = 0.0;
        self.plus_dm_sum = 0.0;
        self.minus_dm_sum = 0.0;
        self.smoothed_tr = None;
        self.smoothed_plus_dm = None;
        self.smoothed_minus_dm = None;
        self.dx_seen = 0;
        self.dx_sum = 0.0;
        self.current_value = None;
    }
}
