pub mod indicator_trait;
pub mod manager;
pub mod momentum;
pub mod other;
pub mod trend;
pub mod volatility;
pub mod volume;

pub use indicator_trait::{
    Indicator, IndicatorCategory, IndicatorConfig, IndicatorData, IndicatorKind,
};
pub use manager::{IndicatorManager, RegisterOutcome};
pub use momentum::{Macd, MacdOutput, Rsi};
pub use other::{Adx, RollingHigh, RollingLow};
pub use trend::{Ema, Sma};
pub use volatility::{Atr, Bollinger, BollingerBands};
pub use volume::Vwap;

use std::collections::HashMap;

impl IndicatorKind {
    /// Factory: construct the implementation this tag names.
    /// Parameters not in `params` fall back to conventional defaults.
    pub fn build(&self, period: usize, params: &HashMap<String, f64>) -> Box<dyn Indicator> {
        let param = |name: &str, default: f64| params.get(name).copied().unwrap_or(default);
        match self {
            IndicatorKind::Sma => Box::new(Sma::new(period)),
            IndicatorKind::Ema => Box::new(Ema::new(period)),
            IndicatorKind::Rsi => Box::new(Rsi::new(period)),
            IndicatorKind::Macd => Box::new(Macd::new(
                param("fast", 12.0) as usize,
                param("slow", 26.0) as usize,
                param("signal", 9.0) as usize,
            )),
            IndicatorKind::Bollinger => Box::new(Bollinger::new(period, param("std_dev", 2.0))),
            IndicatorKind::Atr => Box::new(Atr::new(period)),
            IndicatorKind::Vwap => Box::new(Vwap::new()),
            IndicatorKind::Adx => Box::new(Adx::new(period)),
            IndicatorKind::RollingHigh => Box::new(RollingHigh::new(period)),
            IndicatorKind::RollingLow => Box::new(RollingLow::new(period)),
        }
    }
}
