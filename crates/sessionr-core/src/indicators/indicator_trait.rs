use sessionr_data::{Bar, Interval};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Debug;
use std::str::FromStr;

/// Core trait all technical indicators implement.
///
/// Indicators are incremental: `update` consumes one bar at a time and
/// maintains whatever internal state the calculation needs (EMA
/// running value, Wilder averages, rolling windows). `warmup` bulk
/// feeds a historical sequence; validity flips once `warm_up_period`
/// bars have been consumed and the calculation produces a value.
///
/// Implementations must be `Send + Sync` so the update fan-out can run
/// them from worker threads.
pub trait Indicator: Send + Sync + Debug {
    fn name(&self) -> &str;

    /// Bars needed before the indicator produces valid values.
    fn warm_up_period(&self) -> usize;

    /// Feed one bar; `Some(value)` once warmed up.
    fn update(&mut self, bar: &Bar) -> Option<f64>;

    /// Current value without consuming a bar.
    fn current(&self) -> Option<f64>;

    /// Clear all internal state.
    fn reset(&mut self);

    /// Bulk feed a historical sequence, oldest first.
    fn warmup(&mut self, bars: &[Bar]) {
        for bar in bars {
            self.update(bar);
        }
    }

    fn is_ready(&self) -> bool {
        self.current().is_some()
    }
}

/// Broad category tag carried on indicator configs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndicatorCategory {
    Trend,
    Momentum,
    Volatility,
    Volume,
}

/// Closed set of indicator implementations. The name string in a
/// session config selects a variant; new indicators are new variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndicatorKind {
    Sma,
    Ema,
    Rsi,
    Macd,
    Bollinger,
    Atr,
    Vwap,
    Adx,
    RollingHigh,
    RollingLow,
}

impl IndicatorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndicatorKind::Sma => "sma",
            IndicatorKind::Ema => "ema",
            IndicatorKind::Rsi => "rsi",
            IndicatorKind::Macd => "macd",
            IndicatorKind::Bollinger => "bollinger",
            IndicatorKind::Atr => "atr",
            IndicatorKind::Vwap => "vwap",
            IndicatorKind::Adx => "adx",
            IndicatorKind::RollingHigh => "rolling_high",
            IndicatorKind::RollingLow => "rolling_low",
        }
    }

    pub fn category(&self) -> IndicatorCategory {
        match self {
            IndicatorKind::Sma | IndicatorKind::Ema => IndicatorCategory::Trend,
            IndicatorKind::Rsi | IndicatorKind::Macd | IndicatorKind::Adx => {
                IndicatorCategory::Momentum
            }
            IndicatorKind::Bollinger
            | IndicatorKind::Atr
            | IndicatorKind::RollingHigh
            | IndicatorKind::RollingLow => IndicatorCategory::Volatility,
            IndicatorKind::Vwap => IndicatorCategory::Volume,
        }
    }

    /// Warm-up bars for a given period.
    ///
    /// RSI needs a previous close before its first delta; MACD is
    /// gated on the signal line crossing its own seed; VWAP is
    /// session-cumulative and valid from the first bar.
    pub fn warm_up_bars(&self, period: usize, params: &HashMap<String, f64>) -> usize {
        match self {
            IndicatorKind::Rsi => period + 1,
            IndicatorKind::Macd => {
                let slow = params.get("slow").map(|v| *v as usize).unwrap_or(26);
                let signal = params.get("signal").map(|v| *v as usize).unwrap_or(9);
                (slow + signal - 1).max(slow)
            }
            IndicatorKind::Vwap => period.max(1),
            IndicatorKind::Atr => period + 1,
            IndicatorKind::Adx => period * 2,
            _ => period.max(1),
        }
    }
}

impl FromStr for IndicatorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sma" => Ok(IndicatorKind::Sma),
            "ema" => Ok(IndicatorKind::Ema),
            "rsi" => Ok(IndicatorKind::Rsi),
            "macd" => Ok(IndicatorKind::Macd),
            "bollinger" | "bbands" => Ok(IndicatorKind::Bollinger),
            "atr" => Ok(IndicatorKind::Atr),
            "vwap" => Ok(IndicatorKind::Vwap),
            "adx" => Ok(IndicatorKind::Adx),
            "rolling_high" | "high" => Ok(IndicatorKind::RollingHigh),
            "rolling_low" | "low" => Ok(IndicatorKind::RollingLow),
            _ => Err(format!("Unknown indicator: {s}")),
        }
    }
}

/// Identity of one indicator instance: (name, period, interval), plus
/// free-form numeric parameters (MACD fast/slow/signal, Bollinger
/// standard deviations).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorConfig {
    pub kind: IndicatorKind,
    pub period: usize,
    pub interval: Interval,
    #[serde(default)]
    pub params: HashMap<String, f64>,
}

impl IndicatorConfig {
    pub fn new(kind: IndicatorKind, period: usize, interval: Interval) -> Self {
        Self {
            kind,
            period,
            interval,
            params: HashMap::new(),
        }
    }

    pub fn with_param(mut self, name: &str, value: f64) -> Self {
        self.params.insert(name.to_string(), value);
        self
    }

    /// Storage key: `<name>_<period>_<interval>`.
    pub fn key(&self) -> String {
        format!("{}_{}_{}", self.kind.as_str(), self.period, self.interval)
    }

    pub fn warm_up_bars(&self) -> usize {
        self.kind.warm_up_bars(self.period, &self.params)
    }
}

/// Current state of one indicator instance as published to readers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorData {
    pub value: Option<f64>,
    pub valid: bool,
    pub updated_at: Option<i64>,
    pub config: IndicatorConfig,
}

impl IndicatorData {
    pub fn pending(config: IndicatorConfig) -> Self {
        Self {
            value: None,
            valid: false,
            updated_at: None,
            config,
        }
    }
}
