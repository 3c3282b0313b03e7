//! Session configuration model and load-time validation.

use crate::errors::ConfigError;
use crate::requirements::required_base_interval;
use chrono::{NaiveDate, NaiveTime};
use sessionr_data::Interval;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    Backtest,
    Live,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub session_name: String,
    pub mode: SessionMode,
    #[serde(default = "default_exchange_group")]
    pub exchange_group: String,
    #[serde(default = "default_asset_class")]
    pub asset_class: String,
    #[serde(default)]
    pub backtest_config: Option<BacktestConfig>,
    pub session_data_config: SessionDataConfig,
    pub trading_config: TradingConfig,
    pub api_config: ApiConfig,
}

fn default_exchange_group() -> String {
    "us_equities".to_string()
}

fn default_asset_class() -> String {
    "equity".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestConfig {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default = "default_speed_multiplier")]
    pub speed_multiplier: f64,
    #[serde(default = "default_prefetch_days")]
    pub prefetch_days: u32,
}

fn default_speed_multiplier() -> f64 {
    0.0 // 0 = as fast as possible
}

fn default_prefetch_days() -> u32 {
    5
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionDataConfig {
    pub symbols: Vec<String>,
    /// Interval tags streamed or derived for every configured symbol.
    pub streams: Vec<String>,
    #[serde(default)]
    pub derived_intervals: Vec<String>,
    #[serde(default)]
    pub historical: HistoricalConfig,
    #[serde(default)]
    pub gap_filler: GapFillerConfig,
    #[serde(default)]
    pub streaming: StreamingConfig,
    #[serde(default)]
    pub scanners: Vec<ScannerConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoricalConfig {
    #[serde(default = "default_true")]
    pub enable_quality: bool,
    #[serde(default)]
    pub data: Vec<HistoricalDataSpec>,
    #[serde(default)]
    pub indicators: HashMap<String, IndicatorSpec>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoricalDataSpec {
    pub trailing_days: u32,
    pub intervals: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndicatorSpec {
    #[serde(rename = "type")]
    pub kind: String,
    pub period: usize,
    pub interval: String,
    #[serde(default)]
    pub params: HashMap<String, f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GapFillerConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_interval")]
    pub retry_interval_seconds: u64,
    #[serde(default = "default_true")]
    pub enable_session_quality: bool,
}

impl Default for GapFillerConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_interval_seconds: default_retry_interval(),
            enable_session_quality: true,
        }
    }
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_interval() -> u64 {
    5
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamingConfig {
    #[serde(default = "default_catchup_threshold")]
    pub catchup_threshold_seconds: i64,
    #[serde(default = "default_catchup_check_interval")]
    pub catchup_check_interval: u64,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            catchup_threshold_seconds: default_catchup_threshold(),
            catchup_check_interval: default_catchup_check_interval(),
        }
    }
}

fn default_catchup_threshold() -> i64 {
    60
}

fn default_catchup_check_interval() -> u64 {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    pub module: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub pre_session: bool,
    /// Wall-clock scan times, "HH:MM".
    #[serde(default)]
    pub regular_session: Vec<String>,
    #[serde(default)]
    pub config: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingConfig {
    pub max_buying_power: f64,
    pub max_per_trade: f64,
    pub max_per_symbol: f64,
    pub max_open_positions: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub data_api: String,
    pub trade_api: String,
}

impl SessionConfig {
    /// Load-time validation. Every rule here is fatal: a config that
    /// fails never starts a session.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session_name.trim().is_empty() {
            return Err(ConfigError::MissingSection("session_name"));
        }
        if self.mode == SessionMode::Backtest && self.backtest_config.is_none() {
            return Err(ConfigError::MissingBacktestConfig);
        }
        if self.session_data_config.symbols.is_empty() {
            return Err(ConfigError::NoSymbols);
        }

        // Every stream tag must parse (hourly tags fail here) and the
        // set must collapse onto one base interval.
        let streams = self.parsed_streams()?;
        required_base_interval(&streams)?;

        for spec in &self.session_data_config.historical.data {
            for tag in &spec.intervals {
                tag.parse::<Interval>()?;
            }
        }
        for spec in self.session_data_config.historical.indicators.values() {
            spec.interval.parse::<Interval>()?;
        }

        for scanner in &self.session_data_config.scanners {
            for time in &scanner.regular_session {
                NaiveTime::parse_from_str(time, "%H:%M")
                    .map_err(|_| ConfigError::BadScannerTime(time.clone()))?;
            }
        }

        Ok(())
    }

    pub fn parsed_streams(&self) -> Result<Vec<Interval>, ConfigError> {
        let mut streams = Vec::new();
        for tag in &self.session_data_config.streams {
            streams.push(tag.parse::<Interval>()?);
        }
        Ok(streams)
    }

    /// The base interval the session streams, after validation.
    pub fn base_interval(&self) -> Result<Interval, ConfigError> {
        required_base_interval(&self.parsed_streams()?)
    }

    /// All derived intervals for the session: non-base streams plus
    /// the explicit derived_intervals list, deduplicated.
    pub fn derived_intervals(&self) -> Result<Vec<Interval>, ConfigError> {
        let base = self.base_interval()?;
        let mut derived = Vec::new();
        let mut push = |interval: Interval| {
            if interval != base && !derived.contains(&interval) {
                derived.push(interval);
            }
        };
        for stream in self.parsed_streams()? {
            push(stream);
        }
        for tag in &self.session_data_config.derived_intervals {
            push(tag.parse::<Interval>()?);
        }
        Ok(derived)
    }
}
