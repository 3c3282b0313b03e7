use sessionr_data::{BarError, IntervalError, StoreError};
use thiserror::Error;

/// Pre-start configuration failures. Fatal at load; the session does
/// not start.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required config section: {0}")]
    MissingSection(&'static str),

    #[error("Session must declare at least one symbol")]
    NoSymbols,

    #[error("mode=backtest requires backtest_config")]
    MissingBacktestConfig,

    #[error(transparent)]
    Interval(#[from] IntervalError),

    #[error("Stream {stream} is not derivable from base interval {base}")]
    NonDerivableStream { stream: String, base: String },

    #[error("Invalid scanner schedule time: {0}")]
    BadScannerTime(String),
}

/// Runtime failures inside the session core. Data-plane variants are
/// recorded and absorbed; only `TimestampRegression` tears the
/// session down.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("{symbol} {interval}: timestamp {timestamp} regresses (last {last})")]
    TimestampRegression {
        symbol: String,
        interval: String,
        timestamp: i64,
        last: i64,
    },

    #[error("{symbol} {interval}: duplicate bar at {timestamp}")]
    DuplicateBar {
        symbol: String,
        interval: String,
        timestamp: i64,
    },

    #[error("Unknown symbol: {0}")]
    UnknownSymbol(String),

    #[error("{symbol}: interval {interval} not provisioned")]
    IntervalNotProvisioned { symbol: String, interval: String },

    #[error("{symbol}: base interval is fixed at {base}, got {requested}")]
    BaseIntervalMismatch {
        symbol: String,
        base: String,
        requested: String,
    },

    #[error(transparent)]
    Bar(#[from] BarError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
