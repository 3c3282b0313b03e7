mod backtest;
mod live;

pub use backtest::BacktestDriver;
pub use live::LiveDriver;
