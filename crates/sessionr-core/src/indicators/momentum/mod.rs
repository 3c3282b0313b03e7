mod macd;
mod rsi;

pub use macd::{Macd, MacdOutput};
pub use rsi::Rsi;
