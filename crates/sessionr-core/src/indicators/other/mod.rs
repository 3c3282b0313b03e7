mod adx;
mod rolling;

pub use adx::Adx;
pub use rolling::{RollingHigh, RollingLow};
