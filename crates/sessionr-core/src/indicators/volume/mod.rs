mod vwap;

pub use vwap::Vwap;
