pub mod bar;

pub use bar::{aggregate_bars, Bar, BarError};
