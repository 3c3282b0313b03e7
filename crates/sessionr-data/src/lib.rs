pub mod calendar;
pub mod interval;
pub mod models;
pub mod store;

pub use calendar::{ms_to_date, ms_to_datetime, to_epoch_ms, CalendarDay, TradingCalendar};
pub use interval::{Interval, IntervalError, IntervalUnit};
pub use models::{aggregate_bars, Bar, BarError};
pub use store::{BarStore, StoreError};
