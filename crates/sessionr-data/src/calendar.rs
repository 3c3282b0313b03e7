use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use tracing::debug;

/// One row of the persistent calendar table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarDay {
    pub date: NaiveDate,
    pub is_holiday: bool,
    pub open: NaiveTime,
    pub close: NaiveTime,
    pub early_close: Option<NaiveTime>,
    pub exchange_group: String,
}

/// Calendar queries for the session runtime. Loaded once at process
/// start from the persistent table and cached; `refresh` swaps the
/// table in place and bumps the generation counter so dependent caches
/// (expected-bar counts) know to invalidate.
///
/// Every "what hours does the market keep" question resolves here.
/// Dates absent from the table fall back to the exchange defaults:
/// weekends closed, weekdays open with the regular hours.
pub struct TradingCalendar {
    days: RwLock<HashMap<NaiveDate, CalendarDay>>,
    default_open: NaiveTime,
    default_close: NaiveTime,
    exchange_group: String,
    generation: AtomicU64,
}

impl TradingCalendar {
    pub fn new(
        exchange_group: impl Into<String>,
        default_open: NaiveTime,
        default_close: NaiveTime,
    ) -> Self {
        Self {
            days: RwLock::new(HashMap::new()),
            default_open,
            default_close,
            exchange_group: exchange_group.into(),
            generation: AtomicU64::new(0),
        }
    }

    /// US equities calendar: 09:30-16:00 exchange-local.
    pub fn us_equities() -> Self {
        Self::new(
            "us_equities",
            NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
            NaiveTime::from_hms_opt(16, 0, 0).unwrap(),
        )
    }

    pub fn exchange_group(&self) -> &str {
        &self.exchange_group
    }

    /// Replace the cached table. Returns the new generation.
    pub fn refresh(&self, rows: Vec<CalendarDay>) -> u64 {
        let mut days = self.days.write().unwrap_or_else(|e| e.into_inner());
        days.clear();
        for row in rows {
            days.insert(row.date, row);
        }
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(entries = days.len(), generation, "trading calendar refreshed");
        generation
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    fn day(&self, date: NaiveDate) -> Option<CalendarDay> {
        self.days
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&date)
            .cloned()
    }

    pub fn is_trading_day(&self, date: NaiveDate) -> bool {
        match self.day(date) {
            Some(day) => !day.is_holiday,
            None => !matches!(date.weekday(), Weekday::Sat | Weekday::Sun),
        }
    }

    pub fn regular_open(&self, date: NaiveDate) -> NaiveTime {
        self.day(date).map(|d| d.open).unwrap_or(self.default_open)
    }

    pub fn regular_close(&self, date: NaiveDate) -> NaiveTime {
        self.day(date).map(|d| d.close).unwrap_or(self.default_close)
    }

    pub fn early_close(&self, date: NaiveDate) -> Option<NaiveTime> {
        self.day(date).and_then(|d| d.early_close)
    }

    /// The close that actually applies: the early close when one is
    /// scheduled, the regular close otherwise.
    pub fn effective_close(&self, date: NaiveDate) -> NaiveTime {
        self.early_close(date)
            .unwrap_or_else(|| self.regular_close(date))
    }

    /// The n-th trading day strictly after `date`. Walks at most ten
    /// calendar days per requested trading day so a degenerate table
    /// cannot spin forever.
    pub fn next_trading_day(&self, date: NaiveDate, n: u32) -> Option<NaiveDate> {
        let mut current = date;
        let mut remaining = n.max(1);
        for _ in 0..(remaining as u64 * 10).max(10) {
            current = current.succ_opt()?;
            if self.is_trading_day(current) {
                remaining -= 1;
                if remaining == 0 {
                    return Some(current);
                }
            }
        }
        None
    }

    /// The n-th trading day strictly before `date`.
    pub fn prev_trading_day(&self, date: NaiveDate, n: u32) -> Option<NaiveDate> {
        let mut current = date;
        let mut remaining = n.max(1);
        for _ in 0..(remaining as u64 * 10).max(10) {
            current = current.pred_opt()?;
            if self.is_trading_day(current) {
                remaining -= 1;
                if remaining == 0 {
                    return Some(current);
                }
            }
        }
        None
    }

    /// Trading days in [start, end], inclusive.
    pub fn trading_days_between(&self, start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
        let mut days = Vec::new();
        let mut current = start;
        while current <= end {
            if self.is_trading_day(current) {
                days.push(current);
            }
            match current.succ_opt() {
                Some(next) => current = next,
                None => break,
            }
        }
        days
    }

    pub fn session_open_ms(&self, date: NaiveDate) -> i64 {
        to_epoch_ms(date, self.regular_open(date))
    }

    /// Session close in epoch ms, early closes applied.
    pub fn session_close_ms(&self, date: NaiveDate) -> i64 {
        to_epoch_ms(date, self.effective_close(date))
    }

    /// Minutes the market keeps on `date`; zero on holidays/weekends.
    pub fn session_minutes(&self, date: NaiveDate) -> i64 {
        if !self.is_trading_day(date) {
            return 0;
        }
        (self.session_close_ms(date) - self.session_open_ms(date)) / 60_000
    }

    /// Last trading day of the ISO week containing `date`.
    pub fn last_trading_day_of_week(&self, date: NaiveDate) -> Option<NaiveDate> {
        let monday = date - chrono::Duration::days(date.weekday().num_days_from_monday() as i64);
        let mut last = None;
        for offset in 0..7 {
            let day = monday + chrono::Duration::days(offset);
            if self.is_trading_day(day) {
                last = Some(day);
            }
        }
        last
    }
}

/// Exchange-local naive date+time to epoch milliseconds. The runtime
/// keeps every timestamp in the exchange's local frame.
pub fn to_epoch_ms(date: NaiveDate, time: NaiveTime) -> i64 {
    NaiveDateTime::new(date, time).and_utc().timestamp_millis()
}

pub fn ms_to_date(timestamp_ms: i64) -> Option<NaiveDate> {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map(|dt| dt.naive_utc().date())
}

pub fn ms_to_datetime(timestamp_ms: i64) -> Option<NaiveDateTime> {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map(|dt| dt.naive_utc())
}
