//! Pre-open history loading: before the market opens, pull the
//! trailing window for every configured symbol so session start skips
//! the historical load step.

use crate::clock::Clock;
use crate::errors::SessionError;
use crate::interfaces::HistoricalStore;
use crate::session::{AddedBy, Provenance, SessionData};
use chrono::NaiveDate;
use sessionr_data::{ms_to_date, Interval, TradingCalendar};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub struct PrefetchManager {
    store: Arc<dyn HistoricalStore>,
    session_data: Arc<SessionData>,
    calendar: Arc<TradingCalendar>,
    clock: Arc<dyn Clock>,
    symbols: Vec<String>,
    base_interval: Interval,
    trailing_days: u32,
    window_minutes: i64,
}

impl PrefetchManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn HistoricalStore>,
        session_data: Arc<SessionData>,
        calendar: Arc<TradingCalendar>,
        clock: Arc<dyn Clock>,
        symbols: Vec<String>,
        base_interval: Interval,
        trailing_days: u32,
        window_minutes: i64,
    ) -> Self {
        Self {
            store,
            session_data,
            calendar,
            clock,
            symbols,
            base_interval,
            trailing_days,
            window_minutes: window_minutes.max(1),
        }
    }

    /// The next session whose prefetch window could still open: today
    /// when it is a trading day and the market has not opened, else
    /// the next trading day.
    pub fn next_session(&self) -> Option<NaiveDate> {
        let today = ms_to_date(self.clock.now_ms())?;
        if self.calendar.is_trading_day(today)
            && self.clock.now_ms() < self.calendar.session_open_ms(today)
        {
            return Some(today);
        }
        self.calendar.next_trading_day(today, 1)
    }

    pub fn prefetch_start_ms(&self, session: NaiveDate) -> i64 {
        self.calendar.session_open_ms(session) - self.window_minutes * 60_000
    }

    pub fn should_prefetch(&self, session: NaiveDate) -> bool {
        let now = self.clock.now_ms();
        now >= self.prefetch_start_ms(session) && now < self.calendar.session_open_ms(session)
    }

    /// Worker body: sleep until the window opens, load, and repeat for
    /// the following session.
    pub fn run(&self, stop_flag: Arc<AtomicBool>) {
        while !stop_flag.load(Ordering::SeqCst) {
            let Some(session) = self.next_session() else {
                return;
            };
            while !self.should_prefetch(session) {
                if stop_flag.load(Ordering::SeqCst) {
                    return;
                }
                std::thread::sleep(Duration::from_secs(1));
                if ms_to_date(self.clock.now_ms()).map(|d| d > session).unwrap_or(false) {
                    break;
                }
            }
            if self.should_prefetch(session) {
                self.load_for_session(session);
            }
            // Wait out the open before looking at the next session.
            while !stop_flag.load(Ordering::SeqCst)
                && self.clock.now_ms() < self.calendar.session_open_ms(session)
            {
                std::thread::sleep(Duration::from_secs(1));
            }
        }
    }

    /// Load the trailing window for every configured symbol into the
    /// store. Idempotent: already-present bars are left alone.
    pub fn load_for_session(&self, session: NaiveDate) {
        if self.trailing_days == 0 {
            return;
        }
        let start = match self.calendar.prev_trading_day(session, self.trailing_days) {
            Some(day) => day,
            None => return,
        };
        let start_ms = self.calendar.session_open_ms(start);
        let end_ms = self.calendar.session_open_ms(session);
        info!(%session, days = self.trailing_days, "prefetching trailing history");

        for symbol in &self.symbols {
            if let Err(e) = self.load_symbol(symbol, start_ms, end_ms) {
                warn!(symbol = symbol.as_str(), error = %e, "prefetch failed");
            }
        }
    }

    fn load_symbol(&self, symbol: &str, start_ms: i64, end_ms: i64) -> Result<(), SessionError> {
        self.session_data.register_symbol(
            symbol,
            self.base_interval,
            Provenance::full(AddedBy::Config, self.clock.now_ms()),
        );
        if self
            .session_data
            .get_bar_count(symbol, self.base_interval, true)
            > 0
        {
            debug!(symbol, "prefetch skipped, bars already present");
            return Ok(());
        }

        let bars = self
            .store
            .get_bars(symbol, self.base_interval, start_ms, end_ms)?;
        let count = bars.len();
        for bar in bars {
            match self.session_data.append_bar(symbol, self.base_interval, bar) {
                Ok(()) | Err(SessionError::DuplicateBar { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        debug!(symbol, count, "prefetch loaded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::VirtualClock;
    use chrono::NaiveTime;
    use sessionr_data::{to_epoch_ms, BarStore};

    fn prefetcher(now_ms: i64) -> PrefetchManager {
        PrefetchManager::new(
            Arc::new(BarStore::new_memory().unwrap()),
            Arc::new(SessionData::new()),
            Arc::new(TradingCalendar::us_equities()),
            Arc::new(VirtualClock::new(now_ms)),
            vec!["AAPL".to_string()],
            Interval::MIN_1,
            5,
            60,
        )
    }

    #[test]
    fn test_window_opens_before_session() {
        let day = NaiveDate::from_ymd_opt(2025, 1, 2).unwrap();
        let open = to_epoch_ms(day, NaiveTime::from_hms_opt(9, 30, 0).unwrap());

        // 90 minutes early: window not open yet.
        let early = prefetcher(open - 90 * 60_000);
        assert_eq!(early.next_session(), Some(day));
        assert!(!early.should_prefetch(day));

        // 30 minutes early: inside the window.
        let inside = prefetcher(open - 30 * 60_000);
        assert!(inside.should_prefetch(day));

        // After the open: window closed, next session is tomorrow.
        let late = prefetcher(open + 60_000);
        assert!(!late.should_prefetch(day));
        assert_eq!(
            late.next_session(),
            Some(NaiveDate::from_ymd_opt(2025, 1, 3).unwrap())
        );
    }
}
