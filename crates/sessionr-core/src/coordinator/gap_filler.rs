//! Bounded-retry gap repair against the historical store. Gaps are
//! never fatal: they lower quality until a refill closes them.

use crate::config::GapFillerConfig;
use crate::interfaces::HistoricalStore;
use crate::processor::DataProcessor;
use crate::quality::QualityChecker;
use crate::session::{InsertOutcome, SessionData};
use chrono::NaiveDate;
use sessionr_data::{Interval, TradingCalendar};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub struct GapFiller {
    store: Arc<dyn HistoricalStore>,
    session_data: Arc<SessionData>,
    quality: Arc<QualityChecker>,
    processor: Arc<DataProcessor>,
    calendar: Arc<TradingCalendar>,
    config: GapFillerConfig,
}

impl GapFiller {
    pub fn new(
        store: Arc<dyn HistoricalStore>,
        session_data: Arc<SessionData>,
        quality: Arc<QualityChecker>,
        processor: Arc<DataProcessor>,
        calendar: Arc<TradingCalendar>,
        config: GapFillerConfig,
    ) -> Self {
        Self {
            store,
            session_data,
            quality,
            processor,
            calendar,
            config,
        }
    }

    /// One repair pass over a symbol's base interval for the session
    /// date. Returns the number of bars filled in.
    pub fn fill_once(&self, symbol: &str, interval: Interval, date: NaiveDate) -> usize {
        let open = self.calendar.session_open_ms(date);
        let close = self.calendar.session_close_ms(date);
        let bars = self
            .session_data
            .get_bars_between(symbol, interval, open, close, true);

        // Only scan up to the stream head; the tail is future, not gap.
        let horizon = match bars.last() {
            Some(last) => last.timestamp + interval.duration_ms(),
            None => return 0,
        };
        let gaps = self.quality.find_gaps(&bars, interval, open, horizon);
        if gaps.is_empty() {
            return 0;
        }

        let mut filled = 0usize;
        for gap in &gaps {
            let missing = match self
                .store
                .get_bars(symbol, interval, gap.start_ts, gap.end_ts)
            {
                Ok(bars) => bars,
                Err(e) => {
                    warn!(symbol, error = %e, "gap query failed");
                    continue;
                }
            };
            for bar in missing {
                let timestamp = bar.timestamp;
                match self.session_data.insert_bar_sorted(symbol, interval, bar) {
                    Ok(InsertOutcome::Inserted) | Ok(InsertOutcome::Appended) => {
                        self.processor.process(symbol, timestamp, true);
                        filled += 1;
                    }
                    Ok(InsertOutcome::Duplicate) => {}
                    Err(e) => warn!(symbol, timestamp, error = %e, "gap bar rejected"),
                }
            }
        }

        if filled > 0 {
            info!(symbol, filled, "gap fill applied");
            self.refresh_quality(symbol, interval, date, open, close);
        }
        filled
    }

    /// Retry loop: query, sleep, query again, up to `max_retries`.
    /// Stops early once the session window shows no gaps.
    pub fn run_for_symbol(&self, symbol: &str, interval: Interval, date: NaiveDate) -> usize {
        let mut total = 0usize;
        for attempt in 0..self.config.max_retries.max(1) {
            total += self.fill_once(symbol, interval, date);
            if !self.has_gaps(symbol, interval, date) {
                break;
            }
            debug!(symbol, attempt, "gaps remain after fill attempt");
            if attempt + 1 < self.config.max_retries {
                std::thread::sleep(Duration::from_secs(self.config.retry_interval_seconds));
            }
        }
        total
    }

    fn has_gaps(&self, symbol: &str, interval: Interval, date: NaiveDate) -> bool {
        let open = self.calendar.session_open_ms(date);
        let close = self.calendar.session_close_ms(date);
        let bars = self
            .session_data
            .get_bars_between(symbol, interval, open, close, true);
        let horizon = match bars.last() {
            Some(last) => last.timestamp + interval.duration_ms(),
            None => return false,
        };
        !self.quality.find_gaps(&bars, interval, open, horizon).is_empty()
    }

    fn refresh_quality(
        &self,
        symbol: &str,
        interval: Interval,
        date: NaiveDate,
        open: i64,
        close: i64,
    ) {
        if !self.config.enable_session_quality {
            return;
        }
        let bars = self
            .session_data
            .get_bars_between(symbol, interval, open, close, true);
        let horizon = bars
            .last()
            .map(|b| b.timestamp + interval.duration_ms())
            .unwrap_or(open);
        let quality = self
            .quality
            .session_quality(open, close, horizon, interval, bars.len());
        self.session_data.set_interval_quality(symbol, interval, quality);
        self.session_data.set_symbol_quality(symbol, quality);
        let gaps = self.quality.find_gaps(&bars, interval, open, horizon);
        self.session_data.set_gaps(symbol, interval, gaps);
        debug!(symbol, %interval, %date, quality, "session quality refreshed");
    }
}
