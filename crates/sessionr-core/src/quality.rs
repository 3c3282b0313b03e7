//! Calendar-aware expected-bar counting, gap detection and quality
//! scoring.

use chrono::NaiveDate;
use sessionr_data::{Bar, Interval, IntervalUnit, TradingCalendar};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// A contiguous run of missing bars on one interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GapSpan {
    /// First missing window start.
    pub start_ts: i64,
    /// One past the last missing window start.
    pub end_ts: i64,
    pub missing_bars: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QualityMetrics {
    pub total_bars: usize,
    pub expected_bars: i64,
    pub missing_bars: i64,
    pub duplicate_count: usize,
    pub completeness_pct: f64,
    /// Composite score in [0, 1]; `None` when the window expects no
    /// bars at all (holidays).
    pub quality_score: Option<f64>,
}

impl QualityMetrics {
    /// The [0, 100] figure stored on symbols and intervals.
    pub fn score_pct(&self) -> Option<f64> {
        self.quality_score.map(|s| s * 100.0)
    }
}

type CacheKey = (NaiveDate, NaiveDate, Interval);

/// Expected-bar counting with a per-window cache. The cache is tied to
/// the calendar generation: a calendar refresh invalidates everything.
pub struct QualityChecker {
    calendar: Arc<TradingCalendar>,
    cache: Mutex<HashMap<CacheKey, i64>>,
    cached_generation: AtomicU64,
}

impl QualityChecker {
    pub fn new(calendar: Arc<TradingCalendar>) -> Self {
        let generation = calendar.generation();
        Self {
            calendar,
            cache: Mutex::new(HashMap::new()),
            cached_generation: AtomicU64::new(generation),
        }
    }

    pub fn clear_cache(&self) {
        self.cache.lock().unwrap_or_else(|e| e.into_inner()).clear();
        debug!("expected-bars cache cleared");
    }

    fn invalidate_if_stale(&self) {
        let current = self.calendar.generation();
        if self.cached_generation.swap(current, Ordering::SeqCst) != current {
            self.clear_cache();
        }
    }

    /// Expected bar count for [start_date, end_date] inclusive,
    /// walking the calendar day by day; early-close days contribute
    /// their reduced session.
    pub fn expected_bars(&self, start_date: NaiveDate, end_date: NaiveDate, interval: Interval) -> i64 {
        self.invalidate_if_stale();

        let key = (start_date, end_date, interval);
        if let Some(cached) = self
            .cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&key)
        {
            return *cached;
        }

        let expected = self.compute_expected(start_date, end_date, interval);
        self.cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key, expected);
        debug!(%interval, %start_date, %end_date, expected, "expected bars computed");
        expected
    }

    fn compute_expected(&self, start_date: NaiveDate, end_date: NaiveDate, interval: Interval) -> i64 {
        let trading_days = self.calendar.trading_days_between(start_date, end_date);
        match interval.unit() {
            IntervalUnit::Second | IntervalUnit::Minute => {
                let interval_ms = interval.duration_ms();
                trading_days
                    .iter()
                    .map(|day| {
                        (self.calendar.session_close_ms(*day)
                            - self.calendar.session_open_ms(*day))
                            / interval_ms
                    })
                    .sum()
            }
            IntervalUnit::Day => trading_days.len() as i64 / interval.n() as i64,
            IntervalUnit::Week => {
                let mut weeks: Vec<NaiveDate> = trading_days
                    .iter()
                    .filter_map(|d| self.calendar.last_trading_day_of_week(*d))
                    .collect();
                weeks.dedup();
                weeks.len() as i64 / interval.n() as i64
            }
        }
    }

    /// Quality of a bar sequence against the expected count for the
    /// date window. Score: 0.9 weight on completeness, 0.1 on the
    /// sequence being duplicate-free.
    pub fn check_bars(
        &self,
        symbol: &str,
        bars: &[Bar],
        interval: Interval,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> QualityMetrics {
        let expected = self.expected_bars(start_date, end_date, interval);
        let total = bars.len();

        let mut duplicate_count = 0usize;
        for pair in bars.windows(2) {
            if pair[0].timestamp == pair[1].timestamp {
                duplicate_count += 1;
            }
        }

        if expected <= 0 {
            return QualityMetrics {
                total_bars: total,
                expected_bars: 0,
                missing_bars: 0,
                duplicate_count,
                completeness_pct: 100.0,
                quality_score: None,
            };
        }

        let missing = (expected - total as i64).max(0);
        let completeness_pct = (total as f64 / expected as f64) * 100.0;
        let completeness_score = (total as f64 / expected as f64).min(1.0);
        let duplicate_score = if duplicate_count == 0 { 1.0 } else { 0.0 };
        let score = completeness_score * 0.9 + duplicate_score * 0.1;

        if completeness_pct < 95.0 {
            warn!(
                symbol,
                %interval,
                completeness_pct,
                total,
                expected,
                missing,
                "bar data quality below threshold"
            );
        } else if completeness_pct < 100.0 {
            info!(symbol, %interval, completeness_pct, "bar data incomplete");
        }

        QualityMetrics {
            total_bars: total,
            expected_bars: expected,
            missing_bars: missing,
            duplicate_count,
            completeness_pct,
            quality_score: Some(score),
        }
    }

    /// Intraday quality for an active session:
    /// `actual / expected_so_far * 100`, where expectation runs from
    /// session open to `min(now, close)`. 100 by convention before
    /// the open.
    pub fn session_quality(
        &self,
        open_ms: i64,
        close_ms: i64,
        now_ms: i64,
        interval: Interval,
        actual_bars: usize,
    ) -> f64 {
        if now_ms <= open_ms {
            return 100.0;
        }
        let horizon = now_ms.min(close_ms);
        let expected = (horizon - open_ms) / interval.duration_ms();
        if expected <= 0 {
            return 100.0;
        }
        ((actual_bars as f64 / expected as f64) * 100.0).min(100.0)
    }

    /// Missing-bar spans for one interval inside [window_start,
    /// window_end). Assumes bars are timestamp-ordered.
    pub fn find_gaps(
        &self,
        bars: &[Bar],
        interval: Interval,
        window_start: i64,
        window_end: i64,
    ) -> Vec<GapSpan> {
        let interval_ms = interval.duration_ms();
        let mut gaps = Vec::new();
        let mut push_gap = |from: i64, to: i64| {
            if to > from {
                gaps.push(GapSpan {
                    start_ts: from,
                    end_ts: to,
                    missing_bars: ((to - from) / interval_ms) as u32,
                });
            }
        };

        match bars.first() {
            None => {
                push_gap(window_start, window_end);
                return gaps;
            }
            Some(first) => push_gap(window_start, first.timestamp),
        }

        for pair in bars.windows(2) {
            let expected_next = pair[0].timestamp + interval_ms;
            push_gap(expected_next, pair[1].timestamp);
        }

        if let Some(last) = bars.last() {
            push_gap(last.timestamp + interval_ms, window_end);
        }

        gaps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;
    use sessionr_data::CalendarDay;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn checker() -> QualityChecker {
        QualityChecker::new(Arc::new(TradingCalendar::us_equities()))
    }

    fn minute_bar(ts: i64) -> Bar {
        Bar::new("AAPL", Interval::MIN_1, ts, 100.0, 100.5, 99.5, 100.2, 1_000)
    }

    #[test]
    fn test_expected_bars_single_day() {
        let checker = checker();
        let day = date(2025, 1, 2);
        assert_eq!(checker.expected_bars(day, day, Interval::MIN_1), 390);
        assert_eq!(checker.expected_bars(day, day, Interval::MIN_5), 78);
    }

    #[test]
    fn test_expected_bars_early_close() {
        let calendar = Arc::new(TradingCalendar::us_equities());
        calendar.refresh(vec![CalendarDay {
            date: date(2024, 11, 29),
            is_holiday: false,
            open: NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
            close: NaiveTime::from_hms_opt(16, 0, 0).unwrap(),
            early_close: Some(NaiveTime::from_hms_opt(13, 0, 0).unwrap()),
            exchange_group: "us_equities".to_string(),
        }]);
        let checker = QualityChecker::new(calendar);
        let day = date(2024, 11, 29);
        assert_eq!(checker.expected_bars(day, day, Interval::MIN_1), 210);
        assert_eq!(checker.expected_bars(day, day, Interval::MIN_5), 42);
    }

    #[test]
    fn test_expected_bars_holiday_is_zero() {
        let calendar = Arc::new(TradingCalendar::us_equities());
        calendar.refresh(vec![CalendarDay {
            date: date(2024, 12, 25),
            is_holiday: true,
            open: NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
            close: NaiveTime::from_hms_opt(16, 0, 0).unwrap(),
            early_close: None,
            exchange_group: "us_equities".to_string(),
        }]);
        let checker = QualityChecker::new(calendar);
        let day = date(2024, 12, 25);
        assert_eq!(checker.expected_bars(day, day, Interval::MIN_1), 0);

        let metrics = checker.check_bars("AAPL", &[], Interval::MIN_1, day, day);
        assert_eq!(metrics.expected_bars, 0);
        assert_eq!(metrics.quality_score, None);
    }

    #[test]
    fn test_cache_invalidated_by_calendar_refresh() {
        let calendar = Arc::new(TradingCalendar::us_equities());
        let checker = QualityChecker::new(Arc::clone(&calendar));
        let day = date(2024, 12, 25); // Wednesday, trading by default
        assert_eq!(checker.expected_bars(day, day, Interval::MIN_1), 390);

        calendar.refresh(vec![CalendarDay {
            date: day,
            is_holiday: true,
            open: NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
            close: NaiveTime::from_hms_opt(16, 0, 0).unwrap(),
            early_close: None,
            exchange_group: "us_equities".to_string(),
        }]);
        assert_eq!(checker.expected_bars(day, day, Interval::MIN_1), 0);
    }

    #[test]
    fn test_perfect_day_scores_full() {
        let checker = checker();
        let day = date(2025, 1, 2);
        let open = sessionr_data::to_epoch_ms(day, NaiveTime::from_hms_opt(9, 30, 0).unwrap());
        let bars: Vec<Bar> = (0..390).map(|i| minute_bar(open + i * 60_000)).collect();

        let metrics = checker.check_bars("AAPL", &bars, Interval::MIN_1, day, day);
        assert_eq!(metrics.total_bars, 390);
        assert_eq!(metrics.expected_bars, 390);
        assert_eq!(metrics.missing_bars, 0);
        assert_eq!(metrics.duplicate_count, 0);
        assert_eq!(metrics.quality_score, Some(1.0));
        assert_eq!(metrics.score_pct(), Some(100.0));
    }

    #[test]
    fn test_missing_bars_lower_score() {
        let checker = checker();
        let day = date(2025, 1, 2);
        let open = sessionr_data::to_epoch_ms(day, NaiveTime::from_hms_opt(9, 30, 0).unwrap());
        // Drop 3 of 390 bars.
        let bars: Vec<Bar> = (0i64..390)
            .filter(|i| ![5, 6, 45].contains(i))
            .map(|i| minute_bar(open + i * 60_000))
            .collect();

        let metrics = checker.check_bars("AAPL", &bars, Interval::MIN_1, day, day);
        assert_eq!(metrics.total_bars, 387);
        assert_eq!(metrics.missing_bars, 3);
        assert!((metrics.completeness_pct - 99.23).abs() < 0.01);
        let score = metrics.quality_score.unwrap();
        assert!(score < 1.0 && score > 0.99);
    }

    #[test]
    fn test_duplicates_cost_a_tenth() {
        let checker = checker();
        let day = date(2025, 1, 2);
        let open = sessionr_data::to_epoch_ms(day, NaiveTime::from_hms_opt(9, 30, 0).unwrap());
        let mut bars: Vec<Bar> = (0..390).map(|i| minute_bar(open + i * 60_000)).collect();
        bars.insert(10, bars[10].clone());

        let metrics = checker.check_bars("AAPL", &bars, Interval::MIN_1, day, day);
        assert_eq!(metrics.duplicate_count, 1);
        let score = metrics.quality_score.unwrap();
        // completeness saturates at 1.0; the duplicate drops the 0.1 term.
        assert!((score - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_session_quality_before_open() {
        let checker = checker();
        assert_eq!(
            checker.session_quality(1_000_000, 2_000_000, 500_000, Interval::MIN_1, 0),
            100.0
        );
    }

    #[test]
    fn test_session_quality_midday() {
        let checker = checker();
        let open = 0;
        let close = 390 * 60_000;
        // 150 minutes in, 140 bars received.
        let quality =
            checker.session_quality(open, close, 150 * 60_000, Interval::MIN_1, 140);
        assert!((quality - (140.0 / 150.0 * 100.0)).abs() < 1e-9);
    }

    #[test]
    fn test_session_quality_caps_after_close() {
        let checker = checker();
        let close = 390 * 60_000;
        let quality = checker.session_quality(0, close, close + 3_600_000, Interval::MIN_1, 390);
        assert_eq!(quality, 100.0);
    }

    #[test]
    fn test_find_gaps() {
        let checker = checker();
        let interval_ms = 60_000;
        let bars: Vec<Bar> = [0, 1, 2, 5, 6, 9]
            .iter()
            .map(|i| minute_bar(i * interval_ms))
            .collect();

        let gaps = checker.find_gaps(&bars, Interval::MIN_1, 0, 10 * interval_ms);
        assert_eq!(
            gaps,
            vec![
                GapSpan {
                    start_ts: 3 * interval_ms,
                    end_ts: 5 * interval_ms,
                    missing_bars: 2
                },
                GapSpan {
                    start_ts: 7 * interval_ms,
                    end_ts: 9 * interval_ms,
                    missing_bars: 2
                },
            ]
        );
    }

    #[test]
    fn test_find_gaps_empty_window() {
        let checker = checker();
        let gaps = checker.find_gaps(&[], Interval::MIN_1, 0, 5 * 60_000);
        assert_eq!(
            gaps,
            vec![GapSpan {
                start_ts: 0,
                end_ts: 5 * 60_000,
                missing_bars: 5
            }]
        );
    }
}
