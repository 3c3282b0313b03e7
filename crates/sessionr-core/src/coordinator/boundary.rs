//! Session boundary state machine, evaluated by the monitor worker.

use chrono::NaiveDate;
use sessionr_data::{ms_to_date, TradingCalendar};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundaryState {
    NotStarted,
    PreMarket,
    Active,
    PostMarket,
    Ended,
    /// No data inside the catch-up threshold while the session was
    /// active. Observable only; recovery happens on the next check
    /// once data has resumed.
    Timeout,
    Error,
}

impl BoundaryState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BoundaryState::NotStarted => "not_started",
            BoundaryState::PreMarket => "pre_market",
            BoundaryState::Active => "active",
            BoundaryState::PostMarket => "post_market",
            BoundaryState::Ended => "ended",
            BoundaryState::Timeout => "timeout",
            BoundaryState::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BoundaryState::Ended)
    }
}

/// Pure transition function over (calendar, session date, now, last
/// data arrival).
pub fn evaluate(
    calendar: &TradingCalendar,
    session_date: NaiveDate,
    now_ms: i64,
    last_data_ms: Option<i64>,
    timeout_secs: i64,
) -> BoundaryState {
    // Holidays never open: straight to Ended.
    if !calendar.is_trading_day(session_date) {
        return BoundaryState::Ended;
    }

    let today = match ms_to_date(now_ms) {
        Some(date) => date,
        None => return BoundaryState::Error,
    };
    if today < session_date {
        return BoundaryState::NotStarted;
    }
    if today > session_date {
        return BoundaryState::Ended;
    }

    let open = calendar.session_open_ms(session_date);
    let close = calendar.session_close_ms(session_date);

    if now_ms < open {
        return BoundaryState::PreMarket;
    }
    if now_ms >= close {
        return BoundaryState::PostMarket;
    }

    // Inside regular hours: stale data flips to Timeout until the
    // next evaluation sees fresh arrivals.
    if let Some(last) = last_data_ms {
        if now_ms - last > timeout_secs * 1_000 {
            return BoundaryState::Timeout;
        }
    }
    BoundaryState::Active
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime};
    use sessionr_data::{to_epoch_ms, CalendarDay};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn at(d: NaiveDate, h: u32, m: u32) -> i64 {
        to_epoch_ms(d, NaiveTime::from_hms_opt(h, m, 0).unwrap())
    }

    #[test]
    fn test_regular_day_progression() {
        let calendar = TradingCalendar::us_equities();
        let day = date(2025, 1, 2);

        assert_eq!(
            evaluate(&calendar, day, at(day, 8, 0), None, 60),
            BoundaryState::PreMarket
        );
        assert_eq!(
            evaluate(&calendar, day, at(day, 10, 0), Some(at(day, 9, 59)), 60),
            BoundaryState::Active
        );
        assert_eq!(
            evaluate(&calendar, day, at(day, 16, 30), Some(at(day, 15, 59)), 60),
            BoundaryState::PostMarket
        );
        assert_eq!(
            evaluate(&calendar, day, at(date(2025, 1, 3), 0, 30), None, 60),
            BoundaryState::Ended
        );
    }

    #[test]
    fn test_early_close_enters_post_market() {
        let calendar = TradingCalendar::us_equities();
        calendar.refresh(vec![CalendarDay {
            date: date(2024, 11, 29),
            is_holiday: false,
            open: NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
            close: NaiveTime::from_hms_opt(16, 0, 0).unwrap(),
            early_close: Some(NaiveTime::from_hms_opt(13, 0, 0).unwrap()),
            exchange_group: "us_equities".to_string(),
        }]);
        let day = date(2024, 11, 29);

        assert_eq!(
            evaluate(&calendar, day, at(day, 12, 59), Some(at(day, 12, 58)), 60),
            BoundaryState::Active
        );
        assert_eq!(
            evaluate(&calendar, day, at(day, 13, 0), Some(at(day, 12, 59)), 60),
            BoundaryState::PostMarket
        );
    }

    #[test]
    fn test_holiday_goes_straight_to_ended() {
        let calendar = TradingCalendar::us_equities();
        calendar.refresh(vec![CalendarDay {
            date: date(2024, 12, 25),
            is_holiday: true,
            open: NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
            close: NaiveTime::from_hms_opt(16, 0, 0).unwrap(),
            early_close: None,
            exchange_group: "us_equities".to_string(),
        }]);
        let day = date(2024, 12, 25);
        assert_eq!(
            evaluate(&calendar, day, at(day, 10, 0), None, 60),
            BoundaryState::Ended
        );
    }

    #[test]
    fn test_timeout_and_recovery_on_next_check() {
        let calendar = TradingCalendar::us_equities();
        let day = date(2025, 1, 2);

        // Last bar 5 minutes old with a 60s threshold.
        assert_eq!(
            evaluate(&calendar, day, at(day, 10, 5), Some(at(day, 10, 0)), 60),
            BoundaryState::Timeout
        );
        // Fresh data: the next evaluation returns to Active.
        assert_eq!(
            evaluate(&calendar, day, at(day, 10, 6), Some(at(day, 10, 6) - 5_000), 60),
            BoundaryState::Active
        );
    }

    #[test]
    fn test_not_started_before_session_date() {
        let calendar = TradingCalendar::us_equities();
        assert_eq!(
            evaluate(
                &calendar,
                date(2025, 1, 3),
                at(date(2025, 1, 2), 12, 0),
                None,
                60
            ),
            BoundaryState::NotStarted
        );
    }
}
