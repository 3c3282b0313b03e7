//! Lag-based session control: a symbol replaying far behind the clock
//! closes the external gate while derivation keeps running, and the
//! gate reopens once the stream catches up.

mod common;

use chrono::NaiveDate;
use common::{build, minute_bar, seed_session_day, session_config};
use sessionr_core::events::DriverEvent;
use sessionr_data::{Interval, TradingCalendar};

#[test]
fn lag_deactivates_then_reactivates_session() {
    let day = NaiveDate::from_ymd_opt(2025, 1, 2).unwrap();
    let fx = build(
        session_config(&["NEWSYM"], &["1m", "5m"], 0),
        TradingCalendar::us_equities(),
    );
    seed_session_day(&fx.store, &fx.calendar, "NEWSYM", day, &[]);

    let open = fx.calendar.session_open_ms(day);
    fx.clock.set(open);
    fx.coordinator.start_session(day);
    fx.coordinator.initialize_from_config();
    assert!(fx.session_data.is_session_active());

    // The virtual now sits at noon; the first processed bar is the
    // 09:30 open, two and a half hours behind. Check tick 0 fires
    // immediately and closes the gate.
    let noon = open + 150 * 60_000;
    fx.clock.set(noon);
    fx.coordinator
        .handle_driver_event(DriverEvent::Bar(minute_bar("NEWSYM", open, 100.0)))
        .unwrap();
    assert!(!fx.session_data.is_session_active());

    // External reads are empty while catching up...
    assert!(fx.session_data.get_active_symbols(false).is_empty());
    assert!(fx
        .session_data
        .get_latest_bar("NEWSYM", Interval::MIN_1, false)
        .is_none());

    // ...but the processor keeps deriving internally.
    for i in 1..10i64 {
        fx.coordinator
            .handle_driver_event(DriverEvent::Bar(minute_bar(
                "NEWSYM",
                open + i * 60_000,
                100.0,
            )))
            .unwrap();
    }
    assert!(fx.session_data.get_bar_count("NEWSYM", Interval::MIN_5, true) >= 1);
    assert_eq!(
        fx.session_data.get_bar_count("NEWSYM", Interval::MIN_5, false),
        0
    );

    // Bar 10 is the next check tick. Its timestamp sits within the
    // threshold of the virtual now, so the session reactivates.
    let caught_up_ts = open + 10 * 60_000;
    fx.clock.set(caught_up_ts + 30_000);
    fx.coordinator
        .handle_driver_event(DriverEvent::Bar(minute_bar("NEWSYM", caught_up_ts, 100.0)))
        .unwrap();

    assert!(fx.session_data.is_session_active());
    assert_eq!(fx.session_data.get_active_symbols(false), vec!["NEWSYM"]);
    assert!(fx
        .session_data
        .get_latest_bar("NEWSYM", Interval::MIN_1, false)
        .is_some());
}

#[test]
fn in_threshold_stream_never_deactivates() {
    let day = NaiveDate::from_ymd_opt(2025, 1, 2).unwrap();
    let fx = build(
        session_config(&["NEWSYM"], &["1m", "5m"], 0),
        TradingCalendar::us_equities(),
    );
    seed_session_day(&fx.store, &fx.calendar, "NEWSYM", day, &[]);

    let open = fx.calendar.session_open_ms(day);
    fx.clock.set(open);
    fx.coordinator.start_session(day);
    fx.coordinator.initialize_from_config();

    for i in 0..30i64 {
        let ts = open + i * 60_000;
        fx.clock.set(ts + 5_000);
        fx.coordinator
            .handle_driver_event(DriverEvent::Bar(minute_bar("NEWSYM", ts, 100.0)))
            .unwrap();
        assert!(fx.session_data.is_session_active());
    }
}
