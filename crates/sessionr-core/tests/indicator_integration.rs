//! Indicators through the full pipeline: registration via the
//! coordinator, warm-up through historical derivation, incremental
//! updates and validity flags on the read surface.

mod common;

use chrono::NaiveDate;
use common::{build, replay_day, seed_session_day, seed_trailing_days, session_config};
use sessionr_core::events::NotificationKind;
use sessionr_core::{AddedBy, IndicatorConfig, IndicatorKind};
use sessionr_data::{Interval, TradingCalendar};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[test]
fn indicator_warms_up_from_existing_bars() {
    let day = date(2025, 1, 2);
    let fx = build(
        session_config(&["SYMX"], &["1m", "5m"], 1),
        TradingCalendar::us_equities(),
    );
    seed_trailing_days(&fx.store, &fx.calendar, "SYMX", day, 1);
    seed_session_day(&fx.store, &fx.calendar, "SYMX", day, &[]);

    fx.clock.set(fx.calendar.session_open_ms(day));
    fx.coordinator.start_session(day);
    fx.coordinator.initialize_from_config();

    // One trailing day gives 390 base bars and 78 derived 5m bars;
    // plenty for a 20-period SMA on the 5m interval.
    let config = IndicatorConfig::new(IndicatorKind::Sma, 20, Interval::MIN_5);
    assert!(fx.coordinator.add_indicator("SYMX", config).success);

    let data = fx
        .session_data
        .get_indicator("SYMX", "sma_20_5m", true)
        .unwrap();
    assert!(data.valid);
    assert!(data.value.is_some());
}

#[test]
fn indicator_updates_during_replay_and_notifies() {
    let day = date(2025, 1, 2);
    let fx = build(
        session_config(&["SYMX"], &["1m", "5m"], 0),
        TradingCalendar::us_equities(),
    );
    seed_session_day(&fx.store, &fx.calendar, "SYMX", day, &[]);

    fx.clock.set(fx.calendar.session_open_ms(day));
    fx.coordinator.start_session(day);
    fx.coordinator.initialize_from_config();

    // No bars yet: registration succeeds but the value is pending.
    let rsi = IndicatorConfig::new(IndicatorKind::Rsi, 14, Interval::MIN_1);
    let vwap = IndicatorConfig::new(IndicatorKind::Vwap, 0, Interval::MIN_1);
    assert!(fx.coordinator.add_indicator("SYMX", rsi).success);
    assert!(fx.coordinator.add_indicator("SYMX", vwap).success);
    assert!(
        !fx.session_data
            .get_indicator("SYMX", "rsi_14_1m", true)
            .unwrap()
            .valid
    );

    replay_day(&fx, "SYMX", day, Some(30));

    // RSI needs 15 bars; VWAP is valid from the first.
    let rsi_data = fx
        .session_data
        .get_indicator("SYMX", "rsi_14_1m", true)
        .unwrap();
    assert!(rsi_data.valid);
    let value = rsi_data.value.unwrap();
    assert!((0.0..=100.0).contains(&value));
    assert_eq!(
        rsi_data.updated_at,
        fx.session_data
            .get_latest_bar("SYMX", Interval::MIN_1, true)
            .map(|b| b.timestamp)
    );
    assert!(
        fx.session_data
            .get_indicator("SYMX", "vwap_0_1m", true)
            .unwrap()
            .valid
    );

    // Indicator advances made it onto the notification stream.
    let rx = fx.notifications.receiver();
    let mut saw_indicator = false;
    while let Ok(note) = rx.try_recv() {
        if note.kind == NotificationKind::Indicator {
            saw_indicator = true;
            break;
        }
    }
    assert!(saw_indicator);
}

#[test]
fn validity_respects_warm_up_count() {
    let day = date(2025, 1, 2);
    let fx = build(
        session_config(&["SYMX"], &["1m", "5m"], 0),
        TradingCalendar::us_equities(),
    );
    seed_session_day(&fx.store, &fx.calendar, "SYMX", day, &[]);

    fx.clock.set(fx.calendar.session_open_ms(day));
    fx.coordinator.start_session(day);
    fx.coordinator.initialize_from_config();

    let config = IndicatorConfig::new(IndicatorKind::Sma, 10, Interval::MIN_1);
    assert!(fx.coordinator.add_indicator("SYMX", config).success);

    // Nine bars: one short of the warm-up requirement.
    replay_day(&fx, "SYMX", day, Some(9));
    assert!(
        !fx.session_data
            .get_indicator("SYMX", "sma_10_1m", true)
            .unwrap()
            .valid
    );

    // The tenth flips validity.
    let open = fx.calendar.session_open_ms(day);
    let close = fx.calendar.session_close_ms(day);
    let bars = fx
        .store
        .get_bars("SYMX", Interval::MIN_1, open, close)
        .unwrap();
    fx.clock.advance_to(bars[9].timestamp);
    fx.coordinator
        .handle_driver_event(sessionr_core::events::DriverEvent::Bar(bars[9].clone()))
        .unwrap();

    let data = fx
        .session_data
        .get_indicator("SYMX", "sma_10_1m", true)
        .unwrap();
    assert!(data.valid);

    // Re-registering the same key is rejected at the public surface,
    // leaving the warmed instance untouched.
    let duplicate = fx.coordinator.add_indicator(
        "SYMX",
        IndicatorConfig::new(IndicatorKind::Sma, 10, Interval::MIN_1),
    );
    assert!(!duplicate.success);
    assert!(
        fx.session_data
            .get_indicator("SYMX", "sma_10_1m", true)
            .unwrap()
            .valid
    );
}

#[test]
fn indicator_on_derived_interval_follows_derived_bars() {
    let day = date(2025, 1, 2);
    let fx = build(
        session_config(&["SYMX"], &["1m", "5m"], 0),
        TradingCalendar::us_equities(),
    );
    seed_session_day(&fx.store, &fx.calendar, "SYMX", day, &[]);

    fx.clock.set(fx.calendar.session_open_ms(day));
    fx.coordinator.start_session(day);
    fx.coordinator.initialize_from_config();

    let config = IndicatorConfig::new(IndicatorKind::Sma, 3, Interval::MIN_5);
    assert!(fx.coordinator.add_indicator("SYMX", config).success);

    // 14 base bars -> two closed 5m windows: not enough for SMA(3).
    replay_day(&fx, "SYMX", day, Some(14));
    assert!(
        !fx.session_data
            .get_indicator("SYMX", "sma_3_5m", true)
            .unwrap()
            .valid
    );

    // 15 base bars close the third window and satisfy warm-up.
    replay_day(&fx, "SYMX", day, Some(15));
    let data = fx
        .session_data
        .get_indicator("SYMX", "sma_3_5m", true)
        .unwrap();
    assert!(data.valid);

    let five_min = fx
        .session_data
        .get_last_n_bars("SYMX", Interval::MIN_5, 3, true);
    let expected = five_min.iter().map(|b| b.close).sum::<f64>() / 3.0;
    assert!((data.value.unwrap() - expected).abs() < 1e-9);
}
