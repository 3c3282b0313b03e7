//! Full worker wiring: driver, coordinator and processor threads
//! replaying a complete day through the bounded channels.

mod common;

use chrono::NaiveDate;
use common::{seed_session_day, seed_trailing_days, session_config};
use sessionr_core::{NullExecutionAdapter, NullFeedAdapter, SessionRuntime};
use sessionr_data::{BarStore, Interval, TradingCalendar};
use std::sync::Arc;

#[test]
fn threaded_replay_of_one_day() {
    let day = NaiveDate::from_ymd_opt(2025, 1, 2).unwrap();
    let calendar = Arc::new(TradingCalendar::us_equities());
    let store = Arc::new(BarStore::new_memory().unwrap());
    seed_trailing_days(&store, &calendar, "AAPL", day, 1);
    seed_session_day(&store, &calendar, "AAPL", day, &[]);

    let mut config = session_config(&["AAPL"], &["1m", "5m"], 1);
    config.backtest_config.as_mut().unwrap().start_date = day;
    config.backtest_config.as_mut().unwrap().end_date = day;

    let runtime = SessionRuntime::launch(
        config,
        Arc::clone(&store) as Arc<dyn sessionr_core::HistoricalStore>,
        Arc::new(NullFeedAdapter::new()),
        Arc::new(NullExecutionAdapter),
        Arc::clone(&calendar),
    )
    .expect("runtime launch");

    let reports = runtime.init_reports().to_vec();
    assert_eq!(reports.len(), 1);
    assert!(reports[0].outcome.success);

    let session_data = runtime.session_data();
    runtime.join();

    // Trailing day plus the replayed session, all derived.
    assert_eq!(
        session_data.get_bar_count("AAPL", Interval::MIN_1, true),
        2 * 390
    );
    assert_eq!(
        session_data.get_bar_count("AAPL", Interval::MIN_5, true),
        2 * 78
    );

    let symbol = session_data.get_symbol_data("AAPL", true).unwrap();
    assert_eq!(symbol.metrics.bar_count, 390);
    assert_eq!(symbol.quality, 100.0);

    // Ordering invariant held end to end.
    let bars = session_data.get_last_n_bars("AAPL", Interval::MIN_1, usize::MAX, true);
    assert!(bars.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
}
