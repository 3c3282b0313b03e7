//! Shared fixture for the session-pipeline integration tests: an
//! in-memory store, a synthetic calendar and the full component stack
//! wired for inline (single-threaded, deterministic) processing.

#![allow(dead_code)]

use chrono::NaiveDate;
use sessionr_core::config::{
    ApiConfig, BacktestConfig, HistoricalConfig, HistoricalDataSpec, SessionConfig,
    SessionDataConfig, SessionMode, TradingConfig,
};
use sessionr_core::coordinator::SessionCoordinator;
use sessionr_core::events::DriverEvent;
use sessionr_core::{
    DataProcessor, IndicatorManager, NotificationQueue, NullFeedAdapter, QualityChecker,
    SessionData, StreamSubscription, SyncMode, VirtualClock,
};
use sessionr_data::{Bar, BarStore, Interval, TradingCalendar};
use std::sync::Arc;

pub struct Fixture {
    pub store: Arc<BarStore>,
    pub calendar: Arc<TradingCalendar>,
    pub session_data: Arc<SessionData>,
    pub indicators: Arc<IndicatorManager>,
    pub quality: Arc<QualityChecker>,
    pub notifications: Arc<NotificationQueue>,
    pub processor: Arc<DataProcessor>,
    pub coordinator: Arc<SessionCoordinator>,
    pub clock: Arc<VirtualClock>,
    pub analysis_sub: Arc<StreamSubscription>,
    pub coordinator_sub: Arc<StreamSubscription>,
}

pub fn session_config(symbols: &[&str], streams: &[&str], trailing_days: u32) -> SessionConfig {
    let historical = if trailing_days > 0 {
        HistoricalConfig {
            enable_quality: true,
            data: vec![HistoricalDataSpec {
                trailing_days,
                intervals: vec!["1m".to_string()],
            }],
            indicators: Default::default(),
        }
    } else {
        HistoricalConfig {
            enable_quality: true,
            ..Default::default()
        }
    };

    SessionConfig {
        session_name: "integration".to_string(),
        mode: SessionMode::Backtest,
        exchange_group: "us_equities".to_string(),
        asset_class: "equity".to_string(),
        backtest_config: Some(BacktestConfig {
            start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            speed_multiplier: 0.0,
            prefetch_days: 0,
        }),
        session_data_config: SessionDataConfig {
            symbols: symbols.iter().map(|s| s.to_string()).collect(),
            streams: streams.iter().map(|s| s.to_string()).collect(),
            derived_intervals: vec![],
            historical,
            gap_filler: Default::default(),
            streaming: Default::default(),
            scanners: vec![],
        },
        trading_config: TradingConfig {
            max_buying_power: 100_000.0,
            max_per_trade: 10_000.0,
            max_per_symbol: 20_000.0,
            max_open_positions: 5,
        },
        api_config: ApiConfig {
            data_api: "store".to_string(),
            trade_api: "none".to_string(),
        },
    }
}

pub fn build(config: SessionConfig, calendar: TradingCalendar) -> Fixture {
    let store = Arc::new(BarStore::new_memory().unwrap());
    let calendar = Arc::new(calendar);
    let session_data = Arc::new(SessionData::new());
    let indicators = Arc::new(IndicatorManager::new());
    let quality = Arc::new(QualityChecker::new(Arc::clone(&calendar)));
    let notifications = Arc::new(NotificationQueue::new(65_536));
    let clock = Arc::new(VirtualClock::new(0));

    let analysis_sub = Arc::new(StreamSubscription::new(SyncMode::DataDriven, "analysis"));
    let coordinator_sub = Arc::new(StreamSubscription::new(SyncMode::DataDriven, "coordinator"));
    let processor = Arc::new(DataProcessor::new(
        Arc::clone(&session_data),
        Arc::clone(&indicators),
        Arc::clone(&calendar),
        Arc::clone(&notifications),
        Arc::clone(&analysis_sub),
        Arc::clone(&coordinator_sub),
        SyncMode::DataDriven,
    ));

    let coordinator = Arc::new(SessionCoordinator::new(
        config,
        Arc::clone(&session_data),
        Arc::clone(&store) as Arc<dyn sessionr_core::HistoricalStore>,
        Arc::new(NullFeedAdapter::new()),
        Arc::clone(&calendar),
        Arc::clone(&quality),
        Arc::clone(&indicators),
        Arc::clone(&processor),
        Arc::clone(&clock) as Arc<dyn sessionr_core::Clock>,
    ));

    Fixture {
        store,
        calendar,
        session_data,
        indicators,
        quality,
        notifications,
        processor,
        coordinator,
        clock,
        analysis_sub,
        coordinator_sub,
    }
}

pub fn minute_bar(symbol: &str, ts: i64, close: f64) -> Bar {
    Bar::new(
        symbol,
        Interval::MIN_1,
        ts,
        close,
        close + 0.5,
        close - 0.5,
        close,
        1_000,
    )
}

/// Seed a full session of 1m bars for `date`, skipping the given
/// minute offsets from the open.
pub fn seed_session_day(
    store: &BarStore,
    calendar: &TradingCalendar,
    symbol: &str,
    date: NaiveDate,
    skip_minutes: &[i64],
) -> usize {
    let open = calendar.session_open_ms(date);
    let minutes = calendar.session_minutes(date);
    let bars: Vec<Bar> = (0..minutes)
        .filter(|i| !skip_minutes.contains(i))
        .map(|i| minute_bar(symbol, open + i * 60_000, 100.0 + (i % 13) as f64 * 0.25))
        .collect();
    let count = bars.len();
    store.bulk_upsert(&bars).unwrap();
    count
}

/// Seed the `days` trading days before `date`.
pub fn seed_trailing_days(
    store: &BarStore,
    calendar: &TradingCalendar,
    symbol: &str,
    date: NaiveDate,
    days: u32,
) {
    let mut cursor = date;
    for _ in 0..days {
        cursor = calendar.prev_trading_day(cursor, 1).unwrap();
        seed_session_day(store, calendar, symbol, cursor, &[]);
    }
}

/// Replay `date`'s stored bars for one symbol through the coordinator,
/// advancing the virtual clock as a driver would. Stops after
/// `limit_minutes` bars when given.
pub fn replay_day(fx: &Fixture, symbol: &str, date: NaiveDate, limit_minutes: Option<usize>) {
    let open = fx.calendar.session_open_ms(date);
    let close = fx.calendar.session_close_ms(date);
    let bars = fx
        .store
        .get_bars(symbol, Interval::MIN_1, open, close)
        .unwrap();
    let take = limit_minutes.unwrap_or(bars.len());
    for bar in bars.into_iter().take(take) {
        fx.clock.advance_to(bar.timestamp);
        fx.coordinator
            .handle_driver_event(DriverEvent::Bar(bar))
            .unwrap();
    }
}
