//! Wires the long-lived workers together: driver, coordinator,
//! processor, scanner scheduler, boundary monitor and prefetch.

use crate::clock::{Clock, VirtualClock, WallClock};
use crate::config::{SessionConfig, SessionMode};
use crate::coordinator::SessionCoordinator;
use crate::drivers::{BacktestDriver, LiveDriver};
use crate::events::{DriverEvent, NotificationQueue, ProcessorMessage};
use crate::indicators::IndicatorManager;
use crate::interfaces::{ExecutionAdapter, FeedAdapter, HistoricalStore};
use crate::processor::DataProcessor;
use crate::quality::QualityChecker;
use crate::scanner::ScannerManager;
use crate::session::SessionData;
use crate::sync::{StreamSubscription, SyncMode};
use anyhow::{bail, Context, Result};
use crossbeam_channel::bounded;
use sessionr_data::{ms_to_date, TradingCalendar};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{info, warn};

const DRIVER_QUEUE_CAPACITY: usize = 1024;
const PROCESSOR_QUEUE_CAPACITY: usize = 64;
const NOTIFICATION_QUEUE_CAPACITY: usize = 4096;
const MONITOR_TICK: Duration = Duration::from_millis(500);
const SCANNER_POLL: Duration = Duration::from_millis(1000);

pub struct SessionRuntime {
    coordinator: Arc<SessionCoordinator>,
    processor: Arc<DataProcessor>,
    notifications: Arc<NotificationQueue>,
    session_data: Arc<SessionData>,
    handles: Vec<JoinHandle<()>>,
    proc_tx: crossbeam_channel::Sender<ProcessorMessage>,
    init_reports: Vec<crate::coordinator::SymbolReport>,
}

impl SessionRuntime {
    /// Build every component, run batch initialization and spawn the
    /// worker threads. Fails when the config is invalid or when no
    /// configured symbol loads.
    pub fn launch(
        config: SessionConfig,
        store: Arc<dyn HistoricalStore>,
        feed: Arc<dyn FeedAdapter>,
        execution: Arc<dyn ExecutionAdapter>,
        calendar: Arc<TradingCalendar>,
    ) -> Result<Self> {
        config.validate().context("session config rejected")?;

        let mode = match config.mode {
            SessionMode::Backtest => SyncMode::DataDriven,
            SessionMode::Live => SyncMode::Live,
        };
        let session_data = Arc::new(SessionData::new());
        let indicators = Arc::new(IndicatorManager::new());
        let quality = Arc::new(QualityChecker::new(Arc::clone(&calendar)));
        let notifications = Arc::new(NotificationQueue::new(NOTIFICATION_QUEUE_CAPACITY));

        let virtual_clock = Arc::new(VirtualClock::new(0));
        let clock: Arc<dyn Clock> = match config.mode {
            SessionMode::Backtest => Arc::clone(&virtual_clock) as Arc<dyn Clock>,
            SessionMode::Live => Arc::new(WallClock),
        };

        let analysis_sub = Arc::new(StreamSubscription::new(mode, "analysis"));
        let coordinator_sub = Arc::new(StreamSubscription::new(mode, "coordinator"));
        let processor = Arc::new(DataProcessor::new(
            Arc::clone(&session_data),
            Arc::clone(&indicators),
            Arc::clone(&calendar),
            Arc::clone(&notifications),
            Arc::clone(&analysis_sub),
            Arc::clone(&coordinator_sub),
            mode,
        ));

        let coordinator = Arc::new(SessionCoordinator::new(
            config.clone(),
            Arc::clone(&session_data),
            Arc::clone(&store),
            Arc::clone(&feed),
            Arc::clone(&calendar),
            Arc::clone(&quality),
            Arc::clone(&indicators),
            Arc::clone(&processor),
            Arc::clone(&clock),
        ));

        // Session start date by mode.
        let start_date = match config.mode {
            SessionMode::Backtest => {
                let backtest = config
                    .backtest_config
                    .as_ref()
                    .expect("validated: backtest_config present");
                let date = backtest.start_date;
                if calendar.is_trading_day(date) {
                    date
                } else {
                    calendar
                        .next_trading_day(date, 1)
                        .context("no trading day in backtest range")?
                }
            }
            SessionMode::Live => {
                let today = ms_to_date(clock.now_ms()).context("clock out of range")?;
                if calendar.is_trading_day(today) {
                    today
                } else {
                    calendar
                        .next_trading_day(today, 1)
                        .context("no upcoming trading day")?
                }
            }
        };
        if config.mode == SessionMode::Backtest {
            virtual_clock.set(calendar.session_open_ms(start_date));
        }

        coordinator.start_session(start_date);
        let reports = coordinator.initialize_from_config();
        let loaded = reports.iter().filter(|r| r.outcome.success).count();
        info!(loaded, total = reports.len(), "batch initialization complete");
        if loaded == 0 {
            bail!("no symbols loaded; session aborted");
        }

        // Scanners share the provisioning path.
        let mut scanners = ScannerManager::new(
            Arc::clone(&coordinator),
            Arc::clone(&session_data),
            Arc::clone(&execution),
            Arc::clone(&indicators),
            Arc::clone(&clock),
        );
        scanners.load_from_config(&config.session_data_config.scanners);
        scanners.run_pre_session();
        let scanners = Arc::new(scanners);

        // Worker wiring: driver -> coordinator -> processor.
        let (driver_tx, driver_rx) = bounded::<DriverEvent>(DRIVER_QUEUE_CAPACITY);
        let (proc_tx, proc_rx) = bounded::<ProcessorMessage>(PROCESSOR_QUEUE_CAPACITY);
        coordinator.attach_processor_channel(proc_tx.clone());

        let mut handles = Vec::new();

        {
            let processor = Arc::clone(&processor);
            handles.push(
                std::thread::Builder::new()
                    .name("processor".to_string())
                    .spawn(move || processor.run(proc_rx))?,
            );
        }
        {
            let coordinator = Arc::clone(&coordinator);
            handles.push(
                std::thread::Builder::new()
                    .name("coordinator".to_string())
                    .spawn(move || coordinator.run(driver_rx))?,
            );
        }

        let stop_flag = coordinator.stop_flag();
        match config.mode {
            SessionMode::Backtest => {
                let backtest = config
                    .backtest_config
                    .clone()
                    .expect("validated: backtest_config present");
                let config_symbols: Vec<String> = config
                    .session_data_config
                    .symbols
                    .iter()
                    .map(|s| s.trim().to_uppercase())
                    .collect();
                let driver = BacktestDriver::new(
                    Arc::clone(&store),
                    Arc::clone(&calendar),
                    Arc::clone(&session_data),
                    Arc::clone(&virtual_clock),
                    config_symbols,
                    coordinator.base_interval(),
                    start_date,
                    backtest.end_date,
                    backtest.speed_multiplier,
                    coordinator.pause_gate(),
                    Arc::clone(&stop_flag),
                    driver_tx,
                );
                handles.push(
                    std::thread::Builder::new()
                        .name("backtest-driver".to_string())
                        .spawn(move || driver.run())?,
                );
            }
            SessionMode::Live => {
                let driver = LiveDriver::new(
                    Arc::clone(&feed),
                    config.session_data_config.symbols.clone(),
                    coordinator.pause_gate(),
                    Arc::clone(&stop_flag),
                    driver_tx,
                );
                handles.push(
                    std::thread::Builder::new()
                        .name("live-driver".to_string())
                        .spawn(move || driver.run())?,
                );

                // Prefetch only matters against the wall clock.
                let trailing_days = config
                    .backtest_config
                    .as_ref()
                    .map(|b| b.prefetch_days)
                    .unwrap_or(5);
                let prefetch = crate::prefetch::PrefetchManager::new(
                    Arc::clone(&store),
                    Arc::clone(&session_data),
                    Arc::clone(&calendar),
                    Arc::clone(&clock),
                    config.session_data_config.symbols.clone(),
                    coordinator.base_interval(),
                    trailing_days,
                    60,
                );
                let prefetch_stop = Arc::clone(&stop_flag);
                handles.push(
                    std::thread::Builder::new()
                        .name("prefetch".to_string())
                        .spawn(move || prefetch.run(prefetch_stop))?,
                );
            }
        }

        {
            let coordinator = Arc::clone(&coordinator);
            let stop = Arc::clone(&stop_flag);
            handles.push(
                std::thread::Builder::new()
                    .name("boundary-monitor".to_string())
                    .spawn(move || {
                        while !stop.load(Ordering::SeqCst) {
                            coordinator.monitor_tick();
                            std::thread::sleep(MONITOR_TICK);
                        }
                    })?,
            );
        }
        {
            let scanners = Arc::clone(&scanners);
            let stop = Arc::clone(&stop_flag);
            handles.push(
                std::thread::Builder::new()
                    .name("scanner-scheduler".to_string())
                    .spawn(move || {
                        while !stop.load(Ordering::SeqCst) {
                            scanners.poll();
                            std::thread::sleep(SCANNER_POLL);
                        }
                        scanners.teardown();
                    })?,
            );
        }

        // Gap repair runs as session upkeep while the market is open.
        {
            let gap_filler = crate::coordinator::GapFiller::new(
                Arc::clone(&store),
                Arc::clone(&session_data),
                Arc::clone(&quality),
                Arc::clone(&processor),
                Arc::clone(&calendar),
                config.session_data_config.gap_filler.clone(),
            );
            let coordinator = Arc::clone(&coordinator);
            let session_data = Arc::clone(&session_data);
            let stop = Arc::clone(&stop_flag);
            let base = coordinator.base_interval();
            let interval_secs = config
                .session_data_config
                .gap_filler
                .retry_interval_seconds
                .max(1);
            handles.push(
                std::thread::Builder::new()
                    .name("gap-filler".to_string())
                    .spawn(move || {
                        while !stop.load(Ordering::SeqCst) {
                            if matches!(
                                coordinator.boundary_state(),
                                crate::coordinator::BoundaryState::Active
                            ) {
                                if let Some(date) = session_data.session_date() {
                                    for symbol in session_data.get_active_symbols(true) {
                                        gap_filler.fill_once(&symbol, base, date);
                                    }
                                }
                            }
                            for _ in 0..interval_secs * 2 {
                                if stop.load(Ordering::SeqCst) {
                                    break;
                                }
                                std::thread::sleep(Duration::from_millis(500));
                            }
                        }
                    })?,
            );
        }

        Ok(Self {
            coordinator,
            processor,
            notifications,
            session_data,
            handles,
            proc_tx,
            init_reports: reports,
        })
    }

    pub fn init_reports(&self) -> &[crate::coordinator::SymbolReport] {
        &self.init_reports
    }

    pub fn coordinator(&self) -> Arc<SessionCoordinator> {
        Arc::clone(&self.coordinator)
    }

    pub fn session_data(&self) -> Arc<SessionData> {
        Arc::clone(&self.session_data)
    }

    pub fn notifications(&self) -> Arc<NotificationQueue> {
        Arc::clone(&self.notifications)
    }

    /// Block until the coordinator worker finishes (stream drained or
    /// session stopped), then stop and join the remaining workers.
    pub fn join(mut self) {
        // Coordinator is the second spawned handle.
        if self.handles.len() > 1 {
            let coordinator_handle = self.handles.remove(1);
            if coordinator_handle.join().is_err() {
                warn!("coordinator worker panicked");
            }
        }
        self.shutdown_workers();
    }

    pub fn shutdown(mut self) {
        self.coordinator.stop_session();
        self.shutdown_workers();
    }

    fn shutdown_workers(&mut self) {
        self.coordinator.stop_flag().store(true, Ordering::SeqCst);
        self.coordinator.pause_gate().resume();
        let _ = self.proc_tx.send(ProcessorMessage::Shutdown);
        self.processor.stop_subscriptions();
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                warn!("worker thread panicked during shutdown");
            }
        }
    }
}
