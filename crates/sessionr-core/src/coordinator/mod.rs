//! The session coordinator: unified three-phase symbol/interval/
//! indicator lifecycle, bar ingestion, session boundaries and
//! lag-based session control.

pub mod boundary;
pub mod gap_filler;
pub mod lag;
pub mod pause;
pub mod provision;

pub use boundary::BoundaryState;
pub use gap_filler::GapFiller;
pub use lag::{LagAction, LagController};
pub use pause::PauseGate;
pub use provision::{
    OperationKind, ProvisionOutcome, ProvisionStep, ProvisioningRequirements, SymbolReport,
    ValidationResult,
};

use crate::clock::Clock;
use crate::config::{SessionConfig, SessionMode};
use crate::errors::SessionError;
use crate::events::{DriverEvent, ProcessorMessage};
use crate::indicators::{IndicatorConfig, IndicatorManager};
use crate::interfaces::{FeedAdapter, HistoricalStore};
use crate::processor::DataProcessor;
use crate::quality::QualityChecker;
use crate::session::{AddedBy, Provenance, SessionData};
use crate::sync::{StreamSubscription, SyncMode};
use chrono::NaiveDate;
use crossbeam_channel::{Receiver, Sender};
use sessionr_data::{ms_to_date, Bar, Interval, TradingCalendar};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, error, info, warn};

pub struct SessionCoordinator {
    config: SessionConfig,
    base_interval: Interval,
    derived_intervals: Vec<Interval>,
    session_data: Arc<SessionData>,
    store: Arc<dyn HistoricalStore>,
    feed: Arc<dyn FeedAdapter>,
    calendar: Arc<TradingCalendar>,
    quality: Arc<QualityChecker>,
    indicators: Arc<IndicatorManager>,
    processor: Arc<DataProcessor>,
    clock: Arc<dyn Clock>,
    mode: SyncMode,
    /// When a processor worker is attached, bars go through this
    /// channel; otherwise processing runs inline on the caller.
    proc_tx: Mutex<Option<Sender<ProcessorMessage>>>,
    proc_sub: Arc<StreamSubscription>,
    stream_paused: Arc<PauseGate>,
    /// Serializes every three-phase request from scanners/strategies.
    symbol_ops: Mutex<()>,
    lag: Mutex<LagController>,
    boundary: RwLock<BoundaryState>,
    last_data_ms: AtomicI64,
    session_started: AtomicBool,
    stop_flag: Arc<AtomicBool>,
}

impl SessionCoordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: SessionConfig,
        session_data: Arc<SessionData>,
        store: Arc<dyn HistoricalStore>,
        feed: Arc<dyn FeedAdapter>,
        calendar: Arc<TradingCalendar>,
        quality: Arc<QualityChecker>,
        indicators: Arc<IndicatorManager>,
        processor: Arc<DataProcessor>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        // Config is validated at load time; these cannot fail here.
        let base_interval = config.base_interval().unwrap_or(Interval::MIN_1);
        let derived_intervals = config.derived_intervals().unwrap_or_default();
        let mode = match config.mode {
            SessionMode::Backtest => SyncMode::DataDriven,
            SessionMode::Live => SyncMode::Live,
        };
        let streaming = config.session_data_config.streaming.clone();
        let proc_sub = processor.coordinator_subscription();

        Self {
            config,
            base_interval,
            derived_intervals,
            session_data,
            store,
            feed,
            calendar,
            quality,
            indicators,
            processor,
            clock,
            mode,
            proc_tx: Mutex::new(None),
            proc_sub,
            stream_paused: Arc::new(PauseGate::new()),
            symbol_ops: Mutex::new(()),
            lag: Mutex::new(LagController::new(
                streaming.catchup_check_interval,
                streaming.catchup_threshold_seconds,
            )),
            boundary: RwLock::new(BoundaryState::NotStarted),
            last_data_ms: AtomicI64::new(0),
            session_started: AtomicBool::new(false),
            stop_flag: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn base_interval(&self) -> Interval {
        self.base_interval
    }

    pub fn session_data(&self) -> Arc<SessionData> {
        Arc::clone(&self.session_data)
    }

    pub fn pause_gate(&self) -> Arc<PauseGate> {
        Arc::clone(&self.stream_paused)
    }

    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop_flag)
    }

    pub fn attach_processor_channel(&self, tx: Sender<ProcessorMessage>) {
        *self.proc_tx.lock().unwrap_or_else(|e| e.into_inner()) = Some(tx);
    }

    pub fn boundary_state(&self) -> BoundaryState {
        *self.boundary.read().unwrap_or_else(|e| e.into_inner())
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    pub fn start_session(&self, date: NaiveDate) {
        self.session_data.set_session_date(Some(date));
        self.session_data.activate_session();
        self.session_started.store(true, Ordering::SeqCst);
        *self.boundary.write().unwrap_or_else(|e| e.into_inner()) = BoundaryState::PreMarket;
        info!(%date, session = %self.config.session_name, "session started");
    }

    /// Unconditional teardown: nothing survives to the next day except
    /// through the external bar store.
    pub fn stop_session(&self) {
        self.stop_flag.store(true, Ordering::SeqCst);
        self.session_data.deactivate_session();
        self.session_data.clear();
        self.indicators.clear();
        self.lag.lock().unwrap_or_else(|e| e.into_inner()).reset();
        self.session_started.store(false, Ordering::SeqCst);
        *self.boundary.write().unwrap_or_else(|e| e.into_inner()) = BoundaryState::Ended;
        info!(session = %self.config.session_name, "session stopped");
    }

    pub fn pause_backtest(&self) {
        self.stream_paused.pause();
        info!("backtest paused");
    }

    pub fn resume_backtest(&self) {
        self.stream_paused.resume();
        info!("backtest resumed");
    }

    /// Day roll after ENDED: teardown, advance through the calendar,
    /// reload from config. Returns the next session date, or None when
    /// the configured range is exhausted.
    pub fn roll_session(&self) -> Option<NaiveDate> {
        let current = self.session_data.session_date()?;
        let next = self.calendar.next_trading_day(current, 1)?;
        if let Some(backtest) = &self.config.backtest_config {
            if next > backtest.end_date {
                info!(%current, "backtest range exhausted");
                return None;
            }
        }

        info!(from = %current, to = %next, "rolling session");
        self.session_data.deactivate_session();
        self.session_data.clear();
        self.indicators.clear();
        self.lag.lock().unwrap_or_else(|e| e.into_inner()).reset();

        self.start_session(next);
        self.initialize_from_config();
        Some(next)
    }

    /// Batch initialization: provision every configured symbol,
    /// reporting per-symbol success. The caller aborts the session
    /// only when no symbol loads.
    pub fn initialize_from_config(&self) -> Vec<SymbolReport> {
        let symbols = self.config.session_data_config.symbols.clone();
        let mut reports = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            let outcome = self.add_symbol(&symbol, AddedBy::Config);
            let quality = self
                .session_data
                .get_symbol_data(&normalize(&symbol), true)
                .map(|d| d.quality);
            if !outcome.success {
                warn!(
                    symbol = symbol.as_str(),
                    reason = outcome.reason.as_deref().unwrap_or("unknown"),
                    "symbol failed to initialize"
                );
            }
            reports.push(SymbolReport {
                symbol: normalize(&symbol),
                outcome,
                quality,
            });
        }

        // Configured indicators apply to every loaded symbol.
        let indicator_specs: Vec<IndicatorConfig> = self
            .config
            .session_data_config
            .historical
            .indicators
            .values()
            .filter_map(|spec| {
                let kind = spec.kind.parse().ok()?;
                let interval = spec.interval.parse().ok()?;
                Some(IndicatorConfig {
                    kind,
                    period: spec.period,
                    interval,
                    params: spec.params.clone(),
                })
            })
            .collect();
        for report in reports.iter().filter(|r| r.outcome.success) {
            for spec in &indicator_specs {
                let outcome = self.add_indicator(&report.symbol, spec.clone());
                if !outcome.success {
                    warn!(
                        symbol = report.symbol.as_str(),
                        key = spec.key().as_str(),
                        reason = outcome.reason.as_deref().unwrap_or("unknown"),
                        "indicator failed to register"
                    );
                }
            }
        }

        reports
    }

    // ------------------------------------------------------------------
    // Public add-operations (three-phase pipeline)
    // ------------------------------------------------------------------

    pub fn add_symbol(&self, symbol: &str, added_by: AddedBy) -> ProvisionOutcome {
        let symbol = normalize(symbol);
        let _guard = self.symbol_ops.lock().unwrap_or_else(|e| e.into_inner());

        let mut requirements = self.analyze_symbol(&symbol, added_by);
        self.validate(&mut requirements);
        if !requirements.validation.can_proceed {
            let reason = requirements
                .validation
                .reason
                .clone()
                .unwrap_or_else(|| "validation failed".to_string());
            debug!(symbol = symbol.as_str(), reason = reason.as_str(), "add_symbol rejected");
            return ProvisionOutcome::failed(reason);
        }

        self.execute_mid_session_aware(requirements)
    }

    pub fn add_indicator(&self, symbol: &str, config: IndicatorConfig) -> ProvisionOutcome {
        let symbol = normalize(symbol);
        let _guard = self.symbol_ops.lock().unwrap_or_else(|e| e.into_inner());

        let mut requirements = self.analyze_indicator(&symbol, config);
        self.validate(&mut requirements);
        if !requirements.validation.can_proceed {
            let reason = requirements
                .validation
                .reason
                .clone()
                .unwrap_or_else(|| "validation failed".to_string());
            debug!(symbol = symbol.as_str(), reason = reason.as_str(), "add_indicator rejected");
            return ProvisionOutcome::failed(reason);
        }

        self.execute_mid_session_aware(requirements)
    }

    pub fn add_interval(&self, symbol: &str, interval: Interval) -> ProvisionOutcome {
        let symbol = normalize(symbol);
        let _guard = self.symbol_ops.lock().unwrap_or_else(|e| e.into_inner());

        let mut requirements = self.analyze_interval(&symbol, interval);
        self.validate(&mut requirements);
        if !requirements.validation.can_proceed {
            let reason = requirements
                .validation
                .reason
                .clone()
                .unwrap_or_else(|| "validation failed".to_string());
            return ProvisionOutcome::failed(reason);
        }

        self.execute_mid_session_aware(requirements)
    }

    // ------------------------------------------------------------------
    // Phase 1: analyze
    // ------------------------------------------------------------------

    fn analyze_symbol(&self, symbol: &str, added_by: AddedBy) -> ProvisioningRequirements {
        let existing = self.session_data.get_symbol_data(symbol, true);
        let mid_session = self.is_mid_session();

        let (operation, meets, auto) = match (&existing, added_by) {
            (None, AddedBy::Scanner) => (OperationKind::NewSymbol, false, true),
            (None, _) => (OperationKind::NewSymbol, true, false),
            (Some(data), _) if data.is_adhoc() && added_by != AddedBy::Scanner => {
                (OperationKind::UpgradeSymbol, true, false)
            }
            (Some(_), _) => (OperationKind::ExistingSymbol, true, false),
        };

        let historical_days = self.configured_historical_days();
        let mut steps = Vec::new();
        match operation {
            OperationKind::NewSymbol => {
                steps.push(ProvisionStep::CreateSymbol);
                for interval in &self.derived_intervals {
                    steps.push(ProvisionStep::AddInterval(*interval));
                }
                if historical_days > 0 {
                    steps.push(ProvisionStep::LoadHistorical);
                }
                if self.config.session_data_config.historical.enable_quality {
                    steps.push(ProvisionStep::CalculateQuality);
                }
            }
            OperationKind::UpgradeSymbol => {
                steps.push(ProvisionStep::UpgradeSymbol);
                let present = existing.as_ref().map(|d| d.intervals.keys().copied().collect::<Vec<_>>()).unwrap_or_default();
                for interval in &self.derived_intervals {
                    if !present.contains(interval) {
                        steps.push(ProvisionStep::AddInterval(*interval));
                    }
                }
                if historical_days > 0 {
                    steps.push(ProvisionStep::LoadHistorical);
                }
                if self.config.session_data_config.historical.enable_quality {
                    steps.push(ProvisionStep::CalculateQuality);
                }
            }
            // Re-adding a full symbol is a successful no-op.
            _ => {}
        }

        ProvisioningRequirements {
            operation,
            symbol: symbol.to_string(),
            source: added_by,
            required_intervals: self.session_intervals(),
            base_interval: self.base_interval,
            historical_days,
            needs_session: mid_session,
            indicator: None,
            meets_session_config_requirements: meets,
            auto_provisioned: auto,
            steps,
            validation: ValidationResult::passed(),
        }
    }

    fn analyze_indicator(
        &self,
        symbol: &str,
        config: IndicatorConfig,
    ) -> ProvisioningRequirements {
        let requirements = crate::requirements::indicator_requirements(
            &config,
            self.base_interval,
            &self.calendar,
            self.session_date_or_today(),
        );
        let mid_session = self.is_mid_session();

        let mut steps = Vec::new();
        let target = config.interval;
        let have_symbol = self.session_data.contains_symbol(symbol);
        if have_symbol
            && target != self.base_interval
            && self
                .session_data
                .get_symbol_data(symbol, true)
                .map(|d| !d.intervals.contains_key(&target))
                .unwrap_or(false)
        {
            steps.push(ProvisionStep::AddInterval(target));
        }
        steps.push(ProvisionStep::RegisterIndicator(config.clone()));

        ProvisioningRequirements {
            operation: OperationKind::NewIndicator,
            symbol: symbol.to_string(),
            source: AddedBy::Strategy,
            required_intervals: requirements.required_intervals,
            base_interval: self.base_interval,
            historical_days: requirements.historical_days,
            needs_session: mid_session,
            indicator: Some(config),
            meets_session_config_requirements: true,
            auto_provisioned: false,
            steps,
            validation: ValidationResult::passed(),
        }
    }

    fn analyze_interval(&self, symbol: &str, interval: Interval) -> ProvisioningRequirements {
        let mid_session = self.is_mid_session();
        ProvisioningRequirements {
            operation: OperationKind::NewInterval,
            symbol: symbol.to_string(),
            source: AddedBy::Strategy,
            required_intervals: vec![self.base_interval, interval],
            base_interval: self.base_interval,
            historical_days: 0,
            needs_session: mid_session,
            indicator: None,
            meets_session_config_requirements: true,
            auto_provisioned: false,
            steps: vec![ProvisionStep::AddInterval(interval)],
            validation: ValidationResult::passed(),
        }
    }

    // ------------------------------------------------------------------
    // Phase 2: validate
    // ------------------------------------------------------------------

    fn validate(&self, requirements: &mut ProvisioningRequirements) {
        let symbol = requirements.symbol.clone();
        let mut result = ValidationResult::passed();

        // Data source: the replay source is the store, live is the feed.
        result.data_source_available = match self.config.mode {
            SessionMode::Backtest => matches!(self.store.date_range(&symbol), Ok(Some(_))),
            SessionMode::Live => self.feed.knows_symbol(&symbol),
        };
        if !result.data_source_available {
            result.can_proceed = false;
            result.reason = Some(format!("{symbol}: no data source available"));
            requirements.validation = result;
            return;
        }

        // Interval derivability against the session base.
        for interval in &requirements.required_intervals {
            if *interval != requirements.base_interval
                && !interval.derives_from(&requirements.base_interval)
            {
                result.intervals_derivable = false;
                result.can_proceed = false;
                result.reason = Some(format!(
                    "{symbol}: interval {interval} not derivable from base {}",
                    requirements.base_interval
                ));
                requirements.validation = result;
                return;
            }
        }

        // Duplicate indicator keys are rejected before provisioning.
        if let Some(indicator) = &requirements.indicator {
            let key = indicator.key();
            if self.session_data.has_indicator(&symbol, &key)
                || self.indicators.contains(&symbol, &key)
            {
                result.duplicate = true;
                result.can_proceed = false;
                result.reason = Some(format!("{symbol}: indicator {key} already registered"));
                requirements.validation = result;
                return;
            }
        }

        // Historical coverage: total absence is a hard reject, partial
        // coverage proceeds with a warning.
        if requirements
            .steps
            .iter()
            .any(|s| matches!(s, ProvisionStep::LoadHistorical))
            && requirements.historical_days > 0
        {
            let (start_ms, end_ms) = self.historical_window(requirements.historical_days);
            match self
                .store
                .has_data(&symbol, requirements.base_interval, start_ms, end_ms)
            {
                Ok(true) => {
                    if let Ok(Some((min_ts, _))) = self.store.date_range(&symbol) {
                        if min_ts > start_ms {
                            warn!(
                                symbol,
                                requested_days = requirements.historical_days,
                                "partial historical coverage; proceeding"
                            );
                        }
                    }
                }
                Ok(false) => {
                    result.historical_available = false;
                    result.can_proceed = false;
                    result.reason =
                        Some(format!("{symbol}: no historical data in requested window"));
                    requirements.validation = result;
                    return;
                }
                Err(e) => {
                    result.historical_available = false;
                    result.can_proceed = false;
                    result.reason = Some(format!("{symbol}: store error: {e}"));
                    requirements.validation = result;
                    return;
                }
            }
        }

        requirements.validation = result;
    }

    // ------------------------------------------------------------------
    // Phase 3: provision
    // ------------------------------------------------------------------

    /// Mid-session additions run with the stream paused and the
    /// session gate closed; replay mode then catches the new symbol up
    /// to the virtual now before reactivation.
    fn execute_mid_session_aware(
        &self,
        requirements: ProvisioningRequirements,
    ) -> ProvisionOutcome {
        let mid_session = requirements.needs_session;
        if mid_session {
            self.stream_paused.pause();
            self.session_data.deactivate_session();
        }

        let mut outcome = self.execute(&requirements);

        if mid_session {
            if outcome.success && self.config.mode == SessionMode::Backtest {
                if let Err(e) = self.catch_up(&requirements.symbol) {
                    warn!(symbol = requirements.symbol.as_str(), error = %e, "catch-up failed");
                    outcome = ProvisionOutcome::failed(format!("catch-up failed: {e}"));
                }
            }
            self.session_data.activate_session();
            self.stream_paused.resume();
        }
        outcome
    }

    /// Execute the ordered steps, stopping at the first failure.
    /// Completed steps are not rolled back; idempotent registration
    /// makes a retry of the whole request safe.
    fn execute(&self, requirements: &ProvisioningRequirements) -> ProvisionOutcome {
        for step in &requirements.steps {
            let ok = match step {
                ProvisionStep::CreateSymbol => self.provision_create_symbol(requirements),
                ProvisionStep::UpgradeSymbol => self.provision_upgrade_symbol(requirements),
                ProvisionStep::AddInterval(interval) => {
                    self.provision_add_interval(requirements, *interval)
                }
                ProvisionStep::RegisterIndicator(config) => {
                    self.provision_register_indicator(requirements, config)
                }
                ProvisionStep::LoadHistorical => self.provision_load_historical(requirements),
                ProvisionStep::CalculateQuality => self.provision_calculate_quality(requirements),
            };
            if !ok {
                let reason = format!(
                    "provisioning stopped at step {}",
                    step.describe()
                );
                warn!(
                    symbol = requirements.symbol.as_str(),
                    reason = reason.as_str(),
                    "provisioning failed"
                );
                return ProvisionOutcome::failed(reason);
            }
        }
        ProvisionOutcome::ok()
    }

    fn provision_create_symbol(&self, requirements: &ProvisioningRequirements) -> bool {
        let provenance = Provenance {
            meets_session_config_requirements: requirements.meets_session_config_requirements,
            added_by: requirements.source,
            auto_provisioned: requirements.auto_provisioned,
            upgraded_from_adhoc: false,
            added_at: self.clock.now_ms(),
            locked: false,
        };
        self.session_data
            .register_symbol(&requirements.symbol, requirements.base_interval, provenance);
        true
    }

    fn provision_upgrade_symbol(&self, requirements: &ProvisioningRequirements) -> bool {
        match self.session_data.upgrade_symbol(&requirements.symbol) {
            Ok(()) => true,
            Err(e) => {
                warn!(symbol = requirements.symbol.as_str(), error = %e, "upgrade failed");
                false
            }
        }
    }

    fn provision_add_interval(
        &self,
        requirements: &ProvisioningRequirements,
        interval: Interval,
    ) -> bool {
        let derived_from = interval.derivation_source(&requirements.base_interval);
        match self
            .session_data
            .add_interval(&requirements.symbol, interval, derived_from)
        {
            Ok(_) => true,
            Err(e) => {
                warn!(symbol = requirements.symbol.as_str(), %interval, error = %e, "add interval failed");
                false
            }
        }
    }

    fn provision_register_indicator(
        &self,
        requirements: &ProvisioningRequirements,
        config: &IndicatorConfig,
    ) -> bool {
        // When LoadHistorical follows in the same plan, warm-up flows
        // through derivation; otherwise warm from bars already held.
        let history = if requirements
            .steps
            .iter()
            .any(|s| matches!(s, ProvisionStep::LoadHistorical))
        {
            Vec::new()
        } else {
            self.session_data
                .get_last_n_bars(&requirements.symbol, config.interval, usize::MAX, true)
        };

        let (_, data) = self
            .indicators
            .register(&requirements.symbol, config.clone(), &history);
        self.session_data
            .set_indicator(&requirements.symbol, &config.key(), data);
        true
    }

    fn provision_load_historical(&self, requirements: &ProvisioningRequirements) -> bool {
        let symbol = &requirements.symbol;
        if requirements.historical_days == 0 {
            return true;
        }
        // Prefetch may already have populated the trailing window.
        if !requirements.needs_session
            && self
                .session_data
                .get_bar_count(symbol, requirements.base_interval, true)
                > 0
        {
            debug!(symbol = symbol.as_str(), "historical data already present, skipping load");
            return true;
        }

        let (start_ms, end_ms) = self.historical_window(requirements.historical_days);
        let bars = match self
            .store
            .get_bars(symbol, requirements.base_interval, start_ms, end_ms)
        {
            Ok(bars) => bars,
            Err(e) => {
                warn!(symbol = symbol.as_str(), error = %e, "historical load failed");
                return false;
            }
        };
        info!(symbol = symbol.as_str(), count = bars.len(), "loading historical bars");

        for bar in bars {
            let timestamp = bar.timestamp;
            match self
                .session_data
                .append_bar(symbol, requirements.base_interval, bar)
            {
                Ok(()) => self.processor.process(symbol, timestamp, false),
                Err(SessionError::DuplicateBar { .. }) => {}
                Err(e) => {
                    warn!(symbol = symbol.as_str(), error = %e, "historical bar rejected");
                    return false;
                }
            }
        }
        true
    }

    fn provision_calculate_quality(&self, requirements: &ProvisioningRequirements) -> bool {
        let symbol = &requirements.symbol;
        let base = requirements.base_interval;
        let bars = self
            .session_data
            .get_last_n_bars(symbol, base, usize::MAX, true);
        let Some(first) = bars.first() else {
            self.session_data.set_symbol_quality(symbol, 0.0);
            return true;
        };
        let session_date = self.session_date_or_today();
        let start_date = ms_to_date(first.timestamp).unwrap_or(session_date);
        let last_date = ms_to_date(bars.last().map(|b| b.timestamp).unwrap_or(0))
            .unwrap_or(session_date);

        // Completed days are scored against the calendar; the running
        // session day against expectation-so-far.
        let mut scores = Vec::new();
        if start_date < session_date {
            let history_end = self
                .calendar
                .prev_trading_day(session_date, 1)
                .unwrap_or(start_date)
                .min(last_date);
            if history_end >= start_date {
                let historical: Vec<_> = bars
                    .iter()
                    .filter(|b| {
                        ms_to_date(b.timestamp)
                            .map(|d| d < session_date)
                            .unwrap_or(false)
                    })
                    .cloned()
                    .collect();
                let metrics =
                    self.quality
                        .check_bars(symbol, &historical, base, start_date, history_end);
                if let Some(score) = metrics.score_pct() {
                    scores.push(score);
                }
            }
        }
        if last_date == session_date {
            let open = self.calendar.session_open_ms(session_date);
            let close = self.calendar.session_close_ms(session_date);
            let today_count = bars
                .iter()
                .filter(|b| {
                    ms_to_date(b.timestamp)
                        .map(|d| d == session_date)
                        .unwrap_or(false)
                })
                .count();
            let session_score = self.quality.session_quality(
                open,
                close,
                self.clock.now_ms(),
                base,
                today_count,
            );
            scores.push(session_score);

            let today: Vec<_> = bars
                .iter()
                .filter(|b| b.timestamp >= open)
                .cloned()
                .collect();
            let horizon = self.clock.now_ms().clamp(open, close);
            let gaps = self
                .quality
                .find_gaps(&today, base, open, base.window_start(horizon));
            self.session_data.set_gaps(symbol, base, gaps);
        }

        let quality = scores.iter().copied().fold(f64::INFINITY, f64::min);
        let quality = if quality.is_finite() { quality } else { 100.0 };
        self.session_data.set_interval_quality(symbol, base, quality);
        self.session_data.set_symbol_quality(symbol, quality);
        debug!(symbol = symbol.as_str(), quality, "quality calculated");
        true
    }

    // ------------------------------------------------------------------
    // Bar ingestion
    // ------------------------------------------------------------------

    /// Coordinator worker loop over the driver stream.
    pub fn run(&self, rx: Receiver<DriverEvent>) {
        for event in rx.iter() {
            if self.stop_flag.load(Ordering::SeqCst) {
                break;
            }
            match self.handle_driver_event(event) {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => {
                    error!(error = %e, "fatal invariant violation, tearing session down");
                    self.stop_session();
                    break;
                }
            }
        }
        debug!("coordinator worker stopped");
    }

    /// Returns Ok(false) when the stream is finished.
    pub fn handle_driver_event(&self, event: DriverEvent) -> Result<bool, SessionError> {
        match event {
            DriverEvent::Bar(bar) => {
                self.ingest_bar(bar)?;
                Ok(true)
            }
            DriverEvent::SessionEnd(date) => {
                info!(%date, "session end from driver");
                Ok(self.roll_session().is_some())
            }
            DriverEvent::StreamEnd => Ok(false),
        }
    }

    /// Append one base bar, run lag control, hand off to the
    /// processor. Duplicates are dropped; timestamp regression is the
    /// one fatal error.
    pub fn ingest_bar(&self, bar: Bar) -> Result<(), SessionError> {
        let symbol = bar.symbol.clone();
        let timestamp = bar.timestamp;

        if !self.session_data.contains_symbol(&symbol) {
            debug!(symbol = symbol.as_str(), "bar for unprovisioned symbol dropped");
            return Ok(());
        }

        match self
            .session_data
            .append_bar(&symbol, self.base_interval, bar)
        {
            Ok(()) => {}
            Err(SessionError::DuplicateBar { .. }) => {
                warn!(symbol = symbol.as_str(), timestamp, "duplicate bar dropped");
                return Ok(());
            }
            Err(e @ SessionError::TimestampRegression { .. }) => return Err(e),
            Err(e) => {
                warn!(symbol = symbol.as_str(), timestamp, error = %e, "bar rejected");
                return Ok(());
            }
        }

        self.last_data_ms.store(self.clock.now_ms(), Ordering::SeqCst);
        self.run_lag_check(&symbol, timestamp);
        self.dispatch_to_processor(&symbol, timestamp, false);
        Ok(())
    }

    fn run_lag_check(&self, symbol: &str, bar_timestamp: i64) {
        let action = self
            .lag
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .on_bar(
                symbol,
                bar_timestamp,
                self.clock.now_ms(),
                self.session_data.is_session_active(),
            );
        match action {
            LagAction::Deactivate { lag_secs } => {
                info!(symbol, lag_secs, "lag over threshold, deactivating session");
                self.session_data.deactivate_session();
            }
            LagAction::Reactivate { lag_secs } => {
                info!(symbol, lag_secs, "caught up, reactivating session");
                self.session_data.activate_session();
            }
            LagAction::None => {}
        }
    }

    fn dispatch_to_processor(&self, symbol: &str, timestamp: i64, retro: bool) {
        let tx = self
            .proc_tx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        match tx {
            Some(tx) => {
                if tx
                    .send(ProcessorMessage::BarAppended {
                        symbol: symbol.to_string(),
                        timestamp,
                        retro,
                    })
                    .is_err()
                {
                    warn!(symbol, "processor channel closed");
                    return;
                }
                if self.mode.waits_for_ack() {
                    self.proc_sub.wait_until_ready(None);
                    self.proc_sub.reset();
                }
            }
            None => self.processor.process(symbol, timestamp, retro),
        }
    }

    /// Replay catch-up for a freshly provisioned symbol: drain stored
    /// bars from today's open through the virtual now, in order.
    fn catch_up(&self, symbol: &str) -> Result<(), SessionError> {
        let Some(date) = self.session_data.session_date() else {
            return Ok(());
        };
        let open = self.calendar.session_open_ms(date);
        let now = self.clock.now_ms();
        if now <= open {
            return Ok(());
        }

        let bars = self
            .store
            .get_bars(symbol, self.base_interval, open, now + 1)?;
        info!(symbol, count = bars.len(), "catching up queued bars");
        for bar in bars {
            let timestamp = bar.timestamp;
            match self
                .session_data
                .append_bar(symbol, self.base_interval, bar)
            {
                Ok(()) => self.processor.process(symbol, timestamp, false),
                Err(SessionError::DuplicateBar { .. }) => {}
                Err(e) => return Err(e),
            }
        }

        if self.config.session_data_config.historical.enable_quality {
            let requirements = self.analyze_symbol(symbol, AddedBy::Strategy);
            self.provision_calculate_quality(&requirements);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Boundary monitoring
    // ------------------------------------------------------------------

    /// One monitor-worker tick: recompute the boundary state; in live
    /// mode an Ended transition triggers the day roll. Timeout and
    /// Error are observable but never end the session by themselves.
    pub fn monitor_tick(&self) -> BoundaryState {
        let Some(date) = self.session_data.session_date() else {
            return self.boundary_state();
        };
        let last_data = match self.last_data_ms.load(Ordering::SeqCst) {
            0 => None,
            ms => Some(ms),
        };
        let state = boundary::evaluate(
            &self.calendar,
            date,
            self.clock.now_ms(),
            last_data,
            self.config
                .session_data_config
                .streaming
                .catchup_threshold_seconds,
        );

        let previous = {
            let mut current = self.boundary.write().unwrap_or_else(|e| e.into_inner());
            std::mem::replace(&mut *current, state)
        };
        if previous != state {
            info!(from = previous.as_str(), to = state.as_str(), "boundary transition");
            if state == BoundaryState::Ended && self.config.mode == SessionMode::Live {
                self.roll_session();
            }
        }
        state
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn is_mid_session(&self) -> bool {
        self.session_started.load(Ordering::SeqCst)
            && matches!(
                self.boundary_state(),
                BoundaryState::Active | BoundaryState::Timeout
            )
    }

    fn session_intervals(&self) -> Vec<Interval> {
        let mut intervals = vec![self.base_interval];
        intervals.extend(self.derived_intervals.iter().copied());
        intervals
    }

    fn configured_historical_days(&self) -> u32 {
        self.config
            .session_data_config
            .historical
            .data
            .iter()
            .map(|spec| spec.trailing_days)
            .max()
            .unwrap_or(0)
    }

    fn session_date_or_today(&self) -> NaiveDate {
        self.session_data
            .session_date()
            .or_else(|| ms_to_date(self.clock.now_ms()))
            .unwrap_or_else(|| NaiveDate::from_ymd_opt(1970, 1, 1).unwrap())
    }

    /// [start open, session open) window for trailing history.
    fn historical_window(&self, days: u32) -> (i64, i64) {
        let session_date = self.session_date_or_today();
        let start = self
            .calendar
            .prev_trading_day(session_date, days.max(1))
            .unwrap_or(session_date);
        (
            self.calendar.session_open_ms(start),
            self.calendar.session_open_ms(session_date),
        )
    }
}

fn normalize(symbol: &str) -> String {
    symbol.trim().to_uppercase()
}
