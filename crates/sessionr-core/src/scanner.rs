//! Scanner framework: pre-session and scheduled scans that promote or
//! demote symbols through the coordinator's provisioning path.

use crate::clock::Clock;
use crate::config::ScannerConfig;
use crate::coordinator::SessionCoordinator;
use crate::indicators::IndicatorManager;
use crate::interfaces::ExecutionAdapter;
use crate::session::{AddedBy, SessionData};
use chrono::{NaiveDate, NaiveTime};
use sessionr_data::ms_to_datetime;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// What a scanner sees: the public read surface plus the coordinator's
/// add-operations.
pub struct ScanContext {
    pub coordinator: Arc<SessionCoordinator>,
    pub session_data: Arc<SessionData>,
    pub config: HashMap<String, serde_json::Value>,
}

impl ScanContext {
    /// Convenience wrapper scanners use to promote a symbol; routes
    /// into the three-phase pipeline with scanner provenance.
    pub fn add_symbol(&self, symbol: &str) -> bool {
        self.coordinator.add_symbol(symbol, AddedBy::Scanner).success
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScanResult {
    pub symbols_added: Vec<String>,
    pub note: Option<String>,
}

pub trait Scanner: Send {
    fn name(&self) -> &str;

    fn setup(&mut self, _ctx: &ScanContext) -> anyhow::Result<()> {
        Ok(())
    }

    fn scan(&mut self, ctx: &ScanContext) -> anyhow::Result<ScanResult>;

    fn teardown(&mut self, _ctx: &ScanContext) -> anyhow::Result<()> {
        Ok(())
    }
}

struct ScheduledScanner {
    scanner: Mutex<Box<dyn Scanner>>,
    pre_session: bool,
    times: Vec<NaiveTime>,
    fired: Mutex<Vec<(NaiveDate, NaiveTime)>>,
    is_setup: Mutex<bool>,
}

/// Loads scanners from config, runs them pre-session or at their
/// scheduled times, and tears them down at session end.
pub struct ScannerManager {
    scanners: Vec<ScheduledScanner>,
    context: ScanContext,
    execution: Arc<dyn ExecutionAdapter>,
    indicators: Arc<IndicatorManager>,
    clock: Arc<dyn Clock>,
}

impl ScannerManager {
    pub fn new(
        coordinator: Arc<SessionCoordinator>,
        session_data: Arc<SessionData>,
        execution: Arc<dyn ExecutionAdapter>,
        indicators: Arc<IndicatorManager>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            scanners: Vec::new(),
            context: ScanContext {
                coordinator,
                session_data,
                config: HashMap::new(),
            },
            execution,
            indicators,
            clock,
        }
    }

    /// Instantiate the scanners a session config declares. Unknown
    /// modules are skipped with a warning; a bad schedule was already
    /// rejected at config validation.
    pub fn load_from_config(&mut self, configs: &[ScannerConfig]) {
        for config in configs.iter().filter(|c| c.enabled) {
            match build_scanner(&config.module, &config.config) {
                Some(scanner) => {
                    let times = config
                        .regular_session
                        .iter()
                        .filter_map(|t| NaiveTime::parse_from_str(t, "%H:%M").ok())
                        .collect();
                    self.register(scanner, config.pre_session, times);
                    info!(module = config.module.as_str(), "scanner loaded");
                }
                None => warn!(module = config.module.as_str(), "unknown scanner module, skipped"),
            }
        }
    }

    pub fn register(
        &mut self,
        scanner: Box<dyn Scanner>,
        pre_session: bool,
        times: Vec<NaiveTime>,
    ) {
        self.scanners.push(ScheduledScanner {
            scanner: Mutex::new(scanner),
            pre_session,
            times,
            fired: Mutex::new(Vec::new()),
            is_setup: Mutex::new(false),
        });
    }

    pub fn scanner_count(&self) -> usize {
        self.scanners.len()
    }

    /// Run every pre-session scanner once: setup, scan, immediate
    /// teardown.
    pub fn run_pre_session(&self) {
        for entry in self.scanners.iter().filter(|s| s.pre_session) {
            let mut scanner = entry.scanner.lock().unwrap_or_else(|e| e.into_inner());
            let name = scanner.name().to_string();
            let run = scanner
                .setup(&self.context)
                .and_then(|_| scanner.scan(&self.context))
                .and_then(|result| {
                    info!(
                        scanner = name.as_str(),
                        added = result.symbols_added.len(),
                        "pre-session scan complete"
                    );
                    scanner.teardown(&self.context)
                });
            if let Err(e) = run {
                warn!(scanner = name.as_str(), error = %e, "pre-session scanner failed");
            }
        }
    }

    /// Scheduler-worker tick: fire any regular-session scan whose
    /// wall-clock time has arrived and has not fired today.
    pub fn poll(&self) {
        let Some(now) = ms_to_datetime(self.clock.now_ms()) else {
            return;
        };
        let today = now.date();
        let time_now = now.time();

        for entry in self.scanners.iter().filter(|s| !s.pre_session) {
            for scheduled in &entry.times {
                if time_now < *scheduled {
                    continue;
                }
                {
                    let mut fired = entry.fired.lock().unwrap_or_else(|e| e.into_inner());
                    if fired.contains(&(today, *scheduled)) {
                        continue;
                    }
                    fired.push((today, *scheduled));
                }

                let mut scanner = entry.scanner.lock().unwrap_or_else(|e| e.into_inner());
                let name = scanner.name().to_string();
                {
                    let mut is_setup = entry.is_setup.lock().unwrap_or_else(|e| e.into_inner());
                    if !*is_setup {
                        if let Err(e) = scanner.setup(&self.context) {
                            warn!(scanner = name.as_str(), error = %e, "scanner setup failed");
                            continue;
                        }
                        *is_setup = true;
                    }
                }
                match scanner.scan(&self.context) {
                    Ok(result) => info!(
                        scanner = name.as_str(),
                        at = %scheduled,
                        added = result.symbols_added.len(),
                        "scheduled scan complete"
                    ),
                    Err(e) => warn!(scanner = name.as_str(), error = %e, "scheduled scan failed"),
                }
            }
        }
    }

    /// Session-end teardown: run scanner teardowns, then demote every
    /// scanner-provisioned symbol that was neither promoted to full
    /// membership nor locked by the execution layer.
    pub fn teardown(&self) {
        for entry in self.scanners.iter().filter(|s| !s.pre_session) {
            let mut scanner = entry.scanner.lock().unwrap_or_else(|e| e.into_inner());
            let name = scanner.name().to_string();
            if let Err(e) = scanner.teardown(&self.context) {
                warn!(scanner = name.as_str(), error = %e, "scanner teardown failed");
            }
            *entry.is_setup.lock().unwrap_or_else(|e| e.into_inner()) = false;
            entry.fired.lock().unwrap_or_else(|e| e.into_inner()).clear();
        }

        for symbol in self.context.session_data.get_active_symbols(true) {
            let Some(data) = self.context.session_data.get_symbol_data(&symbol, true) else {
                continue;
            };
            if data.provenance.added_by != AddedBy::Scanner {
                continue;
            }
            if data.provenance.meets_session_config_requirements {
                continue;
            }
            let locked = data.provenance.locked || self.execution.is_symbol_locked(&symbol);
            if locked {
                self.context.session_data.set_locked(&symbol, true);
                debug!(symbol = symbol.as_str(), "scanner symbol locked by execution layer, kept");
                continue;
            }
            self.context.session_data.remove_symbol(&symbol);
            self.indicators.remove_symbol(&symbol);
            info!(symbol = symbol.as_str(), "adhoc scanner symbol removed at teardown");
        }
    }
}

/// Built-in scanner registry; session configs select by module name.
pub fn build_scanner(
    module: &str,
    config: &HashMap<String, serde_json::Value>,
) -> Option<Box<dyn Scanner>> {
    match module {
        "volume_spike" => Some(Box::new(VolumeSpikeScanner::from_config(config))),
        _ => None,
    }
}

/// Promotes candidate symbols whose cumulative session volume clears a
/// configured floor.
pub struct VolumeSpikeScanner {
    candidates: Vec<String>,
    min_volume: i64,
}

impl VolumeSpikeScanner {
    pub fn from_config(config: &HashMap<String, serde_json::Value>) -> Self {
        let candidates = config
            .get("candidates")
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(|s| s.to_uppercase()))
                    .collect()
            })
            .unwrap_or_default();
        let min_volume = config
            .get("min_volume")
            .and_then(|v| v.as_i64())
            .unwrap_or(1_000_000);
        Self {
            candidates,
            min_volume,
        }
    }
}

impl Scanner for VolumeSpikeScanner {
    fn name(&self) -> &str {
        "volume_spike"
    }

    fn scan(&mut self, ctx: &ScanContext) -> anyhow::Result<ScanResult> {
        let mut result = ScanResult::default();
        for symbol in &self.candidates {
            if ctx.session_data.contains_symbol(symbol) {
                continue;
            }
            // Candidate volume is read from the already-tracked set;
            // a candidate with no presence yet is promoted outright so
            // its data starts flowing.
            let volume = ctx
                .session_data
                .get_symbol_data(symbol, true)
                .map(|d| d.metrics.session_volume)
                .unwrap_or(i64::MAX);
            if volume >= self.min_volume && ctx.add_symbol(symbol) {
                result.symbols_added.push(symbol.clone());
            }
        }
        Ok(result)
    }
}
