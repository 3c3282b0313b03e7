//! The unified per-session data store: every bar, indicator value and
//! quality figure a strategy may read lives here, behind one lock.
//!
//! Reads clone small snapshots out of the store so no lock guard ever
//! escapes. External readers (strategies, scanners, API handlers) pass
//! `internal = false` and are gated by the session-active flag;
//! the coordinator, processor and quality subsystem pass
//! `internal = true` and always see the data.

use crate::errors::SessionError;
use crate::indicators::IndicatorData;
use crate::quality::GapSpan;
use chrono::NaiveDate;
use sessionr_data::{ms_to_date, Bar, Interval};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;
use tracing::{debug, warn};

/// Who asked for a symbol to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddedBy {
    Config,
    Scanner,
    Strategy,
}

impl AddedBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            AddedBy::Config => "config",
            AddedBy::Scanner => "scanner",
            AddedBy::Strategy => "strategy",
        }
    }
}

/// Provenance flags carried on every symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct Provenance {
    pub meets_session_config_requirements: bool,
    pub added_by: AddedBy,
    pub auto_provisioned: bool,
    pub upgraded_from_adhoc: bool,
    pub added_at: i64,
    /// Mirrored from the execution layer at scanner teardown: the
    /// symbol has an open position or pending order.
    pub locked: bool,
}

impl Provenance {
    pub fn full(added_by: AddedBy, added_at: i64) -> Self {
        Self {
            meets_session_config_requirements: true,
            added_by,
            auto_provisioned: false,
            upgraded_from_adhoc: false,
            added_at,
            locked: false,
        }
    }

    pub fn adhoc(added_by: AddedBy, added_at: i64) -> Self {
        Self {
            meets_session_config_requirements: false,
            added_by,
            auto_provisioned: true,
            upgraded_from_adhoc: false,
            added_at,
            locked: false,
        }
    }
}

/// Running metrics over the current session's base-interval bars.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionMetrics {
    pub session_volume: i64,
    pub session_high: Option<f64>,
    pub session_low: Option<f64>,
    pub bar_count: u64,
    pub last_update: Option<i64>,
}

impl SessionMetrics {
    pub fn update_from_bar(&mut self, bar: &Bar) {
        self.session_volume += bar.volume;
        self.session_high = Some(match self.session_high {
            Some(high) => high.max(bar.high),
            None => bar.high,
        });
        self.session_low = Some(match self.session_low {
            Some(low) => low.min(bar.low),
            None => bar.low,
        });
        self.bar_count += 1;
        self.last_update = Some(match self.last_update {
            Some(last) => last.max(bar.timestamp),
            None => bar.timestamp,
        });
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Appended,
    /// Placed into an interior position (gap fill / retro emission).
    Inserted,
    /// A bar with this timestamp already exists; nothing written.
    Duplicate,
}

/// Ordered bars plus bookkeeping for one (symbol, interval).
#[derive(Debug, Clone)]
pub struct BarIntervalData {
    bars: VecDeque<Bar>,
    pub quality: f64,
    pub gaps: Vec<GapSpan>,
    pub derived_from: Option<Interval>,
    /// Dirty bit the processor toggles to drive notifications.
    pub updated: bool,
}

impl BarIntervalData {
    pub fn new(derived_from: Option<Interval>) -> Self {
        Self {
            bars: VecDeque::new(),
            quality: 100.0,
            gaps: Vec::new(),
            derived_from,
            updated: false,
        }
    }

    pub fn is_derived(&self) -> bool {
        self.derived_from.is_some()
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn latest(&self) -> Option<&Bar> {
        self.bars.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Bar> {
        self.bars.iter()
    }

    pub fn last_n(&self, n: usize) -> Vec<Bar> {
        let skip = self.bars.len().saturating_sub(n);
        self.bars.iter().skip(skip).cloned().collect()
    }

    pub fn since(&self, since_ts: i64) -> Vec<Bar> {
        let start = self.bars.partition_point(|b| b.timestamp < since_ts);
        self.bars.iter().skip(start).cloned().collect()
    }

    pub fn between(&self, start_ts: i64, end_ts: i64) -> Vec<Bar> {
        let start = self.bars.partition_point(|b| b.timestamp < start_ts);
        self.bars
            .iter()
            .skip(start)
            .take_while(|b| b.timestamp < end_ts)
            .cloned()
            .collect()
    }

    pub fn contains_timestamp(&self, timestamp: i64) -> bool {
        let idx = self.bars.partition_point(|b| b.timestamp < timestamp);
        self.bars.get(idx).map(|b| b.timestamp) == Some(timestamp)
    }

    fn append(&mut self, bar: Bar) -> Result<(), SessionError> {
        if let Some(last) = self.bars.back() {
            if bar.timestamp == last.timestamp {
                return Err(SessionError::DuplicateBar {
                    symbol: bar.symbol.clone(),
                    interval: bar.interval.to_string(),
                    timestamp: bar.timestamp,
                });
            }
            if bar.timestamp < last.timestamp {
                return Err(SessionError::TimestampRegression {
                    symbol: bar.symbol.clone(),
                    interval: bar.interval.to_string(),
                    timestamp: bar.timestamp,
                    last: last.timestamp,
                });
            }
        }
        self.bars.push_back(bar);
        self.updated = true;
        Ok(())
    }

    fn insert_sorted(&mut self, bar: Bar) -> InsertOutcome {
        match self.bars.back() {
            None => {
                self.bars.push_back(bar);
                self.updated = true;
                InsertOutcome::Appended
            }
            Some(last) if bar.timestamp > last.timestamp => {
                self.bars.push_back(bar);
                self.updated = true;
                InsertOutcome::Appended
            }
            _ => {
                let idx = self.bars.partition_point(|b| b.timestamp < bar.timestamp);
                if self.bars.get(idx).map(|b| b.timestamp) == Some(bar.timestamp) {
                    return InsertOutcome::Duplicate;
                }
                self.bars.insert(idx, bar);
                self.updated = true;
                InsertOutcome::Inserted
            }
        }
    }
}

/// Everything the session knows about one symbol.
#[derive(Debug, Clone)]
pub struct SymbolSessionData {
    pub symbol: String,
    pub base_interval: Interval,
    pub intervals: HashMap<Interval, BarIntervalData>,
    pub indicators: HashMap<String, IndicatorData>,
    /// Scalar quality score in [0, 100].
    pub quality: f64,
    pub metrics: SessionMetrics,
    pub provenance: Provenance,
}

impl SymbolSessionData {
    fn new(symbol: String, base_interval: Interval, provenance: Provenance) -> Self {
        let mut intervals = HashMap::new();
        intervals.insert(base_interval, BarIntervalData::new(None));
        Self {
            symbol,
            base_interval,
            intervals,
            indicators: HashMap::new(),
            quality: 100.0,
            metrics: SessionMetrics::default(),
            provenance,
        }
    }

    pub fn is_adhoc(&self) -> bool {
        !self.provenance.meets_session_config_requirements
    }

    pub fn derived_intervals(&self) -> Vec<Interval> {
        let mut derived: Vec<Interval> = self
            .intervals
            .iter()
            .filter(|(_, data)| data.is_derived())
            .map(|(interval, _)| *interval)
            .collect();
        derived.sort_by_key(|i| i.duration_ms());
        derived
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionStats {
    pub symbol_count: usize,
    pub total_bars: usize,
    pub indicator_count: usize,
    pub bar_counts: HashMap<String, HashMap<Interval, usize>>,
}

/// The store itself. One writer (the coordinator/processor chain)
/// mutates; any thread reads.
pub struct SessionData {
    symbols: RwLock<HashMap<String, SymbolSessionData>>,
    session_active: AtomicBool,
    session_date: RwLock<Option<NaiveDate>>,
}

impl SessionData {
    pub fn new() -> Self {
        Self {
            symbols: RwLock::new(HashMap::new()),
            session_active: AtomicBool::new(false),
            session_date: RwLock::new(None),
        }
    }

    // ------------------------------------------------------------------
    // Session gate & date
    // ------------------------------------------------------------------

    pub fn activate_session(&self) {
        self.session_active.store(true, Ordering::SeqCst);
        debug!("session activated");
    }

    pub fn deactivate_session(&self) {
        self.session_active.store(false, Ordering::SeqCst);
        debug!("session deactivated");
    }

    pub fn is_session_active(&self) -> bool {
        self.session_active.load(Ordering::SeqCst)
    }

    fn readable(&self, internal: bool) -> bool {
        internal || self.is_session_active()
    }

    pub fn set_session_date(&self, date: Option<NaiveDate>) {
        *self
            .session_date
            .write()
            .unwrap_or_else(|e| e.into_inner()) = date;
    }

    pub fn session_date(&self) -> Option<NaiveDate> {
        *self.session_date.read().unwrap_or_else(|e| e.into_inner())
    }

    // ------------------------------------------------------------------
    // Registration & lifecycle
    // ------------------------------------------------------------------

    /// Insert a symbol or leave the existing entry untouched.
    /// Returns true when a new entry was created. A symbol's base
    /// interval is fixed at first registration.
    pub fn register_symbol(
        &self,
        symbol: &str,
        base_interval: Interval,
        provenance: Provenance,
    ) -> bool {
        let mut symbols = self.symbols.write().unwrap_or_else(|e| e.into_inner());
        if symbols.contains_key(symbol) {
            return false;
        }
        symbols.insert(
            symbol.to_string(),
            SymbolSessionData::new(symbol.to_string(), base_interval, provenance),
        );
        debug!(symbol, base = %base_interval, "symbol registered");
        true
    }

    /// Promote an adhoc symbol to full membership.
    pub fn upgrade_symbol(&self, symbol: &str) -> Result<(), SessionError> {
        let mut symbols = self.symbols.write().unwrap_or_else(|e| e.into_inner());
        let data = symbols
            .get_mut(symbol)
            .ok_or_else(|| SessionError::UnknownSymbol(symbol.to_string()))?;
        data.provenance.meets_session_config_requirements = true;
        data.provenance.upgraded_from_adhoc = true;
        debug!(symbol, "symbol upgraded from adhoc");
        Ok(())
    }

    /// Attach a fresh interval container. Returns true when newly
    /// added; re-adding is a no-op.
    pub fn add_interval(
        &self,
        symbol: &str,
        interval: Interval,
        derived_from: Option<Interval>,
    ) -> Result<bool, SessionError> {
        let mut symbols = self.symbols.write().unwrap_or_else(|e| e.into_inner());
        let data = symbols
            .get_mut(symbol)
            .ok_or_else(|| SessionError::UnknownSymbol(symbol.to_string()))?;
        if data.intervals.contains_key(&interval) {
            return Ok(false);
        }
        data.intervals
            .insert(interval, BarIntervalData::new(derived_from));
        Ok(true)
    }

    pub fn remove_symbol(&self, symbol: &str) -> bool {
        self.symbols
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(symbol)
            .is_some()
    }

    /// Drop everything. Session teardown only.
    pub fn clear(&self) {
        self.symbols
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        self.set_session_date(None);
        debug!("session data cleared");
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Append one bar; timestamps must strictly increase. Session
    /// metrics track base-interval bars dated on the current session.
    pub fn append_bar(&self, symbol: &str, interval: Interval, bar: Bar) -> Result<(), SessionError> {
        bar.validate()?;
        let session_date = self.session_date();
        let mut symbols = self.symbols.write().unwrap_or_else(|e| e.into_inner());
        let data = symbols
            .get_mut(symbol)
            .ok_or_else(|| SessionError::UnknownSymbol(symbol.to_string()))?;
        let is_base = interval == data.base_interval;
        let on_session_date = match session_date {
            Some(date) => ms_to_date(bar.timestamp) == Some(date),
            None => true,
        };
        let interval_data =
            data.intervals
                .get_mut(&interval)
                .ok_or_else(|| SessionError::IntervalNotProvisioned {
                    symbol: symbol.to_string(),
                    interval: interval.to_string(),
                })?;

        let metrics_bar = bar.clone();
        interval_data.append(bar)?;

        if is_base && on_session_date {
            data.metrics.update_from_bar(&metrics_bar);
        }
        Ok(())
    }

    /// Merge a bar into sorted position; used by the gap filler and by
    /// retroactive derived emission. Duplicate timestamps are reported,
    /// not written.
    pub fn insert_bar_sorted(
        &self,
        symbol: &str,
        interval: Interval,
        bar: Bar,
    ) -> Result<InsertOutcome, SessionError> {
        bar.validate()?;
        let session_date = self.session_date();
        let mut symbols = self.symbols.write().unwrap_or_else(|e| e.into_inner());
        let data = symbols
            .get_mut(symbol)
            .ok_or_else(|| SessionError::UnknownSymbol(symbol.to_string()))?;
        let is_base = interval == data.base_interval;
        let on_session_date = match session_date {
            Some(date) => ms_to_date(bar.timestamp) == Some(date),
            None => true,
        };
        let interval_data =
            data.intervals
                .get_mut(&interval)
                .ok_or_else(|| SessionError::IntervalNotProvisioned {
                    symbol: symbol.to_string(),
                    interval: interval.to_string(),
                })?;

        let metrics_bar = bar.clone();
        let outcome = interval_data.insert_sorted(bar);
        if outcome != InsertOutcome::Duplicate && is_base && on_session_date {
            data.metrics.update_from_bar(&metrics_bar);
        }
        Ok(outcome)
    }

    pub fn set_indicator(&self, symbol: &str, key: &str, data: IndicatorData) {
        let mut symbols = self.symbols.write().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = symbols.get_mut(symbol) {
            entry.indicators.insert(key.to_string(), data);
        }
    }

    /// Quality percentage for one (symbol, interval); values outside
    /// [0, 100] are clamped with a warning.
    pub fn set_interval_quality(&self, symbol: &str, interval: Interval, quality: f64) {
        let quality = if (0.0..=100.0).contains(&quality) {
            quality
        } else {
            warn!(symbol, %interval, quality, "quality out of range, clamping");
            quality.clamp(0.0, 100.0)
        };
        let mut symbols = self.symbols.write().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = symbols.get_mut(symbol) {
            if let Some(interval_data) = entry.intervals.get_mut(&interval) {
                interval_data.quality = quality;
            }
        }
    }

    pub fn set_symbol_quality(&self, symbol: &str, quality: f64) {
        let quality = quality.clamp(0.0, 100.0);
        let mut symbols = self.symbols.write().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = symbols.get_mut(symbol) {
            entry.quality = quality;
        }
    }

    pub fn set_gaps(&self, symbol: &str, interval: Interval, gaps: Vec<GapSpan>) {
        let mut symbols = self.symbols.write().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = symbols.get_mut(symbol) {
            if let Some(interval_data) = entry.intervals.get_mut(&interval) {
                interval_data.gaps = gaps;
            }
        }
    }

    pub fn set_locked(&self, symbol: &str, locked: bool) {
        let mut symbols = self.symbols.write().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = symbols.get_mut(symbol) {
            entry.provenance.locked = locked;
        }
    }

    pub fn clear_updated(&self, symbol: &str, interval: Interval) {
        let mut symbols = self.symbols.write().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = symbols.get_mut(symbol) {
            if let Some(interval_data) = entry.intervals.get_mut(&interval) {
                interval_data.updated = false;
            }
        }
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub fn get_latest_bar(&self, symbol: &str, interval: Interval, internal: bool) -> Option<Bar> {
        if !self.readable(internal) {
            return None;
        }
        let symbols = self.symbols.read().unwrap_or_else(|e| e.into_inner());
        symbols
            .get(symbol)?
            .intervals
            .get(&interval)?
            .latest()
            .cloned()
    }

    pub fn get_last_n_bars(
        &self,
        symbol: &str,
        interval: Interval,
        n: usize,
        internal: bool,
    ) -> Vec<Bar> {
        if !self.readable(internal) {
            return Vec::new();
        }
        let symbols = self.symbols.read().unwrap_or_else(|e| e.into_inner());
        symbols
            .get(symbol)
            .and_then(|s| s.intervals.get(&interval))
            .map(|d| d.last_n(n))
            .unwrap_or_default()
    }

    pub fn get_bars_since(
        &self,
        symbol: &str,
        interval: Interval,
        since_ts: i64,
        internal: bool,
    ) -> Vec<Bar> {
        if !self.readable(internal) {
            return Vec::new();
        }
        let symbols = self.symbols.read().unwrap_or_else(|e| e.into_inner());
        symbols
            .get(symbol)
            .and_then(|s| s.intervals.get(&interval))
            .map(|d| d.since(since_ts))
            .unwrap_or_default()
    }

    /// Bars with `start_ts <= timestamp < end_ts`.
    pub fn get_bars_between(
        &self,
        symbol: &str,
        interval: Interval,
        start_ts: i64,
        end_ts: i64,
        internal: bool,
    ) -> Vec<Bar> {
        if !self.readable(internal) {
            return Vec::new();
        }
        let symbols = self.symbols.read().unwrap_or_else(|e| e.into_inner());
        symbols
            .get(symbol)
            .and_then(|s| s.intervals.get(&interval))
            .map(|d| d.between(start_ts, end_ts))
            .unwrap_or_default()
    }

    pub fn get_bar_count(&self, symbol: &str, interval: Interval, internal: bool) -> usize {
        if !self.readable(internal) {
            return 0;
        }
        let symbols = self.symbols.read().unwrap_or_else(|e| e.into_inner());
        symbols
            .get(symbol)
            .and_then(|s| s.intervals.get(&interval))
            .map(|d| d.len())
            .unwrap_or(0)
    }

    pub fn has_bar_at(&self, symbol: &str, interval: Interval, timestamp: i64) -> bool {
        let symbols = self.symbols.read().unwrap_or_else(|e| e.into_inner());
        symbols
            .get(symbol)
            .and_then(|s| s.intervals.get(&interval))
            .map(|d| d.contains_timestamp(timestamp))
            .unwrap_or(false)
    }

    pub fn get_active_symbols(&self, internal: bool) -> Vec<String> {
        if !self.readable(internal) {
            return Vec::new();
        }
        let symbols = self.symbols.read().unwrap_or_else(|e| e.into_inner());
        let mut names: Vec<String> = symbols.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn get_symbol_data(&self, symbol: &str, internal: bool) -> Option<SymbolSessionData> {
        if !self.readable(internal) {
            return None;
        }
        let symbols = self.symbols.read().unwrap_or_else(|e| e.into_inner());
        symbols.get(symbol).cloned()
    }

    pub fn get_indicator(&self, symbol: &str, key: &str, internal: bool) -> Option<IndicatorData> {
        if !self.readable(internal) {
            return None;
        }
        let symbols = self.symbols.read().unwrap_or_else(|e| e.into_inner());
        symbols.get(symbol)?.indicators.get(key).cloned()
    }

    pub fn has_indicator(&self, symbol: &str, key: &str) -> bool {
        let symbols = self.symbols.read().unwrap_or_else(|e| e.into_inner());
        symbols
            .get(symbol)
            .map(|s| s.indicators.contains_key(key))
            .unwrap_or(false)
    }

    pub fn contains_symbol(&self, symbol: &str) -> bool {
        self.symbols
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(symbol)
    }

    pub fn stats(&self) -> SessionStats {
        let symbols = self.symbols.read().unwrap_or_else(|e| e.into_inner());
        let mut stats = SessionStats {
            symbol_count: symbols.len(),
            ..Default::default()
        };
        for (name, data) in symbols.iter() {
            let counts: HashMap<Interval, usize> = data
                .intervals
                .iter()
                .map(|(interval, d)| (*interval, d.len()))
                .collect();
            stats.total_bars += counts.values().sum::<usize>();
            stats.indicator_count += data.indicators.len();
            stats.bar_counts.insert(name.clone(), counts);
        }
        stats
    }
}

impl Default for SessionData {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minute_bar(ts: i64, close: f64, volume: i64) -> Bar {
        Bar::new(
            "AAPL",
            Interval::MIN_1,
            ts,
            close,
            close + 0.5,
            close - 0.5,
            close,
            volume,
        )
    }

    fn store_with_symbol() -> SessionData {
        let store = SessionData::new();
        store.register_symbol("AAPL", Interval::MIN_1, Provenance::full(AddedBy::Config, 0));
        store
    }

    #[test]
    fn test_register_is_idempotent() {
        let store = store_with_symbol();
        assert!(!store.register_symbol(
            "AAPL",
            Interval::MIN_5,
            Provenance::full(AddedBy::Strategy, 1)
        ));
        // Base interval fixed at first registration.
        let data = store.get_symbol_data("AAPL", true).unwrap();
        assert_eq!(data.base_interval, Interval::MIN_1);
        assert_eq!(data.provenance.added_by, AddedBy::Config);
    }

    #[test]
    fn test_append_enforces_monotonicity() {
        let store = store_with_symbol();
        store
            .append_bar("AAPL", Interval::MIN_1, minute_bar(60_000, 100.0, 10))
            .unwrap();
        store
            .append_bar("AAPL", Interval::MIN_1, minute_bar(120_000, 100.0, 10))
            .unwrap();

        let duplicate = store.append_bar("AAPL", Interval::MIN_1, minute_bar(120_000, 100.0, 10));
        assert!(matches!(duplicate, Err(SessionError::DuplicateBar { .. })));

        let regress = store.append_bar("AAPL", Interval::MIN_1, minute_bar(60_000, 100.0, 10));
        assert!(matches!(
            regress,
            Err(SessionError::TimestampRegression { .. })
        ));
        assert_eq!(store.get_bar_count("AAPL", Interval::MIN_1, true), 2);
    }

    #[test]
    fn test_insert_sorted_fills_gap() {
        let store = store_with_symbol();
        for ts in [60_000, 120_000, 240_000] {
            store
                .append_bar("AAPL", Interval::MIN_1, minute_bar(ts, 100.0, 10))
                .unwrap();
        }

        let outcome = store
            .insert_bar_sorted("AAPL", Interval::MIN_1, minute_bar(180_000, 100.0, 10))
            .unwrap();
        assert_eq!(outcome, InsertOutcome::Inserted);

        let bars = store.get_last_n_bars("AAPL", Interval::MIN_1, 10, true);
        let timestamps: Vec<i64> = bars.iter().map(|b| b.timestamp).collect();
        assert_eq!(timestamps, vec![60_000, 120_000, 180_000, 240_000]);

        let duplicate = store
            .insert_bar_sorted("AAPL", Interval::MIN_1, minute_bar(180_000, 101.0, 10))
            .unwrap();
        assert_eq!(duplicate, InsertOutcome::Duplicate);
        assert_eq!(store.get_bar_count("AAPL", Interval::MIN_1, true), 4);
    }

    #[test]
    fn test_session_metrics_follow_base_bars() {
        let store = store_with_symbol();
        store
            .append_bar("AAPL", Interval::MIN_1, minute_bar(60_000, 100.0, 500))
            .unwrap();
        store
            .append_bar("AAPL", Interval::MIN_1, minute_bar(120_000, 102.0, 300))
            .unwrap();
        store
            .append_bar("AAPL", Interval::MIN_1, minute_bar(180_000, 99.0, 200))
            .unwrap();

        let metrics = store.get_symbol_data("AAPL", true).unwrap().metrics;
        assert_eq!(metrics.session_volume, 1_000);
        assert_eq!(metrics.session_high, Some(102.5));
        assert_eq!(metrics.session_low, Some(98.5));
        assert_eq!(metrics.bar_count, 3);
        assert_eq!(metrics.last_update, Some(180_000));
    }

    #[test]
    fn test_metrics_skip_non_session_dates() {
        let store = store_with_symbol();
        let session = NaiveDate::from_ymd_opt(2025, 1, 2).unwrap();
        store.set_session_date(Some(session));

        // 2025-01-01 bar: historical, no metrics contribution.
        let historical_ts = sessionr_data::to_epoch_ms(
            NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            chrono::NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
        );
        store
            .append_bar("AAPL", Interval::MIN_1, minute_bar(historical_ts, 90.0, 999))
            .unwrap();

        let session_ts = sessionr_data::to_epoch_ms(
            session,
            chrono::NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
        );
        store
            .append_bar("AAPL", Interval::MIN_1, minute_bar(session_ts, 100.0, 100))
            .unwrap();

        let metrics = store.get_symbol_data("AAPL", true).unwrap().metrics;
        assert_eq!(metrics.session_volume, 100);
        assert_eq!(metrics.bar_count, 1);
    }

    #[test]
    fn test_external_reads_gated_by_session_active() {
        let store = store_with_symbol();
        store
            .append_bar("AAPL", Interval::MIN_1, minute_bar(60_000, 100.0, 10))
            .unwrap();

        // Inactive: external reads empty, internal reads succeed.
        assert!(store.get_latest_bar("AAPL", Interval::MIN_1, false).is_none());
        assert!(store.get_active_symbols(false).is_empty());
        assert!(store.get_symbol_data("AAPL", false).is_none());
        assert!(store.get_latest_bar("AAPL", Interval::MIN_1, true).is_some());
        assert_eq!(store.get_active_symbols(true), vec!["AAPL".to_string()]);

        store.activate_session();
        assert!(store.get_latest_bar("AAPL", Interval::MIN_1, false).is_some());
        assert_eq!(store.get_active_symbols(false), vec!["AAPL".to_string()]);
    }

    #[test]
    fn test_unknown_symbol_and_interval_errors() {
        let store = store_with_symbol();
        assert!(matches!(
            store.append_bar("RIVN", Interval::MIN_1, minute_bar(0, 1.0, 0)),
            Err(SessionError::UnknownSymbol(_))
        ));
        assert!(matches!(
            store.append_bar("AAPL", Interval::MIN_5, minute_bar(0, 1.0, 0)),
            Err(SessionError::IntervalNotProvisioned { .. })
        ));
    }

    #[test]
    fn test_upgrade_symbol_flags() {
        let store = SessionData::new();
        store.register_symbol(
            "RIVN",
            Interval::MIN_1,
            Provenance::adhoc(AddedBy::Scanner, 0),
        );
        assert!(store.get_symbol_data("RIVN", true).unwrap().is_adhoc());

        store.upgrade_symbol("RIVN").unwrap();
        let data = store.get_symbol_data("RIVN", true).unwrap();
        assert!(!data.is_adhoc());
        assert!(data.provenance.upgraded_from_adhoc);
        assert!(data.provenance.meets_session_config_requirements);
    }

    #[test]
    fn test_clear_empties_everything() {
        let store = store_with_symbol();
        store
            .append_bar("AAPL", Interval::MIN_1, minute_bar(60_000, 100.0, 10))
            .unwrap();
        store.set_indicator(
            "AAPL",
            "sma_3_1m",
            IndicatorData::pending(crate::indicators::IndicatorConfig::new(
                crate::indicators::IndicatorKind::Sma,
                3,
                Interval::MIN_1,
            )),
        );

        store.clear();
        let stats = store.stats();
        assert_eq!(stats.symbol_count, 0);
        assert_eq!(stats.total_bars, 0);
        assert_eq!(stats.indicator_count, 0);
    }

    #[test]
    fn test_interval_quality_clamped() {
        let store = store_with_symbol();
        store.set_interval_quality("AAPL", Interval::MIN_1, 150.0);
        let data = store.get_symbol_data("AAPL", true).unwrap();
        assert_eq!(data.intervals[&Interval::MIN_1].quality, 100.0);
    }

    #[test]
    fn test_derived_interval_listing() {
        let store = store_with_symbol();
        store
            .add_interval("AAPL", Interval::MIN_5, Some(Interval::MIN_1))
            .unwrap();
        store
            .add_interval("AAPL", "15m".parse().unwrap(), Some(Interval::MIN_1))
            .unwrap();

        let data = store.get_symbol_data("AAPL", true).unwrap();
        assert_eq!(
            data.derived_intervals(),
            vec![Interval::MIN_5, "15m".parse().unwrap()]
        );
    }
}
