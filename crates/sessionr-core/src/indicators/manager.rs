//! Indicator instance registry and update fan-out.

use dashmap::DashMap;
use rayon::prelude::*;
use sessionr_data::{Bar, Interval};
use tracing::debug;

use super::indicator_trait::{Indicator, IndicatorConfig, IndicatorData};

const PARALLEL_THRESHOLD: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    Registered,
    /// Same key already present; registration is an idempotent no-op.
    AlreadyRegistered,
}

struct ManagedIndicator {
    symbol: String,
    config: IndicatorConfig,
    indicator: Box<dyn Indicator>,
}

/// Owns every live indicator instance for the session, keyed
/// `<symbol>::<name>_<period>_<interval>`. Registration warms the
/// instance from whatever history the caller has on hand; the
/// processor then drives incremental updates per (symbol, interval).
pub struct IndicatorManager {
    instances: DashMap<String, ManagedIndicator>,
    parallel_threshold: usize,
}

impl IndicatorManager {
    pub fn new() -> Self {
        Self {
            instances: DashMap::new(),
            parallel_threshold: PARALLEL_THRESHOLD,
        }
    }

    fn instance_key(symbol: &str, config_key: &str) -> String {
        format!("{symbol}::{config_key}")
    }

    /// Register and warm up one indicator. Re-registering an existing
    /// key leaves the live instance untouched and reports
    /// `AlreadyRegistered`, which makes provisioning retries safe.
    pub fn register(
        &self,
        symbol: &str,
        config: IndicatorConfig,
        history: &[Bar],
    ) -> (RegisterOutcome, IndicatorData) {
        let key = Self::instance_key(symbol, &config.key());

        if let Some(existing) = self.instances.get(&key) {
            let data = Self::snapshot(&existing, None);
            return (RegisterOutcome::AlreadyRegistered, data);
        }

        let mut indicator = config.kind.build(config.period, &config.params);
        indicator.warmup(history);
        debug!(
            symbol,
            key = %config.key(),
            warmed_with = history.len(),
            ready = indicator.is_ready(),
            "indicator registered"
        );

        let managed = ManagedIndicator {
            symbol: symbol.to_string(),
            config,
            indicator,
        };
        let data = Self::snapshot(&managed, history.last().map(|b| b.timestamp));
        self.instances.insert(key, managed);
        (RegisterOutcome::Registered, data)
    }

    fn snapshot(managed: &ManagedIndicator, updated_at: Option<i64>) -> IndicatorData {
        IndicatorData {
            value: managed.indicator.current(),
            valid: managed.indicator.is_ready(),
            updated_at,
            config: managed.config.clone(),
        }
    }

    /// Feed one bar to every instance attached to (symbol, interval).
    /// Returns (indicator key, fresh snapshot) per instance touched.
    pub fn update(&self, symbol: &str, interval: Interval, bar: &Bar) -> Vec<(String, IndicatorData)> {
        let keys: Vec<String> = self
            .instances
            .iter()
            .filter(|entry| entry.symbol == symbol && entry.config.interval == interval)
            .map(|entry| entry.key().clone())
            .collect();

        let update_one = |key: &String| -> Option<(String, IndicatorData)> {
            let mut entry = self.instances.get_mut(key)?;
            entry.indicator.update(bar);
            let data = Self::snapshot(&entry, Some(bar.timestamp));
            Some((entry.config.key(), data))
        };

        if keys.len() > self.parallel_threshold {
            keys.par_iter().filter_map(update_one).collect()
        } else {
            keys.iter().filter_map(update_one).collect()
        }
    }

    pub fn contains(&self, symbol: &str, config_key: &str) -> bool {
        self.instances
            .contains_key(&Self::instance_key(symbol, config_key))
    }

    pub fn remove_symbol(&self, symbol: &str) -> usize {
        let keys: Vec<String> = self
            .instances
            .iter()
            .filter(|entry| entry.symbol == symbol)
            .map(|entry| entry.key().clone())
            .collect();
        for key in &keys {
            self.instances.remove(key);
        }
        keys.len()
    }

    pub fn reset_all(&self) {
        for mut entry in self.instances.iter_mut() {
            entry.indicator.reset();
        }
    }

    pub fn clear(&self) {
        self.instances.clear();
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}

impl Default for IndicatorManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::IndicatorKind;

    fn bar(i: i64, close: f64) -> Bar {
        Bar::new("AAPL", Interval::MIN_1, i * 60_000, close, close, close, close, 1_000)
    }

    fn sma3() -> IndicatorConfig {
        IndicatorConfig::new(IndicatorKind::Sma, 3, Interval::MIN_1)
    }

    #[test]
    fn test_register_and_update() {
        let manager = IndicatorManager::new();
        let (outcome, data) = manager.register("AAPL", sma3(), &[]);
        assert_eq!(outcome, RegisterOutcome::Registered);
        assert!(!data.valid);

        for i in 0..3 {
            manager.update("AAPL", Interval::MIN_1, &bar(i, 10.0 + i as f64));
        }
        let updates = manager.update("AAPL", Interval::MIN_1, &bar(3, 13.0));
        assert_eq!(updates.len(), 1);
        let (key, data) = &updates[0];
        assert_eq!(key, "sma_3_1m");
        assert!(data.valid);
        assert_eq!(data.value, Some(12.0));
        assert_eq!(data.updated_at, Some(3 * 60_000));
    }

    #[test]
    fn test_duplicate_register_is_noop() {
        let manager = IndicatorManager::new();
        let history: Vec<Bar> = (0..5).map(|i| bar(i, 10.0)).collect();
        let (first, data) = manager.register("AAPL", sma3(), &history);
        assert_eq!(first, RegisterOutcome::Registered);
        assert!(data.valid);

        let (second, data) = manager.register("AAPL", sma3(), &[]);
        assert_eq!(second, RegisterOutcome::AlreadyRegistered);
        // The warmed instance is untouched.
        assert!(data.valid);
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_warm_up_from_history() {
        let manager = IndicatorManager::new();
        let history: Vec<Bar> = (0..10).map(|i| bar(i, 10.0 + i as f64)).collect();
        let (_, data) = manager.register("AAPL", sma3(), &history);
        assert!(data.valid);
        assert_eq!(data.value, Some(18.0)); // mean of 17, 18, 19
    }

    #[test]
    fn test_update_filters_by_interval() {
        let manager = IndicatorManager::new();
        manager.register("AAPL", sma3(), &[]);
        manager.register(
            "AAPL",
            IndicatorConfig::new(IndicatorKind::Sma, 3, Interval::MIN_5),
            &[],
        );

        let updates = manager.update("AAPL", Interval::MIN_5, &bar(0, 10.0));
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].0, "sma_3_5m");
    }

    #[test]
    fn test_remove_symbol() {
        let manager = IndicatorManager::new();
        manager.register("AAPL", sma3(), &[]);
        manager.register("RIVN", sma3(), &[]);

        assert_eq!(manager.remove_symbol("AAPL"), 1);
        assert_eq!(manager.len(), 1);
        assert!(manager.contains("RIVN", "sma_3_1m"));
    }
}
