//! Per-symbol catch-up detection. The sole mechanism that pauses
//! external readers without stopping internal derivation.

use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LagAction {
    None,
    Deactivate { lag_secs: i64 },
    Reactivate { lag_secs: i64 },
}

#[derive(Debug)]
pub struct LagController {
    counters: HashMap<String, u64>,
    check_every: u64,
    threshold_ms: i64,
}

impl LagController {
    pub fn new(check_every: u64, threshold_secs: i64) -> Self {
        Self {
            counters: HashMap::new(),
            check_every: check_every.max(1),
            threshold_ms: threshold_secs * 1_000,
        }
    }

    /// Called once per processed bar. Checks run on every K-th bar per
    /// symbol, counting from zero so a symbol's very first bar is
    /// checked immediately.
    pub fn on_bar(
        &mut self,
        symbol: &str,
        bar_timestamp: i64,
        now_ms: i64,
        session_active: bool,
    ) -> LagAction {
        let counter = self.counters.entry(symbol.to_string()).or_insert(0);
        let check = *counter % self.check_every == 0;
        *counter += 1;
        if !check {
            return LagAction::None;
        }

        let lag_ms = now_ms - bar_timestamp;
        let lag_secs = lag_ms / 1_000;
        if lag_ms > self.threshold_ms && session_active {
            LagAction::Deactivate { lag_secs }
        } else if lag_ms <= self.threshold_ms && !session_active {
            LagAction::Reactivate { lag_secs }
        } else {
            LagAction::None
        }
    }

    pub fn reset(&mut self) {
        self.counters.clear();
    }

    pub fn forget_symbol(&mut self, symbol: &str) {
        self.counters.remove(symbol);
    }
}
