//! Pause gate between the drivers and the coordinator. Cleared means
//! paused: producers block in `wait_running` until resumed.

use std::sync::{Condvar, Mutex};
use std::time::Duration;

pub struct PauseGate {
    running: Mutex<bool>,
    condvar: Condvar,
}

impl PauseGate {
    pub fn new() -> Self {
        Self {
            running: Mutex::new(true),
            condvar: Condvar::new(),
        }
    }

    pub fn pause(&self) {
        let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        *running = false;
    }

    pub fn resume(&self) {
        let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        *running = true;
        drop(running);
        self.condvar.notify_all();
    }

    pub fn is_paused(&self) -> bool {
        !*self.running.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Block while paused. The timeout bounds each wait so shutdown
    /// can always get through; returns false if still paused.
    pub fn wait_running(&self, timeout: Duration) -> bool {
        let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        let deadline = std::time::Instant::now() + timeout;
        while !*running {
            let remaining = deadline.saturating_duration_since(std::time::Instant::now());
            if remaining.is_zero() {
                return false;
            }
            let (next, _) = self
                .condvar
                .wait_timeout(running, remaining)
                .unwrap_or_else(|e| e.into_inner());
            running = next;
        }
        true
    }
}

impl Default for PauseGate {
    fn default() -> Self {
        Self::new()
    }
}
