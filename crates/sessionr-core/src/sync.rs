//! One-shot, reusable signalling between the pipeline stages.

use std::fmt;
use std::sync::{Condvar, Mutex};
use std::time::Duration;

const DEFAULT_CLOCK_WAIT: Duration = Duration::from_secs(1);

/// How a subscription's waiters behave.
///
/// Data-driven waiters block until signalled, which is what makes a
/// backtest deterministic: the producer cannot outrun its consumer.
/// Clock-driven and live waiters time out instead, and a signal that
/// lands while the flag is still set counts as an overrun and is
/// dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    DataDriven,
    ClockDriven,
    Live,
}

impl SyncMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncMode::DataDriven => "data-driven",
            SyncMode::ClockDriven => "clock-driven",
            SyncMode::Live => "live",
        }
    }

    pub fn waits_for_ack(&self) -> bool {
        matches!(self, SyncMode::DataDriven)
    }
}

#[derive(Debug, Default)]
struct SubscriptionState {
    ready: bool,
    stopped: bool,
    overruns: u64,
}

/// A one-shot signal following the strict signal -> wait -> reset
/// cycle. All waiters unblock on a single signal. `stop` opens the
/// gate permanently so shutdown never leaves a waiter parked.
pub struct StreamSubscription {
    mode: SyncMode,
    stream_id: String,
    state: Mutex<SubscriptionState>,
    condvar: Condvar,
}

impl StreamSubscription {
    pub fn new(mode: SyncMode, stream_id: impl Into<String>) -> Self {
        Self {
            mode,
            stream_id: stream_id.into(),
            state: Mutex::new(SubscriptionState::default()),
            condvar: Condvar::new(),
        }
    }

    pub fn mode(&self) -> SyncMode {
        self.mode
    }

    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    pub fn signal_ready(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.ready && self.mode != SyncMode::DataDriven {
            state.overruns += 1;
            return;
        }
        state.ready = true;
        drop(state);
        self.condvar.notify_all();
    }

    /// Block until signalled. Data-driven ignores `timeout`; the other
    /// modes fall back to a 1s default when none is given. Returns
    /// true when the signal (or stop) arrived, false on timeout.
    pub fn wait_until_ready(&self, timeout: Option<Duration>) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        match self.mode {
            SyncMode::DataDriven => {
                while !state.ready && !state.stopped {
                    state = self
                        .condvar
                        .wait(state)
                        .unwrap_or_else(|e| e.into_inner());
                }
                true
            }
            SyncMode::ClockDriven | SyncMode::Live => {
                let timeout = timeout.unwrap_or(DEFAULT_CLOCK_WAIT);
                let deadline = std::time::Instant::now() + timeout;
                while !state.ready && !state.stopped {
                    let remaining = deadline.saturating_duration_since(std::time::Instant::now());
                    if remaining.is_zero() {
                        return false;
                    }
                    let (next, result) = self
                        .condvar
                        .wait_timeout(state, remaining)
                        .unwrap_or_else(|e| e.into_inner());
                    state = next;
                    if result.timed_out() && !state.ready && !state.stopped {
                        return false;
                    }
                }
                true
            }
        }
    }

    pub fn reset(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.ready = false;
    }

    pub fn is_ready(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .ready
    }

    pub fn overrun_count(&self) -> u64 {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .overruns
    }

    /// Permanently unblock all waiters; part of session shutdown.
    pub fn stop(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.stopped = true;
        drop(state);
        self.condvar.notify_all();
    }

    pub fn is_stopped(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .stopped
    }
}

impl fmt::Debug for StreamSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        f.debug_struct("StreamSubscription")
            .field("stream_id", &self.stream_id)
            .field("mode", &self.mode.as_str())
            .field("ready", &state.ready)
            .field("overruns", &state.overruns)
            .finish()
    }
}
