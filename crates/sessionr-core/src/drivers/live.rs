//! Live driver: adapts an external push feed onto the coordinator
//! queue. Same downstream contract as replay, wall-clock timing.

use crate::coordinator::PauseGate;
use crate::events::DriverEvent;
use crate::interfaces::FeedAdapter;
use crossbeam_channel::Sender;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

const SUBSCRIBE_ATTEMPTS: u32 = 6;

pub struct LiveDriver {
    feed: Arc<dyn FeedAdapter>,
    symbols: Vec<String>,
    pause_gate: Arc<PauseGate>,
    stop_flag: Arc<AtomicBool>,
    tx: Sender<DriverEvent>,
}

impl LiveDriver {
    pub fn new(
        feed: Arc<dyn FeedAdapter>,
        symbols: Vec<String>,
        pause_gate: Arc<PauseGate>,
        stop_flag: Arc<AtomicBool>,
        tx: Sender<DriverEvent>,
    ) -> Self {
        Self {
            feed,
            symbols,
            pause_gate,
            stop_flag,
            tx,
        }
    }

    pub fn run(&self) {
        if !self.subscribe_with_backoff() {
            let _ = self.tx.send(DriverEvent::StreamEnd);
            return;
        }

        let mut rx = self.feed.bars();
        loop {
            if self.stop_flag.load(Ordering::SeqCst) {
                break;
            }
            let (_, bar) = match rx.recv_timeout(Duration::from_millis(500)) {
                Ok(event) => event,
                Err(crossbeam_channel::RecvTimeoutError::Timeout) => continue,
                Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                    warn!("feed disconnected, attempting resubscribe");
                    if !self.subscribe_with_backoff() {
                        break;
                    }
                    rx = self.feed.bars();
                    continue;
                }
            };

            while !self.pause_gate.wait_running(Duration::from_millis(200)) {
                if self.stop_flag.load(Ordering::SeqCst) {
                    let _ = self.tx.send(DriverEvent::StreamEnd);
                    return;
                }
            }
            if self.tx.send(DriverEvent::Bar(bar)).is_err() {
                break;
            }
        }

        let _ = self.tx.send(DriverEvent::StreamEnd);
        debug!("live driver stopped");
    }

    /// Exponential back-off on adapter failures: 1s, 2s, 4s... capped
    /// at 30s, bounded attempts. Transient feed errors never reach the
    /// pipeline.
    fn subscribe_with_backoff(&self) -> bool {
        let mut delay = Duration::from_secs(1);
        for attempt in 0..SUBSCRIBE_ATTEMPTS {
            if self.stop_flag.load(Ordering::SeqCst) {
                return false;
            }
            match self.feed.subscribe(&self.symbols) {
                Ok(()) => return true,
                Err(e) => {
                    warn!(attempt, error = %e, "feed subscription failed");
                    std::thread::sleep(delay);
                    delay = (delay * 2).min(Duration::from_secs(30));
                }
            }
        }
        error!("feed unavailable after {SUBSCRIBE_ATTEMPTS} attempts");
        false
    }
}
