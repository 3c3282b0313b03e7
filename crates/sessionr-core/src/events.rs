//! Notification stream out of the processor, and the internal
//! messages flowing between the pipeline workers.

use chrono::NaiveDate;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use sessionr_data::Bar;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Bar,
    Indicator,
}

/// One state-advance notice to downstream consumers. Dropped notices
/// are never replayed; the next emission is enough to re-read state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub symbol: String,
    pub interval: String,
    pub kind: NotificationKind,
}

/// Bounded notification fan-out. Full-queue and inactive-session
/// drops are counted, not blocked on: the processor never stalls on a
/// slow strategy reader.
pub struct NotificationQueue {
    tx: Sender<Notification>,
    rx: Receiver<Notification>,
    dropped: AtomicU64,
}

impl NotificationQueue {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity);
        Self {
            tx,
            rx,
            dropped: AtomicU64::new(0),
        }
    }

    pub fn publish(&self, notification: Notification) {
        match self.tx.try_send(notification) {
            Ok(()) => {}
            Err(TrySendError::Full(n)) | Err(TrySendError::Disconnected(n)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                debug!(symbol = %n.symbol, interval = %n.interval, "notification dropped");
            }
        }
    }

    pub fn receiver(&self) -> Receiver<Notification> {
        self.rx.clone()
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Driver -> coordinator stream.
#[derive(Debug, Clone, PartialEq)]
pub enum DriverEvent {
    Bar(Bar),
    /// All sources drained for this trading day.
    SessionEnd(NaiveDate),
    /// The driver has nothing further to produce.
    StreamEnd,
}

/// Coordinator -> processor stream.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessorMessage {
    /// A base bar for `symbol` landed at `timestamp`; `retro` marks a
    /// gap-fill insertion behind the stream head.
    BarAppended {
        symbol: String,
        timestamp: i64,
        retro: bool,
    },
    Shutdown,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(symbol: &str) -> Notification {
        Notification {
            symbol: symbol.to_string(),
            interval: "1m".to_string(),
            kind: NotificationKind::Bar,
        }
    }

    #[test]
    fn test_publish_and_receive() {
        let queue = NotificationQueue::new(4);
        queue.publish(note("AAPL"));
        let received = queue.receiver().try_recv().unwrap();
        assert_eq!(received.symbol, "AAPL");
        assert_eq!(received.kind, NotificationKind::Bar);
    }

    #[test]
    fn test_full_queue_drops_without_blocking() {
        let queue = NotificationQueue::new(2);
        queue.publish(note("A"));
        queue.publish(note("B"));
        queue.publish(note("C"));

        assert_eq!(queue.dropped_count(), 1);
        let rx = queue.receiver();
        assert_eq!(rx.try_recv().unwrap().symbol, "A");
        assert_eq!(rx.try_recv().unwrap().symbol, "B");
        assert!(rx.try_recv().is_err());
    }
}
