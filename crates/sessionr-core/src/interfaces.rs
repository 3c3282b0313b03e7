//! Seams to the external collaborators: the historical bar store, the
//! live feed and the execution layer. The core depends only on these
//! traits; concrete adapters live outside the session runtime.

use crossbeam_channel::Receiver;
use sessionr_data::store::Result as StoreResult;
use sessionr_data::{Bar, BarStore, Interval};

/// Persistent tabular bar store. Bars are unique on
/// (symbol, interval, timestamp); writes are idempotent upserts.
pub trait HistoricalStore: Send + Sync {
    /// Ordered bars in [start_ts, end_ts).
    fn get_bars(
        &self,
        symbol: &str,
        interval: Interval,
        start_ts: i64,
        end_ts: i64,
    ) -> StoreResult<Vec<Bar>>;

    fn bulk_upsert(&self, bars: &[Bar]) -> StoreResult<usize>;

    fn date_range(&self, symbol: &str) -> StoreResult<Option<(i64, i64)>>;

    fn has_data(
        &self,
        symbol: &str,
        interval: Interval,
        start_ts: i64,
        end_ts: i64,
    ) -> StoreResult<bool>;
}

impl HistoricalStore for BarStore {
    fn get_bars(
        &self,
        symbol: &str,
        interval: Interval,
        start_ts: i64,
        end_ts: i64,
    ) -> StoreResult<Vec<Bar>> {
        BarStore::get_bars(self, symbol, interval, start_ts, end_ts)
    }

    fn bulk_upsert(&self, bars: &[Bar]) -> StoreResult<usize> {
        BarStore::bulk_upsert(self, bars)
    }

    fn date_range(&self, symbol: &str) -> StoreResult<Option<(i64, i64)>> {
        BarStore::date_range(self, symbol)
    }

    fn has_data(
        &self,
        symbol: &str,
        interval: Interval,
        start_ts: i64,
        end_ts: i64,
    ) -> StoreResult<bool> {
        BarStore::has_data(self, symbol, interval, start_ts, end_ts)
    }
}

/// Push-style market-data feed. `subscribe` registers interest; bars
/// arrive on the receiver with wall-clock timing.
pub trait FeedAdapter: Send + Sync {
    fn subscribe(&self, symbols: &[String]) -> anyhow::Result<()>;

    /// Whether the feed can serve this symbol at all. Used by
    /// provisioning validation before any subscription is attempted.
    fn knows_symbol(&self, symbol: &str) -> bool;

    fn bars(&self) -> Receiver<(String, Bar)>;
}

/// The only execution-layer surface the core consumes: whether a
/// symbol currently has an open position or pending order.
pub trait ExecutionAdapter: Send + Sync {
    fn is_symbol_locked(&self, symbol: &str) -> bool;
}

/// Execution adapter that locks nothing; used when no broker is wired
/// in (pure data sessions, tests).
#[derive(Debug, Default)]
pub struct NullExecutionAdapter;

impl ExecutionAdapter for NullExecutionAdapter {
    fn is_symbol_locked(&self, _symbol: &str) -> bool {
        false
    }
}

/// Feed adapter that delivers nothing. Replay sessions source bars
/// from the store, so this stands in wherever a feed is required but
/// never consulted.
pub struct NullFeedAdapter {
    rx: Receiver<(String, Bar)>,
    _tx: crossbeam_channel::Sender<(String, Bar)>,
}

impl NullFeedAdapter {
    pub fn new() -> Self {
        let (tx, rx) = crossbeam_channel::bounded(1);
        Self { rx, _tx: tx }
    }
}

impl Default for NullFeedAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl FeedAdapter for NullFeedAdapter {
    fn subscribe(&self, _symbols: &[String]) -> anyhow::Result<()> {
        Ok(())
    }

    fn knows_symbol(&self, _symbol: &str) -> bool {
        false
    }

    fn bars(&self) -> Receiver<(String, Bar)> {
        self.rx.clone()
    }
}
