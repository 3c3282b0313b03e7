//! Historical replay driver: pulls bars from the store in timestamp
//! order, paces them against a virtual clock and feeds the
//! coordinator queue.

use crate::clock::{Clock, VirtualClock};
use crate::coordinator::PauseGate;
use crate::events::DriverEvent;
use crate::interfaces::HistoricalStore;
use crate::session::SessionData;
use chrono::NaiveDate;
use crossbeam_channel::Sender;
use sessionr_data::{Bar, Interval, TradingCalendar};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub struct BacktestDriver {
    store: Arc<dyn HistoricalStore>,
    calendar: Arc<TradingCalendar>,
    session_data: Arc<SessionData>,
    clock: Arc<VirtualClock>,
    /// The configured universe; the session store may add to it
    /// mid-day but never shrinks what the driver replays.
    config_symbols: Vec<String>,
    base_interval: Interval,
    start_date: NaiveDate,
    end_date: NaiveDate,
    /// Bars per wall-clock second; 0 replays as fast as possible.
    speed_multiplier: f64,
    pause_gate: Arc<PauseGate>,
    stop_flag: Arc<AtomicBool>,
    tx: Sender<DriverEvent>,
}

impl BacktestDriver {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn HistoricalStore>,
        calendar: Arc<TradingCalendar>,
        session_data: Arc<SessionData>,
        clock: Arc<VirtualClock>,
        config_symbols: Vec<String>,
        base_interval: Interval,
        start_date: NaiveDate,
        end_date: NaiveDate,
        speed_multiplier: f64,
        pause_gate: Arc<PauseGate>,
        stop_flag: Arc<AtomicBool>,
        tx: Sender<DriverEvent>,
    ) -> Self {
        Self {
            store,
            calendar,
            session_data,
            clock,
            config_symbols,
            base_interval,
            start_date,
            end_date,
            speed_multiplier,
            pause_gate,
            stop_flag,
            tx,
        }
    }

    /// Worker body: replay each trading day in the configured range,
    /// emitting a session-end event when a day's sources drain.
    pub fn run(&self) {
        let mut date = if self.calendar.is_trading_day(self.start_date) {
            Some(self.start_date)
        } else {
            self.calendar.next_trading_day(self.start_date, 1)
        };

        while let Some(day) = date {
            if day > self.end_date || self.stopped() {
                break;
            }
            info!(%day, "replaying trading day");
            if !self.replay_day(day) {
                break;
            }
            if self.tx.send(DriverEvent::SessionEnd(day)).is_err() {
                break;
            }
            date = self.calendar.next_trading_day(day, 1);
        }

        let _ = self.tx.send(DriverEvent::StreamEnd);
        debug!("backtest driver stopped");
    }

    fn replay_day(&self, day: NaiveDate) -> bool {
        let open = self.calendar.session_open_ms(day);
        let close = self.calendar.session_close_ms(day);
        self.clock.set(open);

        let mut symbols = self.tracked_symbols();
        let mut queue = self.load_day_bars(&symbols, open, close);

        while !queue.is_empty() {
            if self.stopped() {
                return false;
            }
            // Block while a mid-session addition has the stream paused.
            while !self.pause_gate.wait_running(Duration::from_millis(200)) {
                if self.stopped() {
                    return false;
                }
            }

            // A scanner or strategy may have provisioned new symbols;
            // splice their remaining bars into the day's queue.
            let current = self.tracked_symbols();
            if current != symbols {
                let added: Vec<String> = current
                    .iter()
                    .filter(|s| !symbols.contains(s))
                    .cloned()
                    .collect();
                if !added.is_empty() {
                    let horizon = self.clock.now_ms() + self.base_interval.duration_ms();
                    let mut extra = self.load_day_bars(&added, horizon.max(open), close);
                    queue.append(&mut extra);
                    queue.sort_by_key(|b| b.timestamp);
                    debug!(count = added.len(), "driver picked up new symbols");
                }
                symbols = current;
            }

            let bar = queue.remove(0);
            self.pace(bar.timestamp);
            self.clock.advance_to(bar.timestamp);
            if self.tx.send(DriverEvent::Bar(bar)).is_err() {
                warn!("coordinator queue closed");
                return false;
            }
        }

        // Let downstream clocks see the session as complete.
        self.clock.advance_to(close);
        true
    }

    fn tracked_symbols(&self) -> Vec<String> {
        let mut symbols = self.config_symbols.clone();
        for symbol in self.session_data.get_active_symbols(true) {
            if !symbols.contains(&symbol) {
                symbols.push(symbol);
            }
        }
        symbols.sort();
        symbols
    }

    fn load_day_bars(&self, symbols: &[String], start_ms: i64, end_ms: i64) -> Vec<Bar> {
        let mut bars = Vec::new();
        for symbol in symbols {
            match self
                .store
                .get_bars(symbol, self.base_interval, start_ms, end_ms)
            {
                Ok(mut symbol_bars) => bars.append(&mut symbol_bars),
                Err(e) => warn!(symbol = symbol.as_str(), error = %e, "driver failed to load day bars"),
            }
        }
        bars.sort_by_key(|b| b.timestamp);
        bars
    }

    fn pace(&self, next_ts: i64) {
        if self.speed_multiplier <= 0.0 {
            return;
        }
        let gap_ms = (next_ts - self.clock.now_ms()).max(0) as f64;
        let sleep_ms = gap_ms / self.speed_multiplier;
        if sleep_ms >= 1.0 {
            std::thread::sleep(Duration::from_millis(sleep_ms as u64));
        }
    }

    fn stopped(&self) -> bool {
        self.stop_flag.load(Ordering::SeqCst)
    }
}
