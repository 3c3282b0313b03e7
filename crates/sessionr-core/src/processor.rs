//! Consumes "base bar appended" events, rolls derived intervals,
//! updates indicators and feeds the notification stream.

use crate::events::{Notification, NotificationKind, NotificationQueue, ProcessorMessage};
use crate::indicators::IndicatorManager;
use crate::session::{InsertOutcome, SessionData};
use crate::sync::{StreamSubscription, SyncMode};
use chrono::Datelike;
use crossbeam_channel::Receiver;
use sessionr_data::{
    aggregate_bars, ms_to_date, Bar, Interval, IntervalUnit, TradingCalendar,
};
use std::sync::Arc;
use tracing::{debug, warn};

pub struct DataProcessor {
    session_data: Arc<SessionData>,
    indicators: Arc<IndicatorManager>,
    calendar: Arc<TradingCalendar>,
    notifications: Arc<NotificationQueue>,
    /// Signalled after each cycle so analysis consumers wake up.
    analysis_sub: Arc<StreamSubscription>,
    /// In data-driven mode the processor waits here for the analysis
    /// layer's ack before releasing the coordinator. Absent when no
    /// analysis consumer is wired in.
    analysis_ack: Option<Arc<StreamSubscription>>,
    /// Signalled when the cycle is fully complete; the coordinator
    /// blocks on this in data-driven mode.
    coordinator_sub: Arc<StreamSubscription>,
    mode: SyncMode,
}

impl DataProcessor {
    pub fn new(
        session_data: Arc<SessionData>,
        indicators: Arc<IndicatorManager>,
        calendar: Arc<TradingCalendar>,
        notifications: Arc<NotificationQueue>,
        analysis_sub: Arc<StreamSubscription>,
        coordinator_sub: Arc<StreamSubscription>,
        mode: SyncMode,
    ) -> Self {
        Self {
            session_data,
            indicators,
            calendar,
            notifications,
            analysis_sub,
            analysis_ack: None,
            coordinator_sub,
            mode,
        }
    }

    pub fn with_analysis_ack(mut self, ack: Arc<StreamSubscription>) -> Self {
        self.analysis_ack = Some(ack);
        self
    }

    pub fn coordinator_subscription(&self) -> Arc<StreamSubscription> {
        Arc::clone(&self.coordinator_sub)
    }

    /// Shutdown: permanently open every gate so no waiter stays
    /// parked.
    pub fn stop_subscriptions(&self) {
        self.analysis_sub.stop();
        self.coordinator_sub.stop();
        if let Some(ack) = &self.analysis_ack {
            ack.stop();
        }
    }

    /// Worker loop: one full cycle per coordinator message.
    pub fn run(&self, rx: Receiver<ProcessorMessage>) {
        for message in rx.iter() {
            match message {
                ProcessorMessage::BarAppended {
                    symbol,
                    timestamp,
                    retro,
                } => {
                    self.process(&symbol, timestamp, retro);
                    self.analysis_sub.signal_ready();
                    if self.mode.waits_for_ack() {
                        if let Some(ack) = &self.analysis_ack {
                            ack.wait_until_ready(None);
                            ack.reset();
                        }
                    }
                    self.coordinator_sub.signal_ready();
                }
                ProcessorMessage::Shutdown => break,
            }
        }
        debug!("processor worker stopped");
    }

    /// One processing cycle for a base bar of `symbol` at `timestamp`.
    /// `retro` marks a gap-fill insertion behind the stream head:
    /// those roll derived windows retroactively but do not feed
    /// indicators, which must observe bars in order.
    pub fn process(&self, symbol: &str, timestamp: i64, retro: bool) {
        let Some(symbol_data) = self.session_data.get_symbol_data(symbol, true) else {
            return;
        };
        let base = symbol_data.base_interval;

        if !retro {
            self.notify(symbol, base, NotificationKind::Bar);
            if let Some(bar) = self.session_data.get_latest_bar(symbol, base, true) {
                self.update_indicators(symbol, base, &bar);
            }
        }

        for derived in symbol_data.derived_intervals() {
            let Some(source) = derived.derivation_source(&base) else {
                continue;
            };
            if source == base {
                self.roll_derived(symbol, derived, source, timestamp, retro);
            }
        }
    }

    fn roll_derived(
        &self,
        symbol: &str,
        derived: Interval,
        source: Interval,
        event_ts: i64,
        retro: bool,
    ) {
        let emitted = match derived.unit() {
            IntervalUnit::Second | IntervalUnit::Minute => {
                self.roll_fixed_window(symbol, derived, source, event_ts, retro)
            }
            IntervalUnit::Day if derived.n() == 1 && source.is_intraday() => {
                self.roll_session_window(symbol, derived, source, event_ts)
            }
            IntervalUnit::Day => self.roll_count_window(symbol, derived, source),
            IntervalUnit::Week => self.roll_trading_week(symbol, derived, source, event_ts),
        };

        // A freshly emitted day bar can in turn close a week window.
        if emitted {
            let Some(symbol_data) = self.session_data.get_symbol_data(symbol, true) else {
                return;
            };
            if derived == Interval::DAY_1 {
                for weekly in symbol_data.derived_intervals() {
                    if weekly.unit() == IntervalUnit::Week {
                        self.roll_trading_week(symbol, weekly, Interval::DAY_1, event_ts);
                    }
                }
            }
        }
    }

    /// Fixed-width windows (intraday derived intervals). The window
    /// whose last source tick just arrived is aggregated; earlier
    /// windows left incomplete by a gap are skipped until a fill
    /// completes them, at which point they emit retroactively.
    fn roll_fixed_window(
        &self,
        symbol: &str,
        derived: Interval,
        source: Interval,
        event_ts: i64,
        retro: bool,
    ) -> bool {
        let window_start = derived.window_start(event_ts);
        let closes_window =
            event_ts + source.duration_ms() == window_start + derived.duration_ms();
        if !retro && !closes_window {
            return false;
        }
        self.try_emit_window(
            symbol,
            derived,
            source,
            window_start,
            window_start + derived.duration_ms(),
            window_start,
        )
    }

    /// The trading-session window: one day bar aggregated from the
    /// session's intraday stream, stamped at the session open. Early
    /// closes shrink the expected count through the calendar.
    fn roll_session_window(
        &self,
        symbol: &str,
        derived: Interval,
        source: Interval,
        event_ts: i64,
    ) -> bool {
        let Some(date) = ms_to_date(event_ts) else {
            return false;
        };
        if !self.calendar.is_trading_day(date) {
            return false;
        }
        let open = self.calendar.session_open_ms(date);
        let close = self.calendar.session_close_ms(date);
        self.try_emit_window(symbol, derived, source, open, close, open)
    }

    fn try_emit_window(
        &self,
        symbol: &str,
        derived: Interval,
        source: Interval,
        window_start: i64,
        window_end: i64,
        stamp: i64,
    ) -> bool {
        if self.session_data.has_bar_at(symbol, derived, stamp) {
            return false;
        }
        let expected = ((window_end - window_start) / source.duration_ms()) as usize;
        if expected == 0 {
            return false;
        }
        let source_bars =
            self.session_data
                .get_bars_between(symbol, source, window_start, window_end, true);
        if source_bars.len() < expected {
            // Incomplete window: skipped, never emitted with partial data.
            return false;
        }

        let Some(bar) = aggregate_bars(&source_bars, derived, stamp) else {
            return false;
        };
        self.emit_derived(symbol, derived, bar)
    }

    /// Count-based aggregation for coarse same-unit derivations
    /// (e.g. 5d from a 1d base): every n source bars fold into one.
    fn roll_count_window(&self, symbol: &str, derived: Interval, source: Interval) -> bool {
        let n = (derived.duration_ms() / source.duration_ms()) as usize;
        if n == 0 {
            return false;
        }
        let source_count = self.session_data.get_bar_count(symbol, source, true);
        let derived_count = self.session_data.get_bar_count(symbol, derived, true);
        if source_count < (derived_count + 1) * n {
            return false;
        }

        let window: Vec<Bar> = self
            .session_data
            .get_last_n_bars(symbol, source, source_count - derived_count * n, true)
            .into_iter()
            .take(n)
            .collect();
        let Some(first) = window.first() else {
            return false;
        };
        let stamp = first.timestamp;
        let Some(bar) = aggregate_bars(&window, derived, stamp) else {
            return false;
        };
        self.emit_derived(symbol, derived, bar)
    }

    /// Week bars close on the week's last trading day, stamped at the
    /// week's first day bar.
    fn roll_trading_week(
        &self,
        symbol: &str,
        derived: Interval,
        source: Interval,
        event_ts: i64,
    ) -> bool {
        let Some(date) = ms_to_date(event_ts) else {
            return false;
        };
        if self.calendar.last_trading_day_of_week(date) != Some(date) {
            return false;
        }
        let monday = date - chrono::Duration::days(date.weekday().num_days_from_monday() as i64);
        let week_start = sessionr_data::to_epoch_ms(monday, chrono::NaiveTime::MIN);
        let week_end = week_start + 7 * 86_400_000;

        let day_bars =
            self.session_data
                .get_bars_between(symbol, source, week_start, week_end, true);
        let expected = self
            .calendar
            .trading_days_between(monday, monday + chrono::Duration::days(6))
            .len();
        if day_bars.len() < expected || day_bars.is_empty() {
            return false;
        }

        let stamp = day_bars[0].timestamp;
        let Some(bar) = aggregate_bars(&day_bars, derived, stamp) else {
            return false;
        };
        self.emit_derived(symbol, derived, bar)
    }

    fn emit_derived(&self, symbol: &str, derived: Interval, bar: Bar) -> bool {
        let timestamp = bar.timestamp;
        match self.session_data.insert_bar_sorted(symbol, derived, bar) {
            Ok(InsertOutcome::Appended) => {
                debug!(symbol, interval = %derived, timestamp, "derived bar emitted");
                self.notify(symbol, derived, NotificationKind::Bar);
                if let Some(bar) = self.session_data.get_latest_bar(symbol, derived, true) {
                    self.update_indicators(symbol, derived, &bar);
                }
                true
            }
            Ok(InsertOutcome::Inserted) => {
                // Retroactive emission in timestamp order after a fill.
                debug!(symbol, interval = %derived, timestamp, "derived bar emitted retroactively");
                self.notify(symbol, derived, NotificationKind::Bar);
                true
            }
            Ok(InsertOutcome::Duplicate) => {
                warn!(symbol, interval = %derived, timestamp, "derived bar dropped: timestamp conflict");
                false
            }
            Err(e) => {
                warn!(symbol, interval = %derived, timestamp, error = %e, "derived bar rejected");
                false
            }
        }
    }

    fn update_indicators(&self, symbol: &str, interval: Interval, bar: &Bar) {
        for (key, data) in self.indicators.update(symbol, interval, bar) {
            self.session_data.set_indicator(symbol, &key, data);
            self.notify(symbol, interval, NotificationKind::Indicator);
        }
    }

    fn notify(&self, symbol: &str, interval: Interval, kind: NotificationKind) {
        if kind == NotificationKind::Bar {
            // The append set the interval's dirty bit; consuming it
            // here keeps the bit scoped to one emission cycle.
            self.session_data.clear_updated(symbol, interval);
        }
        if !self.session_data.is_session_active() {
            return;
        }
        self.notifications.publish(Notification {
            symbol: symbol.to_string(),
            interval: interval.to_string(),
            kind,
        });
    }
}
