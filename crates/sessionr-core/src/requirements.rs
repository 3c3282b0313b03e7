//! Stream and indicator requirement analysis: which base interval a
//! session must stream, and how much history an indicator needs.

use crate::errors::ConfigError;
use crate::indicators::IndicatorConfig;
use chrono::NaiveDate;
use sessionr_data::{Interval, IntervalUnit, TradingCalendar};

/// History request multiplier: fetch twice the strictly-needed days so
/// thin sessions and partial coverage still warm indicators up.
const HISTORY_BUFFER: u32 = 2;

/// Ordering key for base-interval selection: `1s < 1m < 1d < 1w`, and
/// within a unit by multiplier.
pub fn interval_priority(interval: &Interval) -> (u8, u32) {
    let unit_rank = match interval.unit() {
        IntervalUnit::Second => 0,
        IntervalUnit::Minute => 1,
        IntervalUnit::Day => 2,
        IntervalUnit::Week => 3,
    };
    (unit_rank, interval.n())
}

/// Select the base interval a session must stream so that every
/// requested stream is either the base itself or derivable from it.
/// An empty stream list defaults to `1m`.
pub fn required_base_interval(streams: &[Interval]) -> Result<Interval, ConfigError> {
    let mut base = match streams.iter().min_by_key(|i| interval_priority(i)) {
        Some(finest) => *finest,
        None => return Ok(Interval::MIN_1),
    };
    // A non-unit finest stream (e.g. streams = ["5m", "15m"]) is its
    // own base only if everything else divides it; otherwise the
    // session must stream the unit interval.
    for stream in streams {
        if *stream != base && !stream.derives_from(&base) {
            let unit_base = base.base_of_unit();
            if *stream != unit_base && !stream.derives_from(&unit_base) {
                return Err(ConfigError::NonDerivableStream {
                    stream: stream.to_string(),
                    base: base.to_string(),
                });
            }
            base = unit_base;
        }
    }
    Ok(base)
}

/// Everything provisioning needs to satisfy one indicator: the
/// intervals that must exist, the warm-up bar count, and the calendar
/// days of history to request.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorRequirements {
    pub required_intervals: Vec<Interval>,
    pub warm_up_bars: usize,
    pub historical_days: u32,
}

/// Deterministic over its inputs; the calendar walk back from `as_of`
/// counts real trading-day capacity, so early closes shrink what one
/// day contributes.
pub fn indicator_requirements(
    config: &IndicatorConfig,
    base: Interval,
    calendar: &TradingCalendar,
    as_of: NaiveDate,
) -> IndicatorRequirements {
    let mut required_intervals = vec![base];
    if config.interval != base {
        required_intervals.push(config.interval);
    }

    let warm_up_bars = config.warm_up_bars();
    let strict_days = trading_days_for_bars(config.interval, warm_up_bars, calendar, as_of);
    IndicatorRequirements {
        required_intervals,
        warm_up_bars,
        historical_days: strict_days * HISTORY_BUFFER,
    }
}

fn trading_days_for_bars(
    interval: Interval,
    bars: usize,
    calendar: &TradingCalendar,
    as_of: NaiveDate,
) -> u32 {
    if bars == 0 {
        return 0;
    }
    match interval.unit() {
        IntervalUnit::Day => bars as u32,
        IntervalUnit::Week => bars as u32 * 5,
        IntervalUnit::Second | IntervalUnit::Minute => {
            let interval_ms = interval.duration_ms();
            let mut remaining = bars as i64;
            let mut days = 0u32;
            let mut cursor = as_of;
            // Bounded back-walk; a calendar with no open days within
            // two years of as_of is treated as one day per bar batch.
            for _ in 0..500 {
                match calendar.prev_trading_day(cursor, 1) {
                    Some(day) => {
                        let capacity =
                            (calendar.session_close_ms(day) - calendar.session_open_ms(day))
                                / interval_ms;
                        remaining -= capacity.max(0);
                        days += 1;
                        cursor = day;
                        if remaining <= 0 {
                            return days;
                        }
                    }
                    None => break,
                }
            }
            days.max(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::IndicatorKind;

    fn parse(tags: &[&str]) -> Vec<Interval> {
        tags.iter().map(|t| t.parse().unwrap()).collect()
    }

    #[test]
    fn test_priority_order() {
        let order = parse(&["1s", "5s", "1m", "5m", "1d", "1w"]);
        for pair in order.windows(2) {
            assert!(interval_priority(&pair[0]) < interval_priority(&pair[1]));
        }
    }

    #[test]
    fn test_base_selection_single_unit() {
        assert_eq!(
            required_base_interval(&parse(&["1m", "5m", "15m"])).unwrap(),
            Interval::MIN_1
        );
        assert_eq!(
            required_base_interval(&parse(&["1d", "5d"])).unwrap(),
            Interval::DAY_1
        );
        assert_eq!(
            required_base_interval(&parse(&["1w", "4w"])).unwrap(),
            Interval::WEEK_1
        );
    }

    #[test]
    fn test_base_selection_mixed_units() {
        assert_eq!(
            required_base_interval(&parse(&["1s", "5s", "1m", "5m"])).unwrap(),
            Interval::SEC_1
        );
        assert_eq!(
            required_base_interval(&parse(&["1m", "5m", "1d"])).unwrap(),
            Interval::MIN_1
        );
        assert_eq!(
            required_base_interval(&parse(&["1d", "1w", "4w"])).unwrap(),
            Interval::DAY_1
        );
        assert_eq!(
            required_base_interval(&parse(&["1s", "1m", "5m", "1d", "1w"])).unwrap(),
            Interval::SEC_1
        );
    }

    #[test]
    fn test_base_stays_on_finest_stream_when_it_divides() {
        // 15m aggregates cleanly from 5m; no need to stream 1m.
        assert_eq!(
            required_base_interval(&parse(&["5m", "15m"])).unwrap(),
            Interval::MIN_5
        );
    }

    #[test]
    fn test_base_widens_to_unit_when_needed() {
        // 7m does not divide by 5m, so the session streams 1m.
        assert_eq!(
            required_base_interval(&parse(&["5m", "7m"])).unwrap(),
            Interval::MIN_1
        );
    }

    #[test]
    fn test_empty_stream_list_defaults() {
        assert_eq!(required_base_interval(&[]).unwrap(), Interval::MIN_1);
    }

    #[test]
    fn test_determinism() {
        let streams = parse(&["1m", "5m", "1d"]);
        let first = required_base_interval(&streams).unwrap();
        for _ in 0..10 {
            assert_eq!(required_base_interval(&streams).unwrap(), first);
        }
    }

    #[test]
    fn test_indicator_requirements_intraday() {
        let calendar = TradingCalendar::us_equities();
        let as_of = NaiveDate::from_ymd_opt(2025, 1, 10).unwrap();
        let config = IndicatorConfig::new(IndicatorKind::Rsi, 14, Interval::MIN_5);

        let req = indicator_requirements(&config, Interval::MIN_1, &calendar, as_of);
        assert_eq!(req.required_intervals, vec![Interval::MIN_1, Interval::MIN_5]);
        assert_eq!(req.warm_up_bars, 15);
        // 15 five-minute bars fit inside one 390-minute session; 2x buffer.
        assert_eq!(req.historical_days, 2);
    }

    #[test]
    fn test_indicator_requirements_daily() {
        let calendar = TradingCalendar::us_equities();
        let as_of = NaiveDate::from_ymd_opt(2025, 1, 10).unwrap();
        let config = IndicatorConfig::new(IndicatorKind::Sma, 20, Interval::DAY_1);

        let req = indicator_requirements(&config, Interval::MIN_1, &calendar, as_of);
        assert_eq!(req.required_intervals, vec![Interval::MIN_1, Interval::DAY_1]);
        assert_eq!(req.warm_up_bars, 20);
        assert_eq!(req.historical_days, 40);
    }

    #[test]
    fn test_indicator_on_base_emits_single_interval() {
        let calendar = TradingCalendar::us_equities();
        let as_of = NaiveDate::from_ymd_opt(2025, 1, 10).unwrap();
        let config = IndicatorConfig::new(IndicatorKind::Vwap, 0, Interval::MIN_1);

        let req = indicator_requirements(&config, Interval::MIN_1, &calendar, as_of);
        assert_eq!(req.required_intervals, vec![Interval::MIN_1]);
        assert_eq!(req.warm_up_bars, 1);
    }
}
