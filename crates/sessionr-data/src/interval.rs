use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntervalError {
    #[error("Hourly intervals are not supported: {0}")]
    HourlyUnsupported(String),
    #[error("Invalid interval tag: {0}")]
    InvalidTag(String),
    #[error("Interval multiplier must be positive: {0}")]
    ZeroMultiplier(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum IntervalUnit {
    Second,
    Minute,
    Day,
    Week,
}

impl IntervalUnit {
    pub fn suffix(&self) -> char {
        match self {
            IntervalUnit::Second => 's',
            IntervalUnit::Minute => 'm',
            IntervalUnit::Day => 'd',
            IntervalUnit::Week => 'w',
        }
    }
}

/// An interval tag `<N><unit>` where unit is seconds, minutes, days or
/// weeks. Hourly tags are rejected at parse time; sessions that want
/// 60-minute bars request `60m`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Interval {
    n: u32,
    unit: IntervalUnit,
}

impl Interval {
    pub const fn new(n: u32, unit: IntervalUnit) -> Self {
        Self { n, unit }
    }

    pub const SEC_1: Interval = Interval::new(1, IntervalUnit::Second);
    pub const MIN_1: Interval = Interval::new(1, IntervalUnit::Minute);
    pub const MIN_5: Interval = Interval::new(5, IntervalUnit::Minute);
    pub const DAY_1: Interval = Interval::new(1, IntervalUnit::Day);
    pub const WEEK_1: Interval = Interval::new(1, IntervalUnit::Week);

    pub fn n(&self) -> u32 {
        self.n
    }

    pub fn unit(&self) -> IntervalUnit {
        self.unit
    }

    /// The `1<unit>` interval this tag refines.
    pub fn base_of_unit(&self) -> Interval {
        Interval::new(1, self.unit)
    }

    pub fn is_base(&self) -> bool {
        self.n == 1
    }

    pub fn is_intraday(&self) -> bool {
        matches!(self.unit, IntervalUnit::Second | IntervalUnit::Minute)
    }

    /// Fixed duration in milliseconds. Day and week tags use nominal
    /// 24h/7d lengths; session-aware math goes through the calendar.
    pub fn duration_ms(&self) -> i64 {
        let unit_ms: i64 = match self.unit {
            IntervalUnit::Second => 1_000,
            IntervalUnit::Minute => 60_000,
            IntervalUnit::Day => 86_400_000,
            IntervalUnit::Week => 604_800_000,
        };
        unit_ms * self.n as i64
    }

    pub fn duration_secs(&self) -> i64 {
        self.duration_ms() / 1000
    }

    /// Start of the window containing `timestamp` for fixed-width
    /// intervals.
    pub fn window_start(&self, timestamp: i64) -> i64 {
        let duration = self.duration_ms();
        (timestamp.div_euclid(duration)) * duration
    }

    pub fn is_window_boundary(&self, timestamp: i64) -> bool {
        timestamp % self.duration_ms() == 0
    }

    /// Whether bars of this interval can be aggregated from `base`.
    ///
    /// Intraday derivation requires an integer duration multiple, so
    /// `5m` aggregates from `1m` or `1s` but not from `30s` when the
    /// widths do not divide. Day bars derive from a `1s`/`1m` base
    /// (aggregation across the trading session) and week bars derive
    /// from day bars; `1w` on an intraday base chains through `1d`.
    pub fn derives_from(&self, base: &Interval) -> bool {
        if self == base {
            return false;
        }
        match (self.unit, base.unit) {
            (u, b) if u == b => self.n % base.n == 0 && self.n > base.n,
            (IntervalUnit::Minute, IntervalUnit::Second) => {
                self.duration_ms() % base.duration_ms() == 0
            }
            (IntervalUnit::Day, IntervalUnit::Second)
            | (IntervalUnit::Day, IntervalUnit::Minute) => base.n == 1,
            (IntervalUnit::Week, IntervalUnit::Day) => base.n == 1,
            (IntervalUnit::Week, IntervalUnit::Second)
            | (IntervalUnit::Week, IntervalUnit::Minute) => base.n == 1,
            _ => false,
        }
    }

    /// The interval this one directly aggregates from within a session
    /// whose base is `session_base`. `5m` chains to the base itself;
    /// `1d` from a minute base chains to the base; `1w` chains to `1d`.
    pub fn derivation_source(&self, session_base: &Interval) -> Option<Interval> {
        if !self.derives_from(session_base) {
            return None;
        }
        match (self.unit, session_base.unit) {
            (IntervalUnit::Week, IntervalUnit::Second)
            | (IntervalUnit::Week, IntervalUnit::Minute) => Some(Interval::DAY_1),
            _ => Some(*session_base),
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.n, self.unit.suffix())
    }
}

impl FromStr for Interval {
    type Err = IntervalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tag = s.trim().to_lowercase();
        let split = tag
            .char_indices()
            .find(|(_, c)| c.is_ascii_alphabetic())
            .map(|(i, _)| i)
            .ok_or_else(|| IntervalError::InvalidTag(s.to_string()))?;

        let (num, unit) = tag.split_at(split);
        let n: u32 = num
            .parse()
            .map_err(|_| IntervalError::InvalidTag(s.to_string()))?;
        if n == 0 {
            return Err(IntervalError::ZeroMultiplier(s.to_string()));
        }

        let unit = match unit {
            "s" => IntervalUnit::Second,
            "m" => IntervalUnit::Minute,
            "h" => return Err(IntervalError::HourlyUnsupported(s.to_string())),
            "d" => IntervalUnit::Day,
            "w" => IntervalUnit::Week,
            _ => return Err(IntervalError::InvalidTag(s.to_string())),
        };

        Ok(Interval::new(n, unit))
    }
}

impl TryFrom<String> for Interval {
    type Error = IntervalError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Interval> for String {
    fn from(value: Interval) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_all_units() {
        assert_eq!("1s".parse::<Interval>().unwrap(), Interval::SEC_1);
        assert_eq!(
            "30s".parse::<Interval>().unwrap(),
            Interval::new(30, IntervalUnit::Second)
        );
        assert_eq!("1m".parse::<Interval>().unwrap(), Interval::MIN_1);
        assert_eq!("5m".parse::<Interval>().unwrap(), Interval::MIN_5);
        assert_eq!("1d".parse::<Interval>().unwrap(), Interval::DAY_1);
        assert_eq!(
            "52w".parse::<Interval>().unwrap(),
            Interval::new(52, IntervalUnit::Week)
        );
    }

    #[test]
    fn test_parse_case_insensitive() {
        assert_eq!("5M".parse::<Interval>().unwrap(), Interval::MIN_5);
    }

    #[test]
    fn test_reject_hourly() {
        for tag in ["1h", "2h", "4h"] {
            assert!(matches!(
                tag.parse::<Interval>(),
                Err(IntervalError::HourlyUnsupported(_))
            ));
        }
    }

    #[test]
    fn test_reject_invalid() {
        assert!("invalid".parse::<Interval>().is_err());
        assert!("5x".parse::<Interval>().is_err());
        assert!("m5".parse::<Interval>().is_err());
        assert!("0m".parse::<Interval>().is_err());
    }

    #[test]
    fn test_display_round_trip() {
        for tag in ["1s", "10s", "1m", "5m", "15m", "240m", "1d", "5d", "1w", "52w"] {
            let interval: Interval = tag.parse().unwrap();
            assert_eq!(interval.to_string(), tag);
        }
    }

    #[test]
    fn test_window_start() {
        let m5 = Interval::MIN_5;
        // 2024-01-01 00:03:30 rounds down to 00:00:00
        assert_eq!(m5.window_start(1704067410000), 1704067200000);
        assert!(m5.is_window_boundary(1704067200000));
        assert!(!m5.is_window_boundary(1704067410000));
    }

    #[test]
    fn test_derives_from_same_unit() {
        let m1 = Interval::MIN_1;
        let m5 = Interval::MIN_5;
        let m15: Interval = "15m".parse().unwrap();

        assert!(m5.derives_from(&m1));
        assert!(m15.derives_from(&m1));
        assert!(m15.derives_from(&m5));
        assert!(!m1.derives_from(&m1));
        assert!(!m5.derives_from(&m15));

        let m7: Interval = "7m".parse().unwrap();
        assert!(!m7.derives_from(&m5));
    }

    #[test]
    fn test_derives_from_cross_unit() {
        assert!(Interval::DAY_1.derives_from(&Interval::MIN_1));
        assert!(Interval::WEEK_1.derives_from(&Interval::DAY_1));
        assert!(Interval::WEEK_1.derives_from(&Interval::MIN_1));
        assert!(Interval::MIN_1.derives_from(&Interval::SEC_1));
        assert!(Interval::MIN_5.derives_from(&Interval::SEC_1));
        // Day bars aggregate the session's finest stream, not a coarser one.
        assert!(!Interval::DAY_1.derives_from(&Interval::MIN_5));
        let s30 = Interval::new(30, IntervalUnit::Second);
        assert!(Interval::MIN_5.derives_from(&s30));
    }

    #[test]
    fn test_derivation_source() {
        let m1 = Interval::MIN_1;
        assert_eq!(Interval::MIN_5.derivation_source(&m1), Some(m1));
        assert_eq!(Interval::DAY_1.derivation_source(&m1), Some(m1));
        assert_eq!(
            Interval::WEEK_1.derivation_source(&m1),
            Some(Interval::DAY_1)
        );
        assert_eq!(m1.derivation_source(&m1), None);
    }

    #[test]
    fn test_serde_round_trip() {
        let interval: Interval = "15m".parse().unwrap();
        let json = serde_json::to_string(&interval).unwrap();
        assert_eq!(json, "\"15m\"");
        let back: Interval = serde_json::from_str(&json).unwrap();
        assert_eq!(back, interval);
    }
}
