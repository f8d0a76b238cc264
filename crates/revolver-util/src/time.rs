//! Time utilities for revolver
//!
//! Provides wall-clock times and weekday ranges (for availability schedules)
//! and the single place where the process reads the system clock.
//!
//! # Mock Time for Development
//!
//! In debug builds, the `REVOLVER_MOCK_TIME` environment variable can be set
//! to override the system time used when a run starts. This is useful for
//! replaying schedules against a fixed moment.
//!
//! Format: `YYYY-MM-DD HH:MM:SS` in UTC (e.g., `2025-12-25 14:30:00`)

use chrono::{DateTime, NaiveDateTime, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// Environment variable name for mock time (debug builds only)
pub const MOCK_TIME_ENV_VAR: &str = "REVOLVER_MOCK_TIME";

/// Format accepted by [`MOCK_TIME_ENV_VAR`]
pub const MOCK_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Cached mock time offset from the real time when the process started.
/// This allows mock time to advance naturally.
static MOCK_TIME_OFFSET: OnceLock<Option<chrono::Duration>> = OnceLock::new();

#[allow(clippy::disallowed_methods)] // This is the internal implementation that wraps Utc::now()
fn get_mock_time_offset() -> Option<chrono::Duration> {
    *MOCK_TIME_OFFSET.get_or_init(|| {
        #[cfg(debug_assertions)]
        {
            if let Ok(mock_time_str) = std::env::var(MOCK_TIME_ENV_VAR) {
                match NaiveDateTime::parse_from_str(&mock_time_str, MOCK_TIME_FORMAT) {
                    Ok(naive_dt) => {
                        let offset = naive_dt.and_utc().signed_duration_since(Utc::now());
                        tracing::info!(
                            mock_time = %mock_time_str,
                            offset_secs = offset.num_seconds(),
                            "Mock time enabled"
                        );
                        return Some(offset);
                    }
                    Err(_) => {
                        tracing::warn!(
                            mock_time = %mock_time_str,
                            expected_format = MOCK_TIME_FORMAT,
                            "Invalid mock time format"
                        );
                    }
                }
            }
            None
        }
        #[cfg(not(debug_assertions))]
        {
            None
        }
    })
}

/// Get the current UTC time, respecting mock time settings in debug builds.
///
/// Runs read this exactly once and thread the value through evaluation.
#[allow(clippy::disallowed_methods)] // This is the wrapper that provides mock time support
pub fn now() -> DateTime<Utc> {
    let real_now = Utc::now();

    if let Some(offset) = get_mock_time_offset() {
        real_now + offset
    } else {
        real_now
    }
}

/// Wall-clock time of day with minute precision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WallClock {
    pub hour: u8,
    pub minute: u8,
}

impl WallClock {
    pub fn new(hour: u8, minute: u8) -> Option<Self> {
        if hour < 24 && minute < 60 {
            Some(Self { hour, minute })
        } else {
            None
        }
    }

    /// Parse `H:MM` or `HH:MM`
    pub fn parse(s: &str) -> Option<Self> {
        let (hour, minute) = s.trim().split_once(':')?;
        if hour.is_empty() || hour.len() > 2 || minute.len() != 2 {
            return None;
        }
        Self::new(hour.parse().ok()?, minute.parse().ok()?)
    }

    pub fn to_naive_time(self) -> NaiveTime {
        NaiveTime::from_hms_opt(u32::from(self.hour), u32::from(self.minute), 0)
            .unwrap_or(NaiveTime::MIN)
    }

    /// Returns seconds since midnight
    pub fn as_seconds_from_midnight(&self) -> u32 {
        u32::from(self.hour) * 3600 + u32::from(self.minute) * 60
    }
}

impl PartialOrd for WallClock {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for WallClock {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.as_seconds_from_midnight()
            .cmp(&other.as_seconds_from_midnight())
    }
}

impl fmt::Display for WallClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

/// Parse a three-letter (or full) English weekday name, case-insensitively
pub fn parse_weekday(s: &str) -> Option<Weekday> {
    match s.trim().to_lowercase().as_str() {
        "mon" | "monday" => Some(Weekday::Mon),
        "tue" | "tuesday" => Some(Weekday::Tue),
        "wed" | "wednesday" => Some(Weekday::Wed),
        "thu" | "thursday" => Some(Weekday::Thu),
        "fri" | "friday" => Some(Weekday::Fri),
        "sat" | "saturday" => Some(Weekday::Sat),
        "sun" | "sunday" => Some(Weekday::Sun),
        _ => None,
    }
}

/// Lowercase three-letter abbreviation
pub fn weekday_abbrev(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "mon",
        Weekday::Tue => "tue",
        Weekday::Wed => "wed",
        Weekday::Thu => "thu",
        Weekday::Fri => "fri",
        Weekday::Sat => "sat",
        Weekday::Sun => "sun",
    }
}

/// Full English name, capitalized
pub fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

/// Inclusive range of weekdays, e.g. `mon-fri`.
///
/// When `lower` comes after `upper` the range wraps through the weekend:
/// `fri-tue` covers Fri, Sat, Sun, Mon and Tue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayRange {
    pub lower: Weekday,
    pub upper: Weekday,
}

impl DayRange {
    pub fn new(lower: Weekday, upper: Weekday) -> Self {
        Self { lower, upper }
    }

    /// Parse `ddd-ddd` or a single `ddd`
    pub fn parse(s: &str) -> Option<Self> {
        match s.split_once('-') {
            Some((lower, upper)) => Some(Self::new(parse_weekday(lower)?, parse_weekday(upper)?)),
            None => {
                let day = parse_weekday(s)?;
                Some(Self::new(day, day))
            }
        }
    }

    pub fn contains(&self, day: Weekday) -> bool {
        let lower = self.lower.num_days_from_monday();
        let upper = self.upper.num_days_from_monday();
        let day = day.num_days_from_monday();

        if lower <= upper {
            lower <= day && day <= upper
        } else {
            day >= lower || day <= upper
        }
    }
}

impl fmt::Display for DayRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", weekday_abbrev(self.lower), weekday_abbrev(self.upper))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wall_clock_ordering() {
        let morning = WallClock::new(8, 0).unwrap();
        let noon = WallClock::new(12, 0).unwrap();
        let evening = WallClock::new(18, 30).unwrap();

        assert!(morning < noon);
        assert!(noon < evening);
        assert!(morning < evening);
    }

    #[test]
    fn test_wall_clock_parse() {
        assert_eq!(WallClock::parse("06:30"), WallClock::new(6, 30));
        assert_eq!(WallClock::parse("6:30"), WallClock::new(6, 30));
        assert_eq!(WallClock::parse("23:59"), WallClock::new(23, 59));

        assert!(WallClock::parse("24:00").is_none());
        assert!(WallClock::parse("12:60").is_none());
        assert!(WallClock::parse("12:5").is_none());
        assert!(WallClock::parse("noon").is_none());
    }

    #[test]
    fn test_wall_clock_display() {
        assert_eq!(WallClock::new(6, 5).unwrap().to_string(), "06:05");
    }

    #[test]
    fn test_day_range_plain() {
        let range = DayRange::parse("mon-fri").unwrap();
        assert!(range.contains(Weekday::Mon));
        assert!(range.contains(Weekday::Fri));
        assert!(!range.contains(Weekday::Sat));
        assert!(!range.contains(Weekday::Sun));
        assert_eq!(range.to_string(), "mon-fri");
    }

    #[test]
    fn test_day_range_wraps() {
        let range = DayRange::parse("fri-tue").unwrap();
        for day in [Weekday::Fri, Weekday::Sat, Weekday::Sun, Weekday::Mon, Weekday::Tue] {
            assert!(range.contains(day), "{day} should be inside fri-tue");
        }
        assert!(!range.contains(Weekday::Wed));
        assert!(!range.contains(Weekday::Thu));
    }

    #[test]
    fn test_day_range_single_day() {
        let range = DayRange::parse("sat").unwrap();
        assert!(range.contains(Weekday::Sat));
        assert!(!range.contains(Weekday::Sun));
    }

    #[test]
    fn test_day_range_rejects_unknown_day() {
        assert!(DayRange::parse("mon-xyz").is_none());
        assert!(DayRange::parse("").is_none());
    }

    #[test]
    fn test_weekday_names() {
        assert_eq!(weekday_name(Weekday::Sat), "Saturday");
        assert_eq!(weekday_abbrev(Weekday::Thu), "thu");
        assert_eq!(parse_weekday("Wednesday"), Some(Weekday::Wed));
    }

    #[test]
    fn test_now_returns_time() {
        use chrono::Datelike;

        let t = now();
        assert!(t.year() >= 2020);
        assert!(t.year() <= 2100);
    }

    #[test]
    fn test_parse_mock_time_format() {
        for format_str in ["2025-12-25 14:30:00", "2025-01-01 00:00:00"] {
            assert!(NaiveDateTime::parse_from_str(format_str, MOCK_TIME_FORMAT).is_ok());
        }
        for format_str in ["2025-12-25", "14:30:00", "2025-12-25T14:30:00", ""] {
            assert!(NaiveDateTime::parse_from_str(format_str, MOCK_TIME_FORMAT).is_err());
        }
    }
}
