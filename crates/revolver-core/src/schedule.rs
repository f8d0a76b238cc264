//! Availability schedule evaluation
//!
//! A schedule is a short string stored in a resource tag or a central
//! matcher, for example:
//!
//! - `Start=08:00|mon-fri;Stop=18:00|mon-fri` (window)
//! - `Stop=19:00` (barrier: fires once, shortly after 19:00)
//! - `24x7`, `24x5`, `0x7` (literals)
//! - `override` (leave the resource alone)
//!
//! Evaluation never fails; a string that says nothing usable yields
//! [`Directive::Unparseable`] with a reason suitable for a warning tag.

use chrono::{DateTime, Datelike, Duration, Timelike, Weekday};
use chrono_tz::Tz;
use regex::Regex;
use revolver_util::{weekday_name, DayRange, WallClock};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

static OVERRIDE_CLAUSE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^override(\s*=\s*(yes|on))?$").expect("override clause pattern")
});

static COMPONENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(start|stop)\s*=\s*(\d{1,2}:\d{2})(?:\s*\|\s*([a-z]+)(?:\s*-\s*([a-z]+))?)?")
        .expect("schedule component pattern")
});

/// Outcome of evaluating a schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Directive {
    Start,
    Stop,
    Noop,
    Unparseable,
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Directive::Start => "START",
            Directive::Stop => "STOP",
            Directive::Noop => "NOOP",
            Directive::Unparseable => "UNPARSEABLE",
        };
        f.write_str(s)
    }
}

/// Directive plus the human-readable reason behind it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub directive: Directive,
    pub reason: String,
}

impl Evaluation {
    fn new(directive: Directive, reason: impl Into<String>) -> Self {
        Self {
            directive,
            reason: reason.into(),
        }
    }
}

/// Literal availability modes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Literal {
    None,
    /// `24x7`
    AlwaysOn,
    /// `24x5`: on during weekdays
    Weekdays,
    /// `0x7` and anything else starting with `0x`
    AlwaysOff,
}

/// A `start=` or `stop=` component
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedComponent {
    pub time: WallClock,
    pub days: Option<DayRange>,
}

impl ParsedComponent {
    fn applies_on(&self, day: Weekday) -> bool {
        self.days.is_none_or(|range| range.contains(day))
    }
}

/// Structured form of a schedule string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedAvailability {
    pub is_override: bool,
    pub literal: Literal,
    pub start: Option<ParsedComponent>,
    pub stop: Option<ParsedComponent>,
}

impl ParsedAvailability {
    /// Parse a schedule string. Unknown clauses are ignored.
    pub fn parse(tag: &str) -> Self {
        let normalized = tag.trim().to_lowercase().replace('/', ";").replace('_', "|");
        let clauses: Vec<&str> = normalized.split(';').map(str::trim).collect();

        let is_override = clauses.iter().any(|c| OVERRIDE_CLAUSE.is_match(c));

        let literal = if clauses.contains(&"24x7") {
            Literal::AlwaysOn
        } else if clauses.iter().any(|c| c.starts_with("0x")) {
            Literal::AlwaysOff
        } else if clauses.contains(&"24x5") {
            Literal::Weekdays
        } else {
            Literal::None
        };

        let mut start = None;
        let mut stop = None;
        for caps in COMPONENT.captures_iter(&normalized) {
            let slot = if &caps[1] == "start" { &mut start } else { &mut stop };
            if slot.is_some() {
                continue;
            }
            *slot = parse_component(
                &caps[2],
                caps.get(3).map(|m| m.as_str()),
                caps.get(4).map(|m| m.as_str()),
            );
        }

        Self {
            is_override,
            literal,
            start,
            stop,
        }
    }
}

fn parse_component(time: &str, lower: Option<&str>, upper: Option<&str>) -> Option<ParsedComponent> {
    let time = WallClock::parse(time)?;
    let days = match (lower, upper) {
        (None, _) => None,
        (Some(lower), None) => Some(DayRange::parse(lower)?),
        (Some(lower), Some(upper)) => Some(DayRange::parse(&format!("{lower}-{upper}"))?),
    };
    Some(ParsedComponent { time, days })
}

fn days_label(days: Option<DayRange>) -> String {
    days.map(|d| d.to_string())
        .unwrap_or_else(|| "all week".to_string())
}

/// Evaluates schedule strings against a zoned instant
#[derive(Debug, Clone, Copy)]
pub struct ScheduleEvaluator {
    tolerance: Duration,
}

impl Default for ScheduleEvaluator {
    fn default() -> Self {
        Self::new(Duration::minutes(15))
    }
}

impl ScheduleEvaluator {
    /// `tolerance` is how long a barrier keeps firing after its time
    pub fn new(tolerance: Duration) -> Self {
        Self { tolerance }
    }

    pub fn tolerance(&self) -> Duration {
        self.tolerance
    }

    pub fn evaluate(&self, tag: &str, now: DateTime<Tz>) -> Evaluation {
        let parsed = ParsedAvailability::parse(tag);

        if parsed.is_override {
            return Evaluation::new(Directive::Noop, "Availability override");
        }

        match parsed.literal {
            Literal::AlwaysOn => return Evaluation::new(Directive::Start, "Availability 24x7"),
            Literal::AlwaysOff => return Evaluation::new(Directive::Stop, "Availability 0x7"),
            Literal::Weekdays => {
                let day = now.weekday();
                let directive = if matches!(day, Weekday::Sat | Weekday::Sun) {
                    Directive::Stop
                } else {
                    Directive::Start
                };
                return Evaluation::new(
                    directive,
                    format!("Availability 24x5 and it is {}", weekday_name(day)),
                );
            }
            Literal::None => {}
        }

        match (parsed.start, parsed.stop) {
            (Some(start), Some(stop)) => Self::window(start, stop, now),
            (Some(start), None) => self.barrier("Start", Directive::Start, start, now),
            (None, Some(stop)) => self.barrier("Stop", Directive::Stop, stop, now),
            (None, None) => Evaluation::new(
                Directive::Unparseable,
                format!("Unparseable availability \"{}\"", tag),
            ),
        }
    }

    fn window(start: ParsedComponent, stop: ParsedComponent, now: DateTime<Tz>) -> Evaluation {
        let time = now.time();
        let start_time = start.time.to_naive_time();
        let stop_time = stop.time.to_naive_time();

        let in_time = if start_time > stop_time {
            time >= start_time || time < stop_time
        } else {
            time >= start_time && time < stop_time
        };
        let day = now.weekday();
        let in_days = start.applies_on(day) && stop.applies_on(day);

        let (directive, position) = if in_time && in_days {
            (Directive::Start, "Inside")
        } else {
            (Directive::Stop, "Outside")
        };
        Evaluation::new(
            directive,
            format!(
                "{} availability window {}-{} {}",
                position,
                start.time,
                stop.time,
                days_label(start.days.or(stop.days))
            ),
        )
    }

    fn barrier(
        &self,
        label: &str,
        directive: Directive,
        component: ParsedComponent,
        now: DateTime<Tz>,
    ) -> Evaluation {
        let elapsed = i64::from(now.num_seconds_from_midnight())
            - i64::from(component.time.as_seconds_from_midnight());
        let reached = elapsed >= 0
            && elapsed < self.tolerance.num_seconds()
            && component.applies_on(now.weekday());

        let days = days_label(component.days);
        if reached {
            Evaluation::new(
                directive,
                format!("{} barrier {} {} reached", label, component.time, days),
            )
        } else {
            Evaluation::new(
                Directive::Noop,
                format!("{} barrier {} {} not in effect", label, component.time, days),
            )
        }
    }
}
