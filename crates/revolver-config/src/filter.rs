//! Filter specifications
//!
//! Filters are written as single-key tables (`{ tag = "Team|web" }`) and
//! nest through `and`, `or` and `not`. A bare array is an implicit AND and an
//! array value on a leaf is an implicit OR. [`FilterSpec::from_raw`] turns
//! that surface syntax into a typed tree; compiling regexes and path queries
//! is left to the engine that evaluates it.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors in a filter specification
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FilterSpecError {
    #[error("Invalid uptime '{0}': expected <N, >N, A-B or 'between A and B'")]
    InvalidUptime(String),

    #[error("Invalid timestamp '{0}': expected RFC 3339 or YYYY-MM-DD HH:MM[:SS]")]
    InvalidTimestamp(String),

    #[error("Empty key in '{0}'")]
    EmptyKey(String),
}

/// Filter as written in configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum RawFilter {
    /// Implicit AND
    All(Vec<RawFilter>),
    Node(Box<RawFilterNode>),
}

/// One filter kind, keyed by name
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RawFilterNode {
    Id(RawLeaf),
    Region(RawLeaf),
    State(RawLeaf),
    Type(RawLeaf),
    AccountId(RawLeaf),
    Name(RawLeaf),
    Tag(RawLeaf),
    Resource(RawLeaf),
    Bool(bool),
    Uptime(String),
    MatchWindow(RawMatchWindow),
    And(Vec<RawFilter>),
    Or(Vec<RawFilter>),
    Not(RawFilter),
}

/// Leaf value: one shorthand string or an implicit OR of several
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum RawLeaf {
    One(String),
    Many(Vec<String>),
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawMatchWindow {
    pub from: Option<String>,
    pub to: Option<String>,
}

/// Resource attribute compared by a leaf filter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Id,
    Region,
    State,
    Type,
    AccountId,
    Name,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Field::Id => "id",
            Field::Region => "region",
            Field::State => "state",
            Field::Type => "type",
            Field::AccountId => "accountId",
            Field::Name => "name",
        };
        f.write_str(name)
    }
}

/// String comparison vocabulary shared by leaf filters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareMode {
    Equals,
    IEquals,
    Contains,
    StartsWith,
    EndsWith,
    Regexp,
}

impl CompareMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "equals" => Some(CompareMode::Equals),
            "iequals" => Some(CompareMode::IEquals),
            "contains" => Some(CompareMode::Contains),
            "startswith" => Some(CompareMode::StartsWith),
            "endswith" => Some(CompareMode::EndsWith),
            "regexp" => Some(CompareMode::Regexp),
            _ => None,
        }
    }
}

/// A comparison mode plus the configured value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comparison {
    pub mode: CompareMode,
    pub value: String,
}

impl Comparison {
    pub fn equals(value: impl Into<String>) -> Self {
        Self {
            mode: CompareMode::Equals,
            value: value.into(),
        }
    }

    /// Parse `value` or `mode|value`. An unknown mode is part of the value.
    pub fn parse(s: &str) -> Self {
        match s.split_once('|') {
            Some((mode, value)) => match CompareMode::parse(mode) {
                Some(mode) => Self {
                    mode,
                    value: value.to_string(),
                },
                None => Self::equals(s),
            },
            None => Self::equals(s),
        }
    }
}

/// Parse `key`, `key|value` or `key|mode|value`
fn parse_keyed(s: &str) -> Result<(String, Option<Comparison>), FilterSpecError> {
    let mut parts = s.splitn(3, '|');
    let key = parts.next().unwrap_or_default().trim().to_string();
    if key.is_empty() {
        return Err(FilterSpecError::EmptyKey(s.to_string()));
    }

    let comparison = match (parts.next(), parts.next()) {
        (None, _) => None,
        (Some(value), None) => Some(Comparison::equals(value)),
        (Some(mode), Some(value)) => Some(match CompareMode::parse(mode) {
            Some(mode) => Comparison {
                mode,
                value: value.to_string(),
            },
            None => Comparison::equals(format!("{mode}|{value}")),
        }),
    };

    Ok((key, comparison))
}

/// One end of an uptime range, in hours
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HourBound {
    pub hours: f64,
    pub inclusive: bool,
}

/// Accepted running time, in hours since launch
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct UptimeRange {
    pub lower: Option<HourBound>,
    pub upper: Option<HourBound>,
}

impl UptimeRange {
    /// Parse `<N`, `>N`, `A-B` or `between A and B`
    pub fn parse(s: &str) -> Result<Self, FilterSpecError> {
        let invalid = || FilterSpecError::InvalidUptime(s.to_string());
        let hours = |v: &str| v.trim().parse::<f64>().ok().filter(|h| h.is_finite());
        let text = s.trim().to_lowercase();

        let (lower, upper) = if let Some(rest) = text.strip_prefix('<') {
            (None, Some(HourBound { hours: hours(rest).ok_or_else(invalid)?, inclusive: false }))
        } else if let Some(rest) = text.strip_prefix('>') {
            (Some(HourBound { hours: hours(rest).ok_or_else(invalid)?, inclusive: false }), None)
        } else {
            let (a, b) = match text.strip_prefix("between") {
                Some(rest) => rest.split_once(" and ").ok_or_else(invalid)?,
                None => text.split_once('-').ok_or_else(invalid)?,
            };
            let a = hours(a).ok_or_else(invalid)?;
            let b = hours(b).ok_or_else(invalid)?;
            if a > b {
                return Err(invalid());
            }
            (
                Some(HourBound { hours: a, inclusive: true }),
                Some(HourBound { hours: b, inclusive: true }),
            )
        };

        Ok(Self { lower, upper })
    }

    /// Whether `hours` falls in range. An unbounded range contains nothing.
    pub fn contains(&self, hours: f64) -> bool {
        if self.lower.is_none() && self.upper.is_none() {
            return false;
        }
        let above = self.lower.is_none_or(|b| {
            if b.inclusive { hours >= b.hours } else { hours > b.hours }
        });
        let below = self.upper.is_none_or(|b| {
            if b.inclusive { hours <= b.hours } else { hours < b.hours }
        });
        above && below
    }
}

/// Half-open `[from, to)` interval of instants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimeBound {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl TimeBound {
    /// Whether `now` is inside the bound. With neither end set, never.
    pub fn contains(&self, now: DateTime<Utc>) -> bool {
        if self.from.is_none() && self.to.is_none() {
            return false;
        }
        self.from.is_none_or(|from| now >= from) && self.to.is_none_or(|to| now < to)
    }
}

/// Parse an RFC 3339 timestamp or a naive `YYYY-MM-DD HH:MM[:SS]` in UTC
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, FilterSpecError> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| naive.and_utc())
        .ok_or_else(|| FilterSpecError::InvalidTimestamp(s.to_string()))
}

/// Typed filter tree
#[derive(Debug, Clone, PartialEq)]
pub enum FilterSpec {
    Field { field: Field, cmp: Comparison },
    /// `cmp: None` matches when the tag is present
    Tag { key: String, cmp: Option<Comparison> },
    /// JMESPath query against the resource's raw document
    Resource { path: String, cmp: Option<Comparison> },
    Bool(bool),
    Uptime(UptimeRange),
    MatchWindow(TimeBound),
    And(Vec<FilterSpec>),
    Or(Vec<FilterSpec>),
    Not(Box<FilterSpec>),
}

impl FilterSpec {
    pub fn from_raw(raw: &RawFilter) -> Result<Self, FilterSpecError> {
        match raw {
            RawFilter::All(items) => Ok(FilterSpec::And(Self::from_list(items)?)),
            RawFilter::Node(node) => Self::from_node(node),
        }
    }

    fn from_list(items: &[RawFilter]) -> Result<Vec<Self>, FilterSpecError> {
        items.iter().map(Self::from_raw).collect()
    }

    fn from_node(node: &RawFilterNode) -> Result<Self, FilterSpecError> {
        let field = |field: Field, leaf: &RawLeaf| {
            leaf_spec(leaf, |s| {
                Ok(FilterSpec::Field {
                    field,
                    cmp: Comparison::parse(s),
                })
            })
        };

        match node {
            RawFilterNode::Id(leaf) => field(Field::Id, leaf),
            RawFilterNode::Region(leaf) => field(Field::Region, leaf),
            RawFilterNode::State(leaf) => field(Field::State, leaf),
            RawFilterNode::Type(leaf) => field(Field::Type, leaf),
            RawFilterNode::AccountId(leaf) => field(Field::AccountId, leaf),
            RawFilterNode::Name(leaf) => field(Field::Name, leaf),
            RawFilterNode::Tag(leaf) => leaf_spec(leaf, |s| {
                let (key, cmp) = parse_keyed(s)?;
                Ok(FilterSpec::Tag { key, cmp })
            }),
            RawFilterNode::Resource(leaf) => leaf_spec(leaf, |s| {
                let (path, cmp) = parse_keyed(s)?;
                Ok(FilterSpec::Resource { path, cmp })
            }),
            RawFilterNode::Bool(value) => Ok(FilterSpec::Bool(*value)),
            RawFilterNode::Uptime(s) => Ok(FilterSpec::Uptime(UptimeRange::parse(s)?)),
            RawFilterNode::MatchWindow(window) => Ok(FilterSpec::MatchWindow(TimeBound {
                from: window.from.as_deref().map(parse_timestamp).transpose()?,
                to: window.to.as_deref().map(parse_timestamp).transpose()?,
            })),
            RawFilterNode::And(items) => Ok(FilterSpec::And(Self::from_list(items)?)),
            RawFilterNode::Or(items) => Ok(FilterSpec::Or(Self::from_list(items)?)),
            RawFilterNode::Not(inner) => Ok(FilterSpec::Not(Box::new(Self::from_raw(inner)?))),
        }
    }
}

/// A single leaf string, or an implicit OR over several
fn leaf_spec(
    leaf: &RawLeaf,
    build: impl Fn(&str) -> Result<FilterSpec, FilterSpecError>,
) -> Result<FilterSpec, FilterSpecError> {
    match leaf {
        RawLeaf::One(s) => build(s),
        RawLeaf::Many(values) => Ok(FilterSpec::Or(
            values.iter().map(|s| build(s)).collect::<Result<_, _>>()?,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn parse(toml_str: &str) -> FilterSpec {
        #[derive(Deserialize)]
        struct Wrapper {
            filter: RawFilter,
        }
        let wrapper: Wrapper = toml::from_str(toml_str).unwrap();
        FilterSpec::from_raw(&wrapper.filter).unwrap()
    }

    #[test]
    fn comparison_shorthand() {
        assert_eq!(Comparison::parse("i-123"), Comparison::equals("i-123"));
        assert_eq!(
            Comparison::parse("startswith|web"),
            Comparison {
                mode: CompareMode::StartsWith,
                value: "web".into()
            }
        );
        // Unknown mode: the whole string is the value
        assert_eq!(Comparison::parse("a|b"), Comparison::equals("a|b"));
    }

    #[test]
    fn tag_shorthand() {
        assert_eq!(
            parse_keyed("Team|web").unwrap(),
            ("Team".into(), Some(Comparison::equals("web")))
        );
        assert_eq!(
            parse_keyed("X|contains|Y").unwrap(),
            (
                "X".into(),
                Some(Comparison {
                    mode: CompareMode::Contains,
                    value: "Y".into()
                })
            )
        );
        assert_eq!(
            parse_keyed("X|regexp|a|b").unwrap().1.unwrap().value,
            "a|b"
        );
        assert_eq!(parse_keyed("Owner").unwrap(), ("Owner".into(), None));
        assert!(parse_keyed("|x").is_err());
    }

    #[test]
    fn top_level_array_is_and() {
        let spec = parse(r#"filter = [ { accountId = "1" }, { type = "ec2" } ]"#);
        match spec {
            FilterSpec::And(items) => assert_eq!(items.len(), 2),
            other => panic!("expected and, got {other:?}"),
        }
    }

    #[test]
    fn leaf_array_is_or() {
        let spec = parse(r#"filter = { state = ["running", "stopped"] }"#);
        assert_eq!(
            spec,
            FilterSpec::Or(vec![
                FilterSpec::Field {
                    field: Field::State,
                    cmp: Comparison::equals("running")
                },
                FilterSpec::Field {
                    field: Field::State,
                    cmp: Comparison::equals("stopped")
                },
            ])
        );
    }

    #[test]
    fn nested_combinators() {
        let spec = parse(
            r#"filter = { or = [ { not = { tag = "Env|prod" } }, { and = [] }, { bool = true } ] }"#,
        );
        match spec {
            FilterSpec::Or(items) => {
                assert!(matches!(items[0], FilterSpec::Not(_)));
                assert_eq!(items[1], FilterSpec::And(vec![]));
                assert_eq!(items[2], FilterSpec::Bool(true));
            }
            other => panic!("expected or, got {other:?}"),
        }
    }

    #[test]
    fn uptime_forms() {
        let lt = UptimeRange::parse("<4").unwrap();
        assert!(lt.contains(3.9));
        assert!(!lt.contains(4.0));

        let gt = UptimeRange::parse("> 24").unwrap();
        assert!(gt.contains(24.5));
        assert!(!gt.contains(24.0));

        let range = UptimeRange::parse("2-10").unwrap();
        assert!(range.contains(2.0));
        assert!(range.contains(10.0));
        assert!(!range.contains(10.1));

        let between = UptimeRange::parse("between 1.5 and 3").unwrap();
        assert!(between.contains(1.5));
        assert!(!between.contains(1.0));

        assert!(!UptimeRange::default().contains(5.0));
        assert!(UptimeRange::parse("soon").is_err());
        assert!(UptimeRange::parse("10-2").is_err());
    }

    #[test]
    fn time_bound() {
        let from = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let to = Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap();

        let closed = TimeBound { from: Some(from), to: Some(to) };
        assert!(closed.contains(from));
        assert!(!closed.contains(to));

        let open_end = TimeBound { from: Some(from), to: None };
        assert!(open_end.contains(to));

        assert!(!TimeBound::default().contains(from));
    }

    #[test]
    fn match_window_timestamps() {
        let spec = parse(
            r#"filter = { matchWindow = { from = "2026-01-01T00:00:00Z", to = "2026-02-01 12:30" } }"#,
        );
        match spec {
            FilterSpec::MatchWindow(bound) => {
                assert_eq!(bound.from, Some(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()));
                assert_eq!(bound.to, Some(Utc.with_ymd_and_hms(2026, 2, 1, 12, 30, 0).unwrap()));
            }
            other => panic!("expected matchWindow, got {other:?}"),
        }
        assert!(parse_timestamp("yesterday").is_err());
    }
}
