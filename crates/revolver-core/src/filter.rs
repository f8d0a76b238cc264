//! Filter engine
//!
//! [`Filter::build`] compiles a [`FilterSpec`] once (regexes, path queries)
//! and the result is reused for every resource in a run. Matching takes the
//! run's `now` explicitly so uptime and match windows are reproducible.

use chrono::{DateTime, Utc};
use jmespath::Variable;
use regex::Regex;
use revolver_api::Resource;
use revolver_config::{CompareMode, Comparison, Field, FilterSpec, TimeBound, UptimeRange};
use thiserror::Error;

/// Errors building or evaluating a filter
#[derive(Debug, Error)]
pub enum FilterError {
    #[error("Invalid regular expression '{pattern}': {source}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Invalid resource path '{path}': {message}")]
    InvalidPath { path: String, message: String },

    #[error("Query '{path}' failed: {message}")]
    Query { path: String, message: String },
}

/// Compiled string comparison
#[derive(Debug, Clone)]
pub enum StringMatcher {
    Equals(String),
    /// Holds the lowercased value
    IEquals(String),
    Contains(String),
    StartsWith(String),
    EndsWith(String),
    Regexp(Regex),
}

impl StringMatcher {
    pub fn build(cmp: &Comparison) -> Result<Self, FilterError> {
        let value = cmp.value.clone();
        Ok(match cmp.mode {
            CompareMode::Equals => StringMatcher::Equals(value),
            CompareMode::IEquals => StringMatcher::IEquals(value.to_lowercase()),
            CompareMode::Contains => StringMatcher::Contains(value),
            CompareMode::StartsWith => StringMatcher::StartsWith(value),
            CompareMode::EndsWith => StringMatcher::EndsWith(value),
            CompareMode::Regexp => StringMatcher::Regexp(Regex::new(&value).map_err(|source| {
                FilterError::InvalidRegex {
                    pattern: value.clone(),
                    source,
                }
            })?),
        })
    }

    pub fn is_match(&self, candidate: &str) -> bool {
        match self {
            StringMatcher::Equals(v) => candidate == v,
            StringMatcher::IEquals(v) => candidate.to_lowercase() == *v,
            StringMatcher::Contains(v) => candidate.contains(v.as_str()),
            StringMatcher::StartsWith(v) => candidate.starts_with(v.as_str()),
            StringMatcher::EndsWith(v) => candidate.ends_with(v.as_str()),
            StringMatcher::Regexp(re) => re.is_match(candidate),
        }
    }
}

/// Compiled filter tree
#[derive(Debug, Clone)]
pub enum Filter {
    Field {
        field: Field,
        matcher: StringMatcher,
    },
    Tag {
        key: String,
        matcher: Option<StringMatcher>,
    },
    /// JMESPath query over the raw resource document. The expression is
    /// validated at build time and compiled again per match.
    Resource {
        path: String,
        matcher: Option<StringMatcher>,
    },
    Bool(bool),
    Uptime(UptimeRange),
    MatchWindow(TimeBound),
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
}

impl Filter {
    pub fn build(spec: &FilterSpec) -> Result<Self, FilterError> {
        let optional = |cmp: &Option<Comparison>| cmp.as_ref().map(StringMatcher::build).transpose();

        Ok(match spec {
            FilterSpec::Field { field, cmp } => Filter::Field {
                field: *field,
                matcher: StringMatcher::build(cmp)?,
            },
            FilterSpec::Tag { key, cmp } => Filter::Tag {
                key: key.clone(),
                matcher: optional(cmp)?,
            },
            FilterSpec::Resource { path, cmp } => {
                jmespath::compile(path).map_err(|e| FilterError::InvalidPath {
                    path: path.clone(),
                    message: e.to_string(),
                })?;
                Filter::Resource {
                    path: path.clone(),
                    matcher: optional(cmp)?,
                }
            }
            FilterSpec::Bool(value) => Filter::Bool(*value),
            FilterSpec::Uptime(range) => Filter::Uptime(*range),
            FilterSpec::MatchWindow(bound) => Filter::MatchWindow(*bound),
            FilterSpec::And(items) => Filter::And(Self::build_all(items)?),
            FilterSpec::Or(items) => Filter::Or(Self::build_all(items)?),
            FilterSpec::Not(inner) => Filter::Not(Box::new(Self::build(inner)?)),
        })
    }

    fn build_all(items: &[FilterSpec]) -> Result<Vec<Self>, FilterError> {
        items.iter().map(Self::build).collect()
    }

    /// Whether `resource` passes the filter at `now`.
    ///
    /// Empty `and`/`or` lists never match. Errors only come from path
    /// queries; callers resolving matchers treat them as a non-match.
    pub fn matches(&self, resource: &Resource, now: DateTime<Utc>) -> Result<bool, FilterError> {
        match self {
            Filter::Field { field, matcher } => {
                Ok(field_value(resource, *field).is_some_and(|v| matcher.is_match(v)))
            }
            Filter::Tag { key, matcher } => Ok(match (resource.tag(key), matcher) {
                (None, _) => false,
                (Some(_), None) => true,
                (Some(value), Some(matcher)) => matcher.is_match(value),
            }),
            Filter::Resource { path, matcher } => {
                let found = query(resource, path)?;
                Ok(match (found, matcher) {
                    (None, _) => false,
                    (Some(_), None) => true,
                    (Some(value), Some(matcher)) => matcher.is_match(&value),
                })
            }
            Filter::Bool(value) => Ok(*value),
            Filter::Uptime(range) => Ok(uptime_hours(resource, now).is_some_and(|h| range.contains(h))),
            Filter::MatchWindow(bound) => Ok(bound.contains(now)),
            Filter::And(items) => {
                if items.is_empty() {
                    return Ok(false);
                }
                for item in items {
                    if !item.matches(resource, now)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Filter::Or(items) => {
                for item in items {
                    if item.matches(resource, now)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Filter::Not(inner) => Ok(!inner.matches(resource, now)?),
        }
    }
}

/// Empty strings count as absent
fn field_value(resource: &Resource, field: Field) -> Option<&str> {
    let value = match field {
        Field::Id => resource.id.as_str(),
        Field::Region => resource.region.as_str(),
        Field::State => resource.state.as_str(),
        Field::Type => resource.resource_type.as_str(),
        Field::AccountId => resource.account_id.as_str(),
        Field::Name => resource.name()?,
    };
    (!value.is_empty()).then_some(value)
}

/// Hours since launch, for running resources only
fn uptime_hours(resource: &Resource, now: DateTime<Utc>) -> Option<f64> {
    if !resource.state.is_running() {
        return None;
    }
    let launched = resource.launch_time?;
    Some((now - launched).num_seconds() as f64 / 3600.0)
}

/// Run a path query. `null` results are `None`; scalars become their text,
/// anything else its JSON form.
fn query(resource: &Resource, path: &str) -> Result<Option<String>, FilterError> {
    let failed = |message: String| FilterError::Query {
        path: path.to_string(),
        message,
    };

    let expr = jmespath::compile(path).map_err(|e| failed(e.to_string()))?;
    let result = expr.search(&resource.raw).map_err(|e| failed(e.to_string()))?;

    Ok(match &*result {
        Variable::Null => None,
        Variable::String(s) => Some(s.clone()),
        Variable::Bool(b) => Some(b.to_string()),
        Variable::Number(n) => Some(n.to_string()),
        other => Some(serde_json::to_string(other).map_err(|e| failed(e.to_string()))?),
    })
}
