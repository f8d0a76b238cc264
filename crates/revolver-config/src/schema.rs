//! Raw configuration schema (as parsed from TOML)

use serde::{Deserialize, Serialize};

use crate::filter::RawFilter;

/// Raw configuration as parsed from TOML
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawConfig {
    /// Config schema version
    pub config_version: u32,

    /// Run-wide defaults
    #[serde(default)]
    pub defaults: RawDefaults,

    /// Accounts to evaluate
    #[serde(default)]
    pub accounts: Vec<RawAccount>,

    /// Enabled drivers
    #[serde(default)]
    pub drivers: Vec<RawDriver>,

    /// Policy plugins, applied in order
    #[serde(default)]
    pub plugins: Vec<RawPlugin>,
}

/// Run-wide settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawDefaults {
    /// Tag holding a resource's own schedule (default: Schedule)
    pub schedule_tag: Option<String>,

    /// Tag holding a resource's IANA timezone (default: Timezone)
    pub timezone_tag: Option<String>,

    /// Timezone used when a resource has no timezone tag (default: UTC)
    pub timezone: Option<String>,

    /// Tag written when a schedule cannot be parsed (default: ScheduleWarning)
    pub warning_tag: Option<String>,

    /// How long a start-only or stop-only schedule keeps firing (default: 15)
    pub barrier_tolerance_minutes: Option<u32>,

    /// Accounts processed at once; 0 means all at once (default: 0)
    pub concurrency: Option<usize>,

    /// Force every driver into dry-run
    pub pretend: Option<bool>,
}

/// Account definition
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawAccount {
    pub id: String,

    /// Display name
    pub name: Option<String>,
}

/// Driver definition
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawDriver {
    /// Driver name, e.g. "ec2"
    pub name: String,

    /// Resource types this driver handles (default: the driver name)
    #[serde(default)]
    pub resources: Vec<String>,

    /// Log instead of executing
    #[serde(default)]
    pub pretend: bool,
}

/// Raw plugin definition
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RawPlugin {
    /// Schedule taken from each resource's own schedule tag
    Powercycle {
        #[serde(default)]
        resources: Vec<String>,
        #[serde(default)]
        pretend: bool,
    },
    /// Schedule taken from centrally defined matchers
    PowercycleCentral {
        #[serde(default)]
        resources: Vec<String>,
        #[serde(default)]
        pretend: bool,
        /// Priority of a resource's own schedule tag against matchers
        availability_tag_priority: Option<f64>,
        #[serde(default)]
        matchers: Vec<RawMatcher>,
    },
    /// Required-tag checks
    ValidateTags {
        #[serde(default)]
        resources: Vec<String>,
        #[serde(default)]
        pretend: bool,
        tags: Vec<String>,
        /// "warn" and/or "stop" (default: warn)
        #[serde(default)]
        on_missing: Vec<String>,
    },
}

/// Central policy matcher
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawMatcher {
    pub name: String,
    pub filter: RawFilter,
    pub schedule: String,
    pub priority: Option<f64>,
}
