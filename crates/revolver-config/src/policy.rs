//! Validated policy structures

use crate::filter::FilterSpec;
use crate::schema::{RawAccount, RawConfig, RawDefaults, RawDriver, RawMatcher, RawPlugin};
use crate::validation::parse_timezone;
use chrono::Duration;
use chrono_tz::Tz;
use revolver_util::AccountId;
use tracing::warn;

pub const DEFAULT_SCHEDULE_TAG: &str = "Schedule";
pub const DEFAULT_TIMEZONE_TAG: &str = "Timezone";
pub const DEFAULT_WARNING_TAG: &str = "ScheduleWarning";
pub const DEFAULT_BARRIER_TOLERANCE_MINUTES: u32 = 15;

/// Validated policy ready for use by the core engine
#[derive(Debug, Clone)]
pub struct Policy {
    pub defaults: Defaults,
    pub accounts: Vec<Account>,
    pub drivers: Vec<DriverSettings>,
    /// Plugins in configured order
    pub plugins: Vec<PluginSettings>,
}

impl Policy {
    /// Convert from raw config (after validation)
    pub fn from_raw(raw: RawConfig) -> Self {
        Self {
            defaults: Defaults::from_raw(raw.defaults),
            accounts: raw.accounts.into_iter().map(Account::from_raw).collect(),
            drivers: raw.drivers.into_iter().map(DriverSettings::from_raw).collect(),
            plugins: raw.plugins.into_iter().map(PluginSettings::from_raw).collect(),
        }
    }
}

/// Run-wide settings
#[derive(Debug, Clone)]
pub struct Defaults {
    pub schedule_tag: String,
    pub timezone_tag: String,
    /// Used when a resource has no (valid) timezone tag
    pub timezone: Tz,
    pub warning_tag: String,
    pub barrier_tolerance: Duration,
    /// Accounts processed at once. 0 means unbounded.
    pub concurrency: usize,
    pub pretend: bool,
}

impl Defaults {
    fn from_raw(raw: RawDefaults) -> Self {
        Self {
            schedule_tag: raw
                .schedule_tag
                .unwrap_or_else(|| DEFAULT_SCHEDULE_TAG.into()),
            timezone_tag: raw
                .timezone_tag
                .unwrap_or_else(|| DEFAULT_TIMEZONE_TAG.into()),
            timezone: raw
                .timezone
                .as_deref()
                .and_then(parse_timezone)
                .unwrap_or(Tz::UTC),
            warning_tag: raw
                .warning_tag
                .unwrap_or_else(|| DEFAULT_WARNING_TAG.into()),
            barrier_tolerance: Duration::minutes(i64::from(
                raw.barrier_tolerance_minutes
                    .filter(|m| *m > 0)
                    .unwrap_or(DEFAULT_BARRIER_TOLERANCE_MINUTES),
            )),
            concurrency: raw.concurrency.unwrap_or(0),
            pretend: raw.pretend.unwrap_or(false),
        }
    }
}

impl Default for Defaults {
    fn default() -> Self {
        Self::from_raw(RawDefaults::default())
    }
}

/// Account to evaluate
#[derive(Debug, Clone)]
pub struct Account {
    pub id: AccountId,
    pub name: Option<String>,
}

impl Account {
    fn from_raw(raw: RawAccount) -> Self {
        Self {
            id: AccountId::new(raw.id),
            name: raw.name,
        }
    }

    /// Name for logs: the display name if set, else the ID
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(self.id.as_str())
    }
}

/// Enabled driver
#[derive(Debug, Clone)]
pub struct DriverSettings {
    pub name: String,
    /// Never empty: defaults to the driver name
    pub resource_types: Vec<String>,
    pub pretend: bool,
}

impl DriverSettings {
    fn from_raw(raw: RawDriver) -> Self {
        let resource_types = if raw.resources.is_empty() {
            vec![raw.name.clone()]
        } else {
            raw.resources
        };
        Self {
            name: raw.name,
            resource_types,
            pretend: raw.pretend,
        }
    }
}

/// Which resources a plugin looks at, and whether its actions are dry-run
#[derive(Debug, Clone, Default)]
pub struct PluginScope {
    /// Empty means every resource type
    pub resource_types: Vec<String>,
    pub pretend: bool,
}

impl PluginScope {
    pub fn applies_to(&self, resource_type: &str) -> bool {
        self.resource_types.is_empty() || self.resource_types.iter().any(|t| t == resource_type)
    }
}

/// Validated plugin definition
#[derive(Debug, Clone)]
pub enum PluginSettings {
    Powercycle {
        scope: PluginScope,
    },
    PowercycleCentral {
        scope: PluginScope,
        availability_tag_priority: f64,
        matchers: Vec<MatcherSettings>,
    },
    ValidateTags {
        scope: PluginScope,
        tags: Vec<String>,
        on_missing: Vec<MissingTagAction>,
    },
}

impl PluginSettings {
    fn from_raw(raw: RawPlugin) -> Self {
        match raw {
            RawPlugin::Powercycle { resources, pretend } => PluginSettings::Powercycle {
                scope: PluginScope {
                    resource_types: resources,
                    pretend,
                },
            },
            RawPlugin::PowercycleCentral {
                resources,
                pretend,
                availability_tag_priority,
                matchers,
            } => PluginSettings::PowercycleCentral {
                scope: PluginScope {
                    resource_types: resources,
                    pretend,
                },
                availability_tag_priority: priority_or_zero(availability_tag_priority),
                matchers: matchers.into_iter().map(MatcherSettings::from_raw).collect(),
            },
            RawPlugin::ValidateTags {
                resources,
                pretend,
                tags,
                on_missing,
            } => {
                let mut actions: Vec<MissingTagAction> = on_missing
                    .iter()
                    .filter_map(|m| MissingTagAction::parse(m))
                    .collect();
                if actions.is_empty() {
                    actions.push(MissingTagAction::Warn);
                }
                actions.dedup();
                PluginSettings::ValidateTags {
                    scope: PluginScope {
                        resource_types: resources,
                        pretend,
                    },
                    tags,
                    on_missing: actions,
                }
            }
        }
    }

    /// Plugin type name as written in configuration
    pub fn type_name(&self) -> &'static str {
        match self {
            PluginSettings::Powercycle { .. } => "powercycle",
            PluginSettings::PowercycleCentral { .. } => "powercycleCentral",
            PluginSettings::ValidateTags { .. } => "validateTags",
        }
    }

    pub fn scope(&self) -> &PluginScope {
        match self {
            PluginSettings::Powercycle { scope }
            | PluginSettings::PowercycleCentral { scope, .. }
            | PluginSettings::ValidateTags { scope, .. } => scope,
        }
    }
}

/// Named, prioritised (filter, schedule) pair
#[derive(Debug, Clone)]
pub struct MatcherSettings {
    pub name: String,
    pub filter: FilterSpec,
    pub schedule: String,
    /// NaN and missing priorities are 0
    pub priority: f64,
}

impl MatcherSettings {
    fn from_raw(raw: RawMatcher) -> Self {
        Self {
            filter: FilterSpec::from_raw(&raw.filter).unwrap_or_else(|e| {
                warn!(matcher = %raw.name, error = %e, "Invalid matcher filter; matcher disabled");
                FilterSpec::Bool(false)
            }),
            name: raw.name,
            schedule: raw.schedule,
            priority: priority_or_zero(raw.priority),
        }
    }
}

fn priority_or_zero(priority: Option<f64>) -> f64 {
    priority.filter(|p| !p.is_nan()).unwrap_or(0.0)
}

/// What `validateTags` does about a missing tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingTagAction {
    /// Set a `Warning<Tag>` tag
    Warn,
    /// Stop the resource
    Stop,
}

impl MissingTagAction {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "warn" => Some(MissingTagAction::Warn),
            "stop" => Some(MissingTagAction::Stop),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let defaults = Defaults::default();
        assert_eq!(defaults.schedule_tag, "Schedule");
        assert_eq!(defaults.timezone_tag, "Timezone");
        assert_eq!(defaults.warning_tag, "ScheduleWarning");
        assert_eq!(defaults.timezone, Tz::UTC);
        assert_eq!(defaults.barrier_tolerance, Duration::minutes(15));
        assert_eq!(defaults.concurrency, 0);
        assert!(!defaults.pretend);
    }

    #[test]
    fn test_driver_resource_types_default_to_name() {
        let driver = DriverSettings::from_raw(RawDriver {
            name: "rds".into(),
            resources: vec![],
            pretend: false,
        });
        assert_eq!(driver.resource_types, vec!["rds".to_string()]);
    }

    #[test]
    fn test_plugin_scope() {
        let all = PluginScope::default();
        assert!(all.applies_to("ec2"));

        let ec2_only = PluginScope {
            resource_types: vec!["ec2".into()],
            pretend: false,
        };
        assert!(ec2_only.applies_to("ec2"));
        assert!(!ec2_only.applies_to("rds"));
    }

    #[test]
    fn test_priority_nan_is_zero() {
        assert_eq!(priority_or_zero(Some(f64::NAN)), 0.0);
        assert_eq!(priority_or_zero(None), 0.0);
        assert_eq!(priority_or_zero(Some(7.5)), 7.5);
    }

    #[test]
    fn test_validate_tags_defaults_to_warn() {
        let plugin = PluginSettings::from_raw(RawPlugin::ValidateTags {
            resources: vec![],
            pretend: false,
            tags: vec!["Owner".into()],
            on_missing: vec![],
        });
        match plugin {
            PluginSettings::ValidateTags { on_missing, .. } => {
                assert_eq!(on_missing, vec![MissingTagAction::Warn]);
            }
            other => panic!("unexpected plugin {other:?}"),
        }
    }
}
