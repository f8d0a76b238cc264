//! Configuration validation

use crate::filter::{FilterSpec, FilterSpecError};
use crate::schema::{RawConfig, RawDefaults, RawPlugin};
use chrono_tz::Tz;
use std::collections::HashSet;
use thiserror::Error;

/// Validation error
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("Duplicate account ID: {0}")]
    DuplicateAccountId(String),

    #[error("Account ID cannot be empty")]
    EmptyAccountId,

    #[error("Duplicate driver: {0}")]
    DuplicateDriver(String),

    #[error("Unknown timezone '{0}'")]
    UnknownTimezone(String),

    #[error("Plugin {index} ({plugin}): {message}")]
    PluginError {
        index: usize,
        plugin: &'static str,
        message: String,
    },

    #[error("Matcher '{matcher}': {source}")]
    InvalidFilter {
        matcher: String,
        #[source]
        source: FilterSpecError,
    },

    #[error("Global config error: {0}")]
    GlobalError(String),
}

/// Validate a raw configuration, collecting every error
pub fn validate_config(config: &RawConfig) -> Vec<ValidationError> {
    let mut errors = validate_defaults(&config.defaults);

    let mut seen_accounts = HashSet::new();
    for account in &config.accounts {
        if account.id.trim().is_empty() {
            errors.push(ValidationError::EmptyAccountId);
        } else if !seen_accounts.insert(&account.id) {
            errors.push(ValidationError::DuplicateAccountId(account.id.clone()));
        }
    }

    let mut seen_drivers = HashSet::new();
    for driver in &config.drivers {
        if driver.name.trim().is_empty() {
            errors.push(ValidationError::GlobalError("driver name cannot be empty".into()));
        } else if !seen_drivers.insert(&driver.name) {
            errors.push(ValidationError::DuplicateDriver(driver.name.clone()));
        }
    }

    for (index, plugin) in config.plugins.iter().enumerate() {
        errors.extend(validate_plugin(index, plugin));
    }

    errors
}

fn validate_defaults(defaults: &RawDefaults) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if let Some(tz) = &defaults.timezone
        && parse_timezone(tz).is_none()
    {
        errors.push(ValidationError::UnknownTimezone(tz.clone()));
    }

    let tag_names = [
        ("schedule_tag", &defaults.schedule_tag),
        ("timezone_tag", &defaults.timezone_tag),
        ("warning_tag", &defaults.warning_tag),
    ];
    for (field, value) in tag_names {
        if value.as_deref().is_some_and(|v| v.trim().is_empty()) {
            errors.push(ValidationError::GlobalError(format!("{field} cannot be empty")));
        }
    }

    if defaults.barrier_tolerance_minutes == Some(0) {
        errors.push(ValidationError::GlobalError(
            "barrier_tolerance_minutes must be greater than 0".into(),
        ));
    }

    errors
}

fn validate_plugin(index: usize, plugin: &RawPlugin) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let plugin_error = |name: &'static str, message: String| ValidationError::PluginError {
        index,
        plugin: name,
        message,
    };

    match plugin {
        RawPlugin::Powercycle { .. } => {}
        RawPlugin::PowercycleCentral { matchers, .. } => {
            let mut seen = HashSet::new();
            for matcher in matchers {
                if matcher.name.trim().is_empty() {
                    errors.push(plugin_error(
                        "powercycleCentral",
                        "matcher name cannot be empty".into(),
                    ));
                } else if !seen.insert(&matcher.name) {
                    errors.push(plugin_error(
                        "powercycleCentral",
                        format!("duplicate matcher '{}'", matcher.name),
                    ));
                }

                if matcher.schedule.trim().is_empty() {
                    errors.push(plugin_error(
                        "powercycleCentral",
                        format!("matcher '{}' has an empty schedule", matcher.name),
                    ));
                }

                if let Err(source) = FilterSpec::from_raw(&matcher.filter) {
                    errors.push(ValidationError::InvalidFilter {
                        matcher: matcher.name.clone(),
                        source,
                    });
                }
            }
        }
        RawPlugin::ValidateTags {
            tags, on_missing, ..
        } => {
            if tags.is_empty() {
                errors.push(plugin_error("validateTags", "tags cannot be empty".into()));
            }
            if tags.iter().any(|t| t.trim().is_empty()) {
                errors.push(plugin_error("validateTags", "tag names cannot be empty".into()));
            }
            for mode in on_missing {
                if crate::policy::MissingTagAction::parse(mode).is_none() {
                    errors.push(plugin_error(
                        "validateTags",
                        format!("unknown on_missing action '{mode}' (expected warn or stop)"),
                    ));
                }
            }
        }
    }

    errors
}

/// Parse an IANA timezone name
pub fn parse_timezone(name: &str) -> Option<Tz> {
    name.trim().parse::<Tz>().ok()
}
