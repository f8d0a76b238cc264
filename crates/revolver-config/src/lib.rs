//! Configuration parsing and validation for revolver
//!
//! Supports TOML configuration with:
//! - Versioned schema
//! - Run-wide defaults (tag names, timezone, barrier tolerance, concurrency)
//! - Accounts and drivers
//! - Policy plugins, including centrally defined matchers with filters
//! - Validation that reports every problem at once

mod filter;
mod policy;
mod schema;
mod validation;

pub use filter::*;
pub use policy::*;
pub use schema::*;
pub use validation::*;

use std::path::Path;
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation failed: {errors:?}")]
    ValidationFailed { errors: Vec<ValidationError> },

    #[error("Unsupported config version: {0}")]
    UnsupportedVersion(u32),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Load and validate configuration from a TOML file
pub fn load_config(path: impl AsRef<Path>) -> ConfigResult<Policy> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parse and validate configuration from a TOML string
pub fn parse_config(content: &str) -> ConfigResult<Policy> {
    let raw: RawConfig = toml::from_str(content)?;

    if raw.config_version != CURRENT_CONFIG_VERSION {
        return Err(ConfigError::UnsupportedVersion(raw.config_version));
    }

    let errors = validate_config(&raw);
    if !errors.is_empty() {
        return Err(ConfigError::ValidationFailed { errors });
    }

    Ok(Policy::from_raw(raw))
}

/// Current supported config version
pub const CURRENT_CONFIG_VERSION: u32 = 1;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parse_minimal_config() {
        let config = r#"
            config_version = 1

            [[accounts]]
            id = "111111111111"

            [[plugins]]
            type = "powercycle"
        "#;

        let policy = parse_config(config).unwrap();
        assert_eq!(policy.accounts.len(), 1);
        assert_eq!(policy.accounts[0].id.as_str(), "111111111111");
        assert_eq!(policy.plugins[0].type_name(), "powercycle");
    }

    #[test]
    fn parse_central_policy() {
        let config = r#"
            config_version = 1

            [defaults]
            timezone = "America/New_York"
            barrier_tolerance_minutes = 30

            [[plugins]]
            type = "powercycleCentral"
            availability_tag_priority = 5

            [[plugins.matchers]]
            name = "office-hours"
            schedule = "Start=08:00|mon-fri;Stop=18:00|mon-fri"
            priority = 10
            filter = { tag = "Environment|iequals|dev" }
        "#;

        let policy = parse_config(config).unwrap();
        assert_eq!(policy.defaults.timezone, chrono_tz::America::New_York);
        assert_eq!(policy.defaults.barrier_tolerance, chrono::Duration::minutes(30));

        match &policy.plugins[0] {
            PluginSettings::PowercycleCentral {
                availability_tag_priority,
                matchers,
                ..
            } => {
                assert_eq!(*availability_tag_priority, 5.0);
                assert_eq!(matchers[0].priority, 10.0);
                assert_eq!(
                    matchers[0].filter,
                    FilterSpec::Tag {
                        key: "Environment".into(),
                        cmp: Some(Comparison {
                            mode: CompareMode::IEquals,
                            value: "dev".into()
                        })
                    }
                );
            }
            other => panic!("unexpected plugin {other:?}"),
        }
    }

    #[test]
    fn reject_wrong_version() {
        let config = r#"
            config_version = 99
        "#;

        let result = parse_config(config);
        assert!(matches!(result, Err(ConfigError::UnsupportedVersion(99))));
    }

    #[test]
    fn reject_invalid_config() {
        let config = r#"
            config_version = 1

            [defaults]
            timezone = "Atlantis/Capital"
        "#;

        match parse_config(config) {
            Err(ConfigError::ValidationFailed { errors }) => assert_eq!(errors.len(), 1),
            other => panic!("expected validation failure, got {other:?}"),
        }
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "config_version = 1").unwrap();
        writeln!(file, "[[drivers]]").unwrap();
        writeln!(file, "name = \"ec2\"").unwrap();

        let policy = load_config(file.path()).unwrap();
        assert_eq!(policy.drivers[0].resource_types, vec!["ec2".to_string()]);

        assert!(matches!(
            load_config("/nonexistent/revolver.toml"),
            Err(ConfigError::ReadError(_))
        ));
    }
}
