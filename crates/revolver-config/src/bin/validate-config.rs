//! Config validation CLI tool
//!
//! Validates a revolver configuration file and reports any errors.

use revolver_config::{ConfigError, PluginSettings, CURRENT_CONFIG_VERSION};
use revolver_util::default_config_path;
use std::path::PathBuf;
use std::process::ExitCode;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    let config_path = match args.get(1) {
        Some(path) => PathBuf::from(path),
        None => {
            let default_path = default_config_path();
            eprintln!("Usage: validate-config [config-file]");
            eprintln!();
            eprintln!("Validates a revolver configuration file.");
            eprintln!();
            eprintln!("If no path is provided, uses: {}", default_path.display());
            return ExitCode::from(2);
        }
    };

    if !config_path.exists() {
        eprintln!("Error: Configuration file not found: {}", config_path.display());
        return ExitCode::from(1);
    }

    match revolver_config::load_config(&config_path) {
        Ok(policy) => {
            println!("✓ Configuration is valid");
            println!();
            println!("Summary:");
            println!("  Config version: {}", CURRENT_CONFIG_VERSION);
            println!("  Timezone: {}", policy.defaults.timezone);
            println!("  Accounts: {}", policy.accounts.len());
            println!("  Drivers: {}", policy.drivers.len());
            println!("  Plugins: {}", policy.plugins.len());

            if !policy.plugins.is_empty() {
                println!();
                println!("Plugins:");
                for plugin in &policy.plugins {
                    let detail = match plugin {
                        PluginSettings::Powercycle { .. } => {
                            format!("tag '{}'", policy.defaults.schedule_tag)
                        }
                        PluginSettings::PowercycleCentral { matchers, .. } => {
                            let names: Vec<&str> =
                                matchers.iter().map(|m| m.name.as_str()).collect();
                            format!("matchers [{}]", names.join(", "))
                        }
                        PluginSettings::ValidateTags { tags, .. } => {
                            format!("tags [{}]", tags.join(", "))
                        }
                    };
                    println!("  - {}: {}", plugin.type_name(), detail);
                }
            }

            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("✗ Configuration validation failed");
            eprintln!();
            match &e {
                ConfigError::ReadError(io_err) => {
                    eprintln!("Failed to read file: {}", io_err);
                }
                ConfigError::ParseError(parse_err) => {
                    eprintln!("TOML parse error:");
                    eprintln!("  {}", parse_err);
                }
                ConfigError::ValidationFailed { errors } => {
                    eprintln!("Validation errors ({}):", errors.len());
                    for err in errors {
                        eprintln!("  - {}", err);
                    }
                }
                ConfigError::UnsupportedVersion(ver) => {
                    eprintln!(
                        "Unsupported config version: {} (expected {})",
                        ver, CURRENT_CONFIG_VERSION
                    );
                }
            }
            ExitCode::from(1)
        }
    }
}
