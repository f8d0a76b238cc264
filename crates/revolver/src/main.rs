//! revolver - one power-cycling pass
//!
//! Loads the policy and a resource inventory, runs every account once at a
//! single point in time, and exits non-zero when any account, collect or
//! execution failed.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, ValueEnum};
use revolver::{load_inventory, InventoryFactory};
use revolver_api::Resource;
use revolver_config::load_config;
use revolver_core::{RunSummary, Runner};
use revolver_util::default_config_path;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

/// revolver - power-cycle cloud resources on a schedule
#[derive(Parser, Debug)]
#[command(name = "revolver")]
#[command(about = "Start, stop and tag cloud resources according to their schedules", long_about = None)]
struct Args {
    /// Configuration file path (default: ~/.config/revolver/config.toml)
    #[arg(short, long, default_value_os_t = default_config_path())]
    config: PathBuf,

    /// Resource inventory (JSON object keyed by account ID)
    #[arg(short, long, env = "REVOLVER_INVENTORY")]
    inventory: PathBuf,

    /// Evaluate schedules at this instant (RFC 3339) instead of now
    #[arg(long)]
    now: Option<DateTime<Utc>>,

    /// Dry run: log actions instead of executing them
    #[arg(long)]
    pretend: bool,

    /// Write the resources, with their actions, as JSON to this path
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

fn init_logging(args: &Args) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    match args.log_format {
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init(),
    }
}

fn log_summary(summary: &RunSummary) {
    for outcome in &summary.accounts {
        match &outcome.result {
            Ok(report) => info!(
                account = %outcome.account_id,
                resources = report.resources.len(),
                actions = report.actions,
                executed = report.reconcile.executed.len(),
                vetoes = report.reconcile.vetoes.len(),
                failures = report.reconcile.failures.len(),
                collect_failures = report.collect_failures.len(),
                "Account finished"
            ),
            Err(e) => error!(account = %outcome.account_id, error = %e, "Account failed"),
        }
    }

    info!(
        run_id = %summary.run_id,
        accounts = summary.accounts.len(),
        failed_accounts = summary.failed_accounts(),
        resources = summary.resource_count(),
        executed = summary.executed_count(),
        vetoes = summary.veto_count(),
        failures = summary.failure_count(),
        "Run complete"
    );
}

fn write_output(path: &Path, summary: &RunSummary) -> Result<()> {
    let resources: Vec<&Resource> = summary.reports().flat_map(|r| r.resources.iter()).collect();
    let json = serde_json::to_string_pretty(&resources)?;
    std::fs::write(path, json).with_context(|| format!("Failed to write output to {:?}", path))?;
    info!(path = %path.display(), count = resources.len(), "Resources written");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();
    init_logging(&args);

    info!(version = env!("CARGO_PKG_VERSION"), "revolver starting");

    let mut policy = load_config(&args.config)
        .with_context(|| format!("Failed to load config from {:?}", args.config))?;
    if args.pretend {
        policy.defaults.pretend = true;
    }

    info!(
        config_path = %args.config.display(),
        accounts = policy.accounts.len(),
        drivers = policy.drivers.len(),
        plugins = policy.plugins.len(),
        pretend = policy.defaults.pretend,
        "Configuration loaded"
    );

    let inventory = load_inventory(&args.inventory)?;
    for account in &policy.accounts {
        if !inventory.contains_key(account.id.as_str()) {
            warn!(account = %account.id, "Account has no inventory");
        }
    }

    let now = args.now.unwrap_or_else(revolver_util::now);
    info!(now = %now, "Evaluating schedules");
    let runner = Runner::with_reference(policy, Arc::new(InventoryFactory::new(inventory)), now)?;

    let summary = runner.run(now).await;
    log_summary(&summary);

    if let Some(path) = &args.output {
        write_output(path, &summary)?;
    }

    Ok(if summary.has_errors() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}
