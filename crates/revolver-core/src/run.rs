//! Run orchestration
//!
//! One run evaluates every account once against a single `now`:
//! collect resources from each driver, apply the plugins, then reconcile
//! driver by driver. Accounts run concurrently (bounded by
//! `defaults.concurrency`) and a failing account does not stop the others.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use futures::stream::{self, StreamExt};
use revolver_api::Resource;
use revolver_config::{Account, DriverSettings, Policy};
use revolver_driver_api::{Driver, DriverResult};
use revolver_util::{AccountId, ResourceId, Result, RevolverError, RunId};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::{build_plugins, reconcile, Plugin, ReconcileReport, RegisteredDriver};

/// Produces the drivers for one account.
///
/// Credentials and API clients are the factory's business.
pub trait DriverFactory: Send + Sync {
    fn create(&self, account: &Account, settings: &DriverSettings) -> DriverResult<Arc<dyn Driver>>;
}

/// Everything that happened in one account
#[derive(Debug, Clone, Default)]
pub struct AccountReport {
    /// Resources as they stand after reconciliation, for audit logging
    pub resources: Vec<Resource>,
    /// Pending actions after the plugins ran
    pub actions: usize,
    pub reconcile: ReconcileReport,
    /// Drivers whose collect failed, with the error
    pub collect_failures: Vec<(String, String)>,
}

impl AccountReport {
    pub fn has_errors(&self) -> bool {
        !self.collect_failures.is_empty() || !self.reconcile.failures.is_empty()
    }
}

/// Result of one account
#[derive(Debug)]
pub struct AccountOutcome {
    pub account_id: AccountId,
    pub result: Result<AccountReport>,
}

/// Result of a whole run
#[derive(Debug)]
pub struct RunSummary {
    pub run_id: RunId,
    pub accounts: Vec<AccountOutcome>,
}

impl RunSummary {
    pub fn reports(&self) -> impl Iterator<Item = &AccountReport> {
        self.accounts.iter().filter_map(|a| a.result.as_ref().ok())
    }

    pub fn report_for(&self, account_id: &AccountId) -> Option<&AccountReport> {
        self.accounts
            .iter()
            .find(|a| &a.account_id == account_id)
            .and_then(|a| a.result.as_ref().ok())
    }

    pub fn failed_accounts(&self) -> usize {
        self.accounts.iter().filter(|a| a.result.is_err()).count()
    }

    pub fn resource_count(&self) -> usize {
        self.reports().map(|r| r.resources.len()).sum()
    }

    pub fn executed_count(&self) -> usize {
        self.reports().map(|r| r.reconcile.executed.len()).sum()
    }

    pub fn veto_count(&self) -> usize {
        self.reports().map(|r| r.reconcile.vetoes.len()).sum()
    }

    pub fn failure_count(&self) -> usize {
        self.reports()
            .map(|r| r.reconcile.failures.len() + r.collect_failures.len())
            .sum()
    }

    /// Any failed account, collect or execution
    pub fn has_errors(&self) -> bool {
        self.failed_accounts() > 0 || self.reports().any(AccountReport::has_errors)
    }
}

/// Runs the configured plugins and drivers over every account
pub struct Runner {
    policy: Policy,
    plugins: Vec<Box<dyn Plugin>>,
    factory: Arc<dyn DriverFactory>,
    reference: DateTime<Utc>,
}

impl Runner {
    /// Build the plugins, checking matcher schedules against the current time.
    pub fn new(policy: Policy, factory: Arc<dyn DriverFactory>) -> Result<Self> {
        Self::with_reference(policy, factory, revolver_util::now())
    }

    /// Build the plugins, checking matcher schedules at `reference`.
    /// Filter compilation errors are configuration errors.
    pub fn with_reference(
        policy: Policy,
        factory: Arc<dyn DriverFactory>,
        reference: DateTime<Utc>,
    ) -> Result<Self> {
        let plugins = build_plugins(&policy, reference)
            .map_err(|e| RevolverError::config(e.to_string()))?;

        info!(
            account_count = policy.accounts.len(),
            driver_count = policy.drivers.len(),
            plugin_count = plugins.len(),
            reference = %reference,
            "Runner initialized"
        );

        Ok(Self {
            policy,
            plugins,
            factory,
            reference,
        })
    }

    /// Instant the matcher schedules were checked at
    pub fn reference(&self) -> DateTime<Utc> {
        self.reference
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    /// Run every configured account
    pub async fn run(&self, now: DateTime<Utc>) -> RunSummary {
        self.run_accounts(&self.policy.accounts, now).await
    }

    pub async fn run_accounts(&self, accounts: &[Account], now: DateTime<Utc>) -> RunSummary {
        let run_id = RunId::new();
        let span = info_span!("run", run_id = %run_id);

        async {
            let limit = match self.policy.defaults.concurrency {
                0 => accounts.len().max(1),
                n => n,
            };
            info!(account_count = accounts.len(), concurrency = limit, now = %now, "Run started");

            let outcomes: Vec<AccountOutcome> = stream::iter(accounts)
                .map(|account| self.run_account(account, now))
                .buffer_unordered(limit)
                .collect()
                .await;

            let summary = RunSummary {
                run_id,
                accounts: outcomes,
            };
            info!(
                resources = summary.resource_count(),
                executed = summary.executed_count(),
                vetoed = summary.veto_count(),
                failures = summary.failure_count(),
                failed_accounts = summary.failed_accounts(),
                "Run finished"
            );
            summary
        }
        .instrument(span)
        .await
    }

    async fn run_account(&self, account: &Account, now: DateTime<Utc>) -> AccountOutcome {
        let span = info_span!("account", account_id = %account.id, name = %account.label());
        let result = self.process_account(account, now).instrument(span).await;

        if let Err(e) = &result {
            error!(account_id = %account.id, error = %e, "Account failed");
        }
        AccountOutcome {
            account_id: account.id.clone(),
            result,
        }
    }

    async fn process_account(&self, account: &Account, now: DateTime<Utc>) -> Result<AccountReport> {
        let drivers = self
            .policy
            .drivers
            .iter()
            .map(|settings| -> Result<RegisteredDriver> {
                let driver = self.factory.create(account, settings).map_err(|e| {
                    RevolverError::driver(format!("Cannot create driver {}: {}", settings.name, e))
                })?;
                Ok(RegisteredDriver::new(
                    driver,
                    self.policy.defaults.pretend || settings.pretend,
                ))
            })
            .collect::<Result<Vec<_>>>()?;

        let collected = join_all(drivers.iter().map(|d| d.driver().collect())).await;

        let mut report = AccountReport::default();
        let mut seen: HashSet<(String, ResourceId)> = HashSet::new();
        for (driver, result) in drivers.iter().zip(collected) {
            match result {
                Ok(batch) => {
                    info!(driver = %driver.name(), count = batch.len(), "Resources collected");
                    for mut resource in batch {
                        if resource.account_id.as_str().is_empty() {
                            resource.account_id = account.id.clone();
                        }
                        if seen.insert((resource.resource_type.clone(), resource.id.clone())) {
                            report.resources.push(resource);
                        } else {
                            debug!(resource_id = %resource.id, "Resource collected twice; keeping the first");
                        }
                    }
                }
                Err(e) => {
                    error!(driver = %driver.name(), error = %e, "Collect failed");
                    report
                        .collect_failures
                        .push((driver.name().to_string(), e.to_string()));
                }
            }
        }

        for resource in report.resources.iter_mut() {
            for plugin in &self.plugins {
                if plugin.is_applicable(resource) {
                    plugin.generate_actions(resource, now);
                }
            }
            resource.annotate_action_names();
        }
        report.actions = report
            .resources
            .iter()
            .map(|r| r.pending_actions().count())
            .sum();

        for driver in &drivers {
            let mut batch: Vec<&mut Resource> = report
                .resources
                .iter_mut()
                .filter(|r| driver.driver().recognise(r))
                .collect();
            if batch.is_empty() {
                continue;
            }
            let outcome = reconcile(driver, &mut batch).await;
            report.reconcile.merge(outcome);
        }

        let orphaned: Vec<&str> = report
            .resources
            .iter()
            .filter(|r| r.pending_actions().next().is_some())
            .map(|r| r.id.as_str())
            .collect();
        if !orphaned.is_empty() {
            warn!(
                resource_ids = %orphaned.join(","),
                "Pending actions left with no recognising driver"
            );
        }

        info!(
            resources = report.resources.len(),
            actions = report.actions,
            executed = report.reconcile.executed.len(),
            vetoed = report.reconcile.vetoes.len(),
            "Account processed"
        );
        Ok(report)
    }
}
