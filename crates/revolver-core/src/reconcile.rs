//! Action reconciliation
//!
//! Resources handled by one driver often share the physical thing an action
//! touches (instances in one scaling group, members of one cluster). For
//! each pending action, reconciliation gathers every resource in the batch
//! holding an alike action, lets the driver veto individual members, marks
//! all of them done and calls the driver once for the whole group.

use revolver_api::{Action, ActionKind, Resource};
use revolver_driver_api::{Driver, DriverCapabilities};
use revolver_util::ResourceId;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info, warn};

/// How the core dispatches one action kind to a driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchEntry {
    /// Consult [`Driver::mask`] for each member before executing
    pub masked: bool,
}

/// Action kinds a driver executes, resolved when the driver is registered
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchTable {
    entries: BTreeMap<ActionKind, DispatchEntry>,
}

impl DispatchTable {
    pub fn from_capabilities(caps: &DriverCapabilities) -> Self {
        let entries = caps
            .executes
            .iter()
            .map(|kind| {
                (
                    *kind,
                    DispatchEntry {
                        masked: caps.masks(*kind),
                    },
                )
            })
            .collect();
        Self { entries }
    }

    pub fn lookup(&self, kind: ActionKind) -> Option<DispatchEntry> {
        self.entries.get(&kind).copied()
    }
}

/// A driver plus its dispatch table
#[derive(Clone)]
pub struct RegisteredDriver {
    driver: Arc<dyn Driver>,
    table: DispatchTable,
    force_pretend: bool,
}

impl RegisteredDriver {
    /// `force_pretend` puts the driver in dry-run regardless of its own setting
    pub fn new(driver: Arc<dyn Driver>, force_pretend: bool) -> Self {
        let table = DispatchTable::from_capabilities(driver.capabilities());
        Self {
            driver,
            table,
            force_pretend,
        }
    }

    pub fn name(&self) -> &str {
        self.driver.name()
    }

    pub fn driver(&self) -> &Arc<dyn Driver> {
        &self.driver
    }

    pub fn table(&self) -> &DispatchTable {
        &self.table
    }

    pub fn is_dry_run(&self, action: &Action) -> bool {
        self.force_pretend || self.driver.pretend() || action.pretend
    }
}

impl std::fmt::Debug for RegisteredDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredDriver")
            .field("name", &self.driver.name())
            .field("table", &self.table)
            .field("force_pretend", &self.force_pretend)
            .finish()
    }
}

/// One driver call (or would-be call) covering a group of resources
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutedGroup {
    pub kind: ActionKind,
    pub resource_ids: Vec<ResourceId>,
    pub dry_run: bool,
}

/// A member removed from a group by the driver's mask
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Veto {
    pub kind: ActionKind,
    pub resource_id: ResourceId,
    pub reason: String,
}

/// A group whose execution failed, or that no executor exists for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupFailure {
    pub kind: ActionKind,
    pub resource_ids: Vec<ResourceId>,
    pub message: String,
}

/// What one reconciliation pass did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub executed: Vec<ExecutedGroup>,
    pub vetoes: Vec<Veto>,
    pub failures: Vec<GroupFailure>,
    /// Groups dropped because the driver has no executor for their kind
    pub unsupported: Vec<GroupFailure>,
}

impl ReconcileReport {
    pub fn merge(&mut self, other: ReconcileReport) {
        self.executed.extend(other.executed);
        self.vetoes.extend(other.vetoes);
        self.failures.extend(other.failures);
        self.unsupported.extend(other.unsupported);
    }
}

/// Reconcile every pending action in `batch` through `driver`.
///
/// Every pending action the driver is handed ends up done, whether it was
/// executed, vetoed, failed or unsupported.
pub async fn reconcile(driver: &RegisteredDriver, batch: &mut [&mut Resource]) -> ReconcileReport {
    let mut report = ReconcileReport::default();

    for i in 0..batch.len() {
        let mut j = 0;
        while j < batch[i].actions().len() {
            let action = batch[i].actions()[j].clone();
            j += 1;
            if action.done {
                continue;
            }

            let kind = action.kind();
            let entry = driver.table().lookup(kind);

            let mut group = Vec::new();
            let mut dry_group = Vec::new();
            for x in 0..batch.len() {
                let Some(k) = batch[x].find_pending_like(&action) else {
                    continue;
                };

                if entry.is_some_and(|e| e.masked) {
                    let target: &Resource = &batch[x];
                    if let Some(reason) = driver.driver().mask(kind, target, &target.actions()[k]) {
                        info!(
                            driver = %driver.name(),
                            resource_id = %target.id,
                            what = %kind,
                            reason = %reason,
                            "Action masked"
                        );
                        report.vetoes.push(Veto {
                            kind,
                            resource_id: target.id.clone(),
                            reason,
                        });
                        batch[x].mark_done(k);
                        continue;
                    }
                }

                // Pretend is decided per member
                if driver.is_dry_run(&batch[x].actions()[k]) {
                    dry_group.push(x);
                } else {
                    group.push(x);
                }
                batch[x].mark_done(k);
            }

            if entry.is_none() {
                let resource_ids: Vec<ResourceId> = group
                    .iter()
                    .chain(dry_group.iter())
                    .map(|&x| batch[x].id.clone())
                    .collect();
                if resource_ids.is_empty() {
                    continue;
                }
                warn!(
                    driver = %driver.name(),
                    what = %kind,
                    resource_ids = %join_ids(&resource_ids),
                    "No executor for action"
                );
                report.unsupported.push(GroupFailure {
                    kind,
                    resource_ids,
                    message: format!("Driver {} cannot execute {}", driver.name(), kind),
                });
                continue;
            }

            if !dry_group.is_empty() {
                let resource_ids: Vec<ResourceId> =
                    dry_group.iter().map(|&x| batch[x].id.clone()).collect();
                info!(
                    driver = %driver.name(),
                    what = %kind,
                    resource_ids = %join_ids(&resource_ids),
                    action = %action.describe(),
                    "Dry run: would execute"
                );
                report.executed.push(ExecutedGroup {
                    kind,
                    resource_ids,
                    dry_run: true,
                });
            }

            if group.is_empty() {
                continue;
            }

            let members: Vec<&Resource> = group.iter().map(|&x| &*batch[x]).collect();
            let resource_ids: Vec<ResourceId> = members.iter().map(|r| r.id.clone()).collect();
            let ids_display = join_ids(&resource_ids);

            match driver.driver().execute(kind, &members, &action).await {
                Ok(()) => {
                    info!(
                        driver = %driver.name(),
                        what = %kind,
                        resource_ids = %ids_display,
                        "Group executed"
                    );
                    report.executed.push(ExecutedGroup {
                        kind,
                        resource_ids,
                        dry_run: false,
                    });
                }
                Err(e) => {
                    error!(
                        driver = %driver.name(),
                        what = %kind,
                        resource_ids = %ids_display,
                        error = %e,
                        "Group execution failed"
                    );
                    report.failures.push(GroupFailure {
                        kind,
                        resource_ids,
                        message: e.to_string(),
                    });
                }
            }
        }
    }

    report
}

fn join_ids(ids: &[ResourceId]) -> String {
    ids.iter().map(ResourceId::as_str).collect::<Vec<_>>().join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use revolver_api::ResourceState;
    use revolver_driver_api::MockDriver;

    fn instance(id: &str, state: ResourceState) -> Resource {
        Resource::new(id, "ec2", "111111111111", state)
    }

    fn with_action(mut resource: Resource, action: Action) -> Resource {
        resource.add_action(action);
        resource
    }

    async fn run(driver: &RegisteredDriver, resources: &mut [Resource]) -> ReconcileReport {
        let mut batch: Vec<&mut Resource> = resources.iter_mut().collect();
        reconcile(driver, &mut batch).await
    }

    #[test]
    fn dispatch_table_from_capabilities() {
        let table = DispatchTable::from_capabilities(&DriverCapabilities::power_cycle());
        assert_eq!(table.lookup(ActionKind::Start), Some(DispatchEntry { masked: true }));
        assert_eq!(table.lookup(ActionKind::SetTag), Some(DispatchEntry { masked: false }));
        assert_eq!(table.lookup(ActionKind::RestoreSecurityGroup), None);
    }

    #[tokio::test]
    async fn one_execution_for_the_unmasked_member() {
        let mock = Arc::new(MockDriver::new("ec2", &["ec2"]));
        mock.veto("i-1", "Managed by scaling group");
        mock.veto("i-2", "Managed by scaling group");
        let driver = RegisteredDriver::new(mock.clone(), false);

        let mut resources: Vec<Resource> = ["i-1", "i-2", "i-3"]
            .iter()
            .map(|id| with_action(instance(id, ResourceState::Stopped), Action::start("test", "schedule")))
            .collect();

        let report = run(&driver, &mut resources).await;

        let executions = mock.executions();
        assert_eq!(executions.len(), 1);
        assert_eq!(executions[0].kind, ActionKind::Start);
        assert_eq!(executions[0].resource_ids, vec![ResourceId::new("i-3")]);
        assert_eq!(report.vetoes.len(), 2);
        assert!(resources.iter().all(|r| !r.has_pending(ActionKind::Start)));
    }

    #[tokio::test]
    async fn alike_actions_execute_once_per_group() {
        let mock = Arc::new(MockDriver::new("ec2", &["ec2"]));
        let driver = RegisteredDriver::new(mock.clone(), false);

        let mut resources = vec![
            with_action(instance("i-1", ResourceState::Running), Action::stop("a", "first")),
            with_action(instance("i-2", ResourceState::Running), Action::stop("b", "second")),
            with_action(instance("i-3", ResourceState::Stopped), Action::start("c", "third")),
        ];

        let report = run(&driver, &mut resources).await;

        let executions = mock.executions();
        assert_eq!(executions.len(), 2);
        assert_eq!(executions[0].kind, ActionKind::Stop);
        assert_eq!(
            executions[0].resource_ids,
            vec![ResourceId::new("i-1"), ResourceId::new("i-2")]
        );
        // The group runs with the first member's action
        assert_eq!(executions[0].reason, "first");
        assert_eq!(executions[1].resource_ids, vec![ResourceId::new("i-3")]);
        assert_eq!(report.executed.len(), 2);
    }

    #[tokio::test]
    async fn state_masks_absorb_whole_group() {
        let mock = Arc::new(MockDriver::new("ec2", &["ec2"]));
        let driver = RegisteredDriver::new(mock.clone(), false);

        let mut resources = vec![
            with_action(instance("i-1", ResourceState::Running), Action::start("t", "r")),
            with_action(instance("i-2", ResourceState::Running), Action::start("t", "r")),
        ];

        let report = run(&driver, &mut resources).await;
        assert!(mock.executions().is_empty());
        assert!(report.executed.is_empty());
        assert_eq!(report.vetoes[0].reason, "Already running");
    }

    #[tokio::test]
    async fn tag_actions_are_not_masked_and_group_by_keys() {
        let mock = Arc::new(MockDriver::new("ec2", &["ec2"]));
        let driver = RegisteredDriver::new(mock.clone(), false);

        let mut resources = vec![
            with_action(instance("i-1", ResourceState::Running), Action::set_tag("t", "Owner", "a", "r")),
            with_action(instance("i-2", ResourceState::Running), Action::set_tag("t", "Owner", "b", "r")),
            with_action(instance("i-3", ResourceState::Running), Action::set_tag("t", "Team", "c", "r")),
        ];

        run(&driver, &mut resources).await;

        let executions = mock.executions();
        assert_eq!(executions.len(), 2);
        assert_eq!(executions[0].resource_ids.len(), 2);
        assert_eq!(executions[1].resource_ids, vec![ResourceId::new("i-3")]);
    }

    #[tokio::test]
    async fn dry_run_does_not_execute() {
        let mock = Arc::new(MockDriver::new("ec2", &["ec2"]));
        let forced = RegisteredDriver::new(mock.clone(), true);

        let mut resources = vec![with_action(
            instance("i-1", ResourceState::Running),
            Action::stop("t", "r"),
        )];
        let report = run(&forced, &mut resources).await;

        assert!(mock.executions().is_empty());
        assert_eq!(report.executed.len(), 1);
        assert!(report.executed[0].dry_run);

        // Per-action pretend
        let driver = RegisteredDriver::new(mock.clone(), false);
        let mut resources = vec![with_action(
            instance("i-2", ResourceState::Running),
            Action::stop("t", "r").with_pretend(true),
        )];
        let report = run(&driver, &mut resources).await;
        assert!(mock.executions().is_empty());
        assert!(report.executed[0].dry_run);
    }

    #[tokio::test]
    async fn pretend_is_decided_per_member() {
        let mock = Arc::new(MockDriver::new("ec2", &["ec2"]));
        let driver = RegisteredDriver::new(mock.clone(), false);

        // Real action first, pretend second
        let mut resources = vec![
            with_action(instance("i-real", ResourceState::Running), Action::stop("a", "r")),
            with_action(
                instance("i-pretend", ResourceState::Running),
                Action::stop("b", "r").with_pretend(true),
            ),
        ];
        let report = run(&driver, &mut resources).await;

        let executions = mock.executions();
        assert_eq!(executions.len(), 1);
        assert_eq!(executions[0].resource_ids, vec![ResourceId::new("i-real")]);
        assert_eq!(report.executed.len(), 2);
        let dry: Vec<_> = report.executed.iter().filter(|g| g.dry_run).collect();
        assert_eq!(dry.len(), 1);
        assert_eq!(dry[0].resource_ids, vec![ResourceId::new("i-pretend")]);
        assert!(resources.iter().all(|r| !r.has_pending(ActionKind::Stop)));

        // Pretend first, real second
        let mock = Arc::new(MockDriver::new("ec2", &["ec2"]));
        let driver = RegisteredDriver::new(mock.clone(), false);
        let mut resources = vec![
            with_action(
                instance("i-pretend", ResourceState::Running),
                Action::stop("b", "r").with_pretend(true),
            ),
            with_action(instance("i-real", ResourceState::Running), Action::stop("a", "r")),
        ];
        run(&driver, &mut resources).await;

        let executions = mock.executions();
        assert_eq!(executions.len(), 1);
        assert_eq!(executions[0].resource_ids, vec![ResourceId::new("i-real")]);
    }

    #[tokio::test]
    async fn failures_are_isolated_per_group() {
        let mock = Arc::new(MockDriver::new("ec2", &["ec2"]));
        mock.fail_on(ActionKind::Stop);
        let driver = RegisteredDriver::new(mock.clone(), false);

        let mut resources = vec![
            with_action(instance("i-1", ResourceState::Running), Action::stop("t", "r")),
            with_action(instance("i-2", ResourceState::Stopped), Action::start("t", "r")),
        ];

        let report = run(&driver, &mut resources).await;
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].resource_ids, vec![ResourceId::new("i-1")]);
        assert_eq!(mock.executions().len(), 1);
        assert_eq!(mock.executions()[0].kind, ActionKind::Start);
    }

    #[tokio::test]
    async fn unsupported_kinds_are_reported_and_done() {
        let mock = Arc::new(
            MockDriver::new("snapshots", &["ec2"])
                .with_capabilities(DriverCapabilities::tagging()),
        );
        let driver = RegisteredDriver::new(mock.clone(), false);

        let mut resources = vec![with_action(
            instance("i-1", ResourceState::Running),
            Action::restore_security_group("t", "r"),
        )];
        let report = run(&driver, &mut resources).await;

        assert_eq!(report.unsupported.len(), 1);
        assert!(report.failures.is_empty());
        assert!(mock.executions().is_empty());
        assert!(resources[0].actions()[0].done);
    }
}
