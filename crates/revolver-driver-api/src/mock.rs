//! Mock driver for testing

use async_trait::async_trait;
use revolver_api::{Action, ActionKind, Resource};
use revolver_util::ResourceId;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::{mask_by_state, Driver, DriverCapabilities, DriverError, DriverResult};

/// One recorded call to [`Driver::execute`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Execution {
    pub kind: ActionKind,
    pub resource_ids: Vec<ResourceId>,
    pub reason: String,
}

/// Mock driver for unit/integration testing
pub struct MockDriver {
    name: String,
    capabilities: DriverCapabilities,
    resource_types: Vec<String>,
    resources: Mutex<Vec<Resource>>,
    executions: Arc<Mutex<Vec<Execution>>>,
    vetoes: Mutex<HashMap<ResourceId, String>>,
    pretend: bool,

    /// Configure collect to fail
    pub fail_collect: Arc<Mutex<bool>>,

    /// Configure execute to fail for these kinds
    pub fail_execute: Arc<Mutex<BTreeSet<ActionKind>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockDriver {
    /// Create a mock driver recognising the given resource types
    pub fn new(name: impl Into<String>, resource_types: &[&str]) -> Self {
        Self {
            name: name.into(),
            capabilities: DriverCapabilities::power_cycle(),
            resource_types: resource_types.iter().map(|t| t.to_string()).collect(),
            resources: Mutex::new(Vec::new()),
            executions: Arc::new(Mutex::new(Vec::new())),
            vetoes: Mutex::new(HashMap::new()),
            pretend: false,
            fail_collect: Arc::new(Mutex::new(false)),
            fail_execute: Arc::new(Mutex::new(BTreeSet::new())),
        }
    }

    pub fn with_capabilities(mut self, caps: DriverCapabilities) -> Self {
        self.capabilities = caps;
        self
    }

    pub fn with_resources(self, resources: Vec<Resource>) -> Self {
        *lock(&self.resources) = resources;
        self
    }

    pub fn with_pretend(mut self, pretend: bool) -> Self {
        self.pretend = pretend;
        self
    }

    /// Veto every masked action on `id` with `reason`
    pub fn veto(&self, id: impl Into<ResourceId>, reason: impl Into<String>) {
        lock(&self.vetoes).insert(id.into(), reason.into());
    }

    /// Make execute fail for `kind`
    pub fn fail_on(&self, kind: ActionKind) {
        lock(&self.fail_execute).insert(kind);
    }

    /// Recorded executions, in call order
    pub fn executions(&self) -> Vec<Execution> {
        lock(&self.executions).clone()
    }
}

#[async_trait]
impl Driver for MockDriver {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> &DriverCapabilities {
        &self.capabilities
    }

    fn pretend(&self) -> bool {
        self.pretend
    }

    async fn collect(&self) -> DriverResult<Vec<Resource>> {
        if *lock(&self.fail_collect) {
            return Err(DriverError::CollectFailed("Mock collect failure".into()));
        }
        Ok(lock(&self.resources).clone())
    }

    fn recognise(&self, resource: &Resource) -> bool {
        self.resource_types.iter().any(|t| *t == resource.resource_type)
    }

    fn mask(&self, kind: ActionKind, resource: &Resource, _action: &Action) -> Option<String> {
        lock(&self.vetoes)
            .get(&resource.id)
            .cloned()
            .or_else(|| mask_by_state(kind, resource))
    }

    async fn execute(
        &self,
        kind: ActionKind,
        resources: &[&Resource],
        action: &Action,
    ) -> DriverResult<()> {
        if lock(&self.fail_execute).contains(&kind) {
            return Err(DriverError::ExecuteFailed(format!("Mock {kind} failure")));
        }

        lock(&self.executions).push(Execution {
            kind,
            resource_ids: resources.iter().map(|r| r.id.clone()).collect(),
            reason: action.reason.clone(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use revolver_api::ResourceState;

    fn instance(id: &str, state: ResourceState) -> Resource {
        Resource::new(id, "ec2", "111111111111", state)
    }

    #[tokio::test]
    async fn mock_collect_and_execute() {
        let driver = MockDriver::new("ec2", &["ec2"])
            .with_resources(vec![instance("i-1", ResourceState::Stopped)]);

        let resources = driver.collect().await.unwrap();
        assert_eq!(resources.len(), 1);
        assert!(driver.recognise(&resources[0]));

        let action = Action::start("test", "because");
        let group: Vec<&Resource> = resources.iter().collect();
        driver.execute(ActionKind::Start, &group, &action).await.unwrap();

        let executions = driver.executions();
        assert_eq!(executions.len(), 1);
        assert_eq!(executions[0].resource_ids, vec![ResourceId::new("i-1")]);
    }

    #[tokio::test]
    async fn mock_collect_failure() {
        let driver = MockDriver::new("ec2", &["ec2"]);
        *driver.fail_collect.lock().unwrap() = true;

        assert!(driver.collect().await.is_err());
    }

    #[tokio::test]
    async fn mock_execute_failure() {
        let driver = MockDriver::new("ec2", &["ec2"]);
        driver.fail_on(ActionKind::Stop);

        let r = instance("i-1", ResourceState::Running);
        let result = driver
            .execute(ActionKind::Stop, &[&r], &Action::stop("t", "r"))
            .await;
        assert!(result.is_err());
        assert!(driver.executions().is_empty());
    }

    #[test]
    fn mock_veto_overrides_state_mask() {
        let driver = MockDriver::new("ec2", &["ec2"]);
        let r = instance("i-1", ResourceState::Stopped);
        let start = Action::start("t", "r");

        assert_eq!(driver.mask(ActionKind::Start, &r, &start), None);
        driver.veto("i-1", "Managed by autoscaling group");
        assert_eq!(
            driver.mask(ActionKind::Start, &r, &start).as_deref(),
            Some("Managed by autoscaling group")
        );
        assert!(!driver.recognise(&Resource::new("db-1", "rds", "1", ResourceState::Running)));
    }
}
