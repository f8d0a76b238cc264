//! Inventory-backed driver
//!
//! Resources come from a JSON file shaped `{ "<account id>": [resources] }`.
//! Executing an action updates the in-memory snapshot (state and tags) so
//! the outcome of a run can be written back out.

use anyhow::{Context, Result};
use async_trait::async_trait;
use revolver_api::{Action, ActionKind, ActionPayload, Resource, ResourceState};
use revolver_config::{Account, DriverSettings};
use revolver_core::DriverFactory;
use revolver_driver_api::{
    mask_by_state, Driver, DriverCapabilities, DriverError, DriverResult,
};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::info;

/// Resources per account ID
pub type Inventory = BTreeMap<String, Vec<Resource>>;

/// Read an inventory file
pub fn load_inventory(path: impl AsRef<Path>) -> Result<Inventory> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read inventory {:?}", path))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse inventory {:?}", path))
}

/// Driver over a fixed list of resources
pub struct InventoryDriver {
    name: String,
    resource_types: Vec<String>,
    capabilities: DriverCapabilities,
    resources: Mutex<Vec<Resource>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl InventoryDriver {
    pub fn new(name: impl Into<String>, resource_types: Vec<String>, resources: Vec<Resource>) -> Self {
        Self {
            name: name.into(),
            resource_types,
            capabilities: DriverCapabilities::power_cycle(),
            resources: Mutex::new(resources),
        }
    }

    /// Current state of the inventory, including executed changes
    pub fn snapshot(&self) -> Vec<Resource> {
        lock(&self.resources).clone()
    }

    fn handles(&self, resource_type: &str) -> bool {
        self.resource_types.iter().any(|t| t == resource_type)
    }
}

#[async_trait]
impl Driver for InventoryDriver {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> &DriverCapabilities {
        &self.capabilities
    }

    async fn collect(&self) -> DriverResult<Vec<Resource>> {
        Ok(lock(&self.resources)
            .iter()
            .filter(|r| self.handles(&r.resource_type))
            .cloned()
            .collect())
    }

    fn recognise(&self, resource: &Resource) -> bool {
        self.handles(&resource.resource_type)
    }

    fn mask(&self, kind: ActionKind, resource: &Resource, _action: &Action) -> Option<String> {
        mask_by_state(kind, resource)
    }

    async fn execute(
        &self,
        kind: ActionKind,
        resources: &[&Resource],
        action: &Action,
    ) -> DriverResult<()> {
        if !self.capabilities.supports(kind) {
            return Err(DriverError::UnsupportedAction(kind));
        }

        let ids: HashSet<&str> = resources.iter().map(|r| r.id.as_str()).collect();
        let mut inventory = lock(&self.resources);
        for resource in inventory.iter_mut().filter(|r| ids.contains(r.id.as_str())) {
            match &action.payload {
                ActionPayload::Start => resource.state = ResourceState::Running,
                ActionPayload::Stop => resource.state = ResourceState::Stopped,
                ActionPayload::SetTag { tags } => {
                    for tag in tags.iter() {
                        resource.tags.insert(tag.key.clone(), tag.value.clone());
                    }
                }
                ActionPayload::UnsetTag { tags } => {
                    for key in tags.keys() {
                        resource.tags.remove(key);
                    }
                }
                ActionPayload::Noop | ActionPayload::RestoreSecurityGroup => {}
            }
        }

        info!(
            driver = %self.name,
            what = %kind,
            count = resources.len(),
            action = %action.describe(),
            "Inventory updated"
        );
        Ok(())
    }
}

/// Builds one [`InventoryDriver`] per configured driver and account
pub struct InventoryFactory {
    inventory: Inventory,
    created: Mutex<Vec<Arc<InventoryDriver>>>,
}

impl InventoryFactory {
    pub fn new(inventory: Inventory) -> Self {
        Self {
            inventory,
            created: Mutex::new(Vec::new()),
        }
    }

    /// Every resource held by the drivers created so far, after execution
    pub fn snapshot(&self) -> Vec<Resource> {
        lock(&self.created)
            .iter()
            .flat_map(|driver| driver.snapshot())
            .collect()
    }
}

impl DriverFactory for InventoryFactory {
    fn create(&self, account: &Account, settings: &DriverSettings) -> DriverResult<Arc<dyn Driver>> {
        let resources = self
            .inventory
            .get(account.id.as_str())
            .ok_or_else(|| DriverError::Internal(format!("No inventory for account {}", account.id)))?
            .iter()
            .filter(|r| settings.resource_types.contains(&r.resource_type))
            .cloned()
            .map(|mut r| {
                if r.account_id.as_str().is_empty() {
                    r.account_id = account.id.clone();
                }
                r
            })
            .collect();

        let driver = Arc::new(InventoryDriver::new(
            settings.name.clone(),
            settings.resource_types.clone(),
            resources,
        ));
        lock(&self.created).push(driver.clone());
        Ok(driver)
    }
}
