//! Driver traits

use async_trait::async_trait;
use revolver_api::{Action, ActionKind, Resource};
use thiserror::Error;

use crate::DriverCapabilities;

/// Errors from driver operations
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("Collect failed: {0}")]
    CollectFailed(String),

    #[error("Execute failed: {0}")]
    ExecuteFailed(String),

    #[error("Unsupported action: {0}")]
    UnsupportedAction(ActionKind),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type DriverResult<T> = Result<T, DriverError>;

/// Driver trait - implemented once per resource kind
///
/// The core calls `collect` once per run, asks `recognise` which collected
/// resources belong to this driver, consults `mask` for the kinds listed in
/// the capabilities, and calls `execute` once per group of alike actions.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Name used in logs and as the origin of driver-generated actions
    fn name(&self) -> &str;

    /// What this driver can execute and mask
    fn capabilities(&self) -> &DriverCapabilities;

    /// Dry-run: log would-be executions instead of performing them
    fn pretend(&self) -> bool {
        false
    }

    /// Load the resources this driver manages
    async fn collect(&self) -> DriverResult<Vec<Resource>>;

    /// Whether the resource belongs to this driver's batch
    fn recognise(&self, resource: &Resource) -> bool;

    /// Veto hook. A returned reason suppresses execution on this resource.
    fn mask(&self, _kind: ActionKind, _resource: &Resource, _action: &Action) -> Option<String> {
        None
    }

    /// Perform one action for a whole group of resources
    async fn execute(
        &self,
        kind: ActionKind,
        resources: &[&Resource],
        action: &Action,
    ) -> DriverResult<()>;
}

/// Standard state masks: starting a running resource or stopping a stopped
/// one is pointless.
pub fn mask_by_state(kind: ActionKind, resource: &Resource) -> Option<String> {
    match kind {
        ActionKind::Start if resource.state.is_running() => Some("Already running".into()),
        ActionKind::Stop if resource.state == revolver_api::ResourceState::Stopped => {
            Some("Already stopped".into())
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use revolver_api::ResourceState;

    #[test]
    fn state_masks() {
        let running = Resource::new("i-1", "ec2", "1", ResourceState::Running);
        let stopped = Resource::new("i-2", "ec2", "1", ResourceState::Stopped);
        let pending = Resource::new("i-3", "ec2", "1", ResourceState::from("pending"));

        assert_eq!(
            mask_by_state(ActionKind::Start, &running).as_deref(),
            Some("Already running")
        );
        assert_eq!(mask_by_state(ActionKind::Stop, &running), None);
        assert_eq!(
            mask_by_state(ActionKind::Stop, &stopped).as_deref(),
            Some("Already stopped")
        );
        assert_eq!(mask_by_state(ActionKind::Start, &pending), None);
        assert_eq!(mask_by_state(ActionKind::SetTag, &running), None);
    }
}
