//! Driver capabilities model

use revolver_api::ActionKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Describes which actions a driver can execute and which it may veto
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverCapabilities {
    /// Action kinds the driver has an executor for
    pub executes: BTreeSet<ActionKind>,

    /// Action kinds the driver wants to inspect before execution
    pub masks: BTreeSet<ActionKind>,
}

impl DriverCapabilities {
    /// Create empty capabilities (executes nothing)
    pub fn none() -> Self {
        Self::default()
    }

    /// Start/stop plus tagging, with state masks on start and stop
    pub fn power_cycle() -> Self {
        Self::none()
            .with_action(ActionKind::Start)
            .with_action(ActionKind::Stop)
            .with_action(ActionKind::SetTag)
            .with_action(ActionKind::UnsetTag)
            .with_mask(ActionKind::Start)
            .with_mask(ActionKind::Stop)
    }

    /// Tagging only (e.g. snapshots and volumes)
    pub fn tagging() -> Self {
        Self::none()
            .with_action(ActionKind::SetTag)
            .with_action(ActionKind::UnsetTag)
    }

    pub fn with_action(mut self, kind: ActionKind) -> Self {
        self.executes.insert(kind);
        self
    }

    pub fn with_mask(mut self, kind: ActionKind) -> Self {
        self.masks.insert(kind);
        self
    }

    /// Check if this driver can execute the given action kind
    pub fn supports(&self, kind: ActionKind) -> bool {
        self.executes.contains(&kind)
    }

    /// Check if this driver masks the given action kind
    pub fn masks(&self, kind: ActionKind) -> bool {
        self.masks.contains(&kind)
    }
}
