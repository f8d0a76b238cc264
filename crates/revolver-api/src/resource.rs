//! Resource snapshot collected by drivers for one run

use chrono::{DateTime, Utc};
use revolver_util::{AccountId, ResourceId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, trace};

use crate::{Action, ActionKind};

/// Metadata key listing the kinds of the actions registered on a resource
pub const ACTION_NAMES_KEY: &str = "actionNames";

/// Metadata key naming the central policy matcher that selected the schedule
pub const HIGHEST_MATCH_KEY: &str = "highestMatch";

/// Running state, normalized across resource kinds
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ResourceState {
    Running,
    Stopped,
    Other(String),
}

impl ResourceState {
    pub fn as_str(&self) -> &str {
        match self {
            ResourceState::Running => "running",
            ResourceState::Stopped => "stopped",
            ResourceState::Other(s) => s,
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, ResourceState::Running)
    }
}

impl From<&str> for ResourceState {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "running" | "available" => ResourceState::Running,
            "stopped" => ResourceState::Stopped,
            other => ResourceState::Other(other.to_string()),
        }
    }
}

impl From<String> for ResourceState {
    fn from(s: String) -> Self {
        ResourceState::from(s.as_str())
    }
}

impl From<ResourceState> for String {
    fn from(state: ResourceState) -> Self {
        state.as_str().to_string()
    }
}

impl fmt::Display for ResourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What [`Resource::add_action`] did with a proposed action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// Appended as a new pending action
    Added,
    /// Merged into a pending action of the same kind
    Merged,
    /// Dropped: a pending action is already alike
    Duplicate,
    /// Dropped: another state change is already pending
    Conflict,
}

/// One cloud resource as seen during a single run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub id: ResourceId,
    pub resource_type: String,
    #[serde(default)]
    pub arn: String,
    /// Filled from the owning account when a driver leaves it empty
    #[serde(default)]
    pub account_id: AccountId,
    #[serde(default)]
    pub region: String,
    pub state: ResourceState,
    #[serde(default)]
    pub launch_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,

    /// Raw provider document, queried by path filters
    #[serde(default)]
    pub raw: serde_json::Value,

    #[serde(default, skip_deserializing)]
    actions: Vec<Action>,

    #[serde(default, skip_deserializing)]
    metadata: BTreeMap<String, serde_json::Value>,
}

impl Resource {
    pub fn new(
        id: impl Into<ResourceId>,
        resource_type: impl Into<String>,
        account_id: impl Into<AccountId>,
        state: ResourceState,
    ) -> Self {
        Self {
            id: id.into(),
            resource_type: resource_type.into(),
            arn: String::new(),
            account_id: account_id.into(),
            region: String::new(),
            state,
            launch_time: None,
            tags: BTreeMap::new(),
            raw: serde_json::Value::Null,
            actions: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    pub fn with_launch_time(mut self, launch_time: DateTime<Utc>) -> Self {
        self.launch_time = Some(launch_time);
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn with_raw(mut self, raw: serde_json::Value) -> Self {
        self.raw = raw;
        self
    }

    /// Tag lookup; exact key first, then case-insensitive
    pub fn tag(&self, name: &str) -> Option<&str> {
        self.tags
            .get(name)
            .or_else(|| {
                self.tags
                    .iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case(name))
                    .map(|(_, v)| v)
            })
            .map(String::as_str)
    }

    /// Value of the `Name` tag
    pub fn name(&self) -> Option<&str> {
        self.tag("Name")
    }

    /// All registered actions, including those already done
    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn pending_actions(&self) -> impl Iterator<Item = &Action> {
        self.actions.iter().filter(|a| !a.done)
    }

    /// Index of the first pending action alike to `action`
    pub fn find_pending_like(&self, action: &Action) -> Option<usize> {
        self.actions.iter().position(|a| !a.done && a.like(action))
    }

    pub fn mark_done(&mut self, index: usize) {
        if let Some(action) = self.actions.get_mut(index) {
            action.done = true;
        }
    }

    /// Register an action, keeping the pending list free of duplicates and of
    /// competing state changes.
    pub fn add_action(&mut self, action: Action) -> AddOutcome {
        if self.find_pending_like(&action).is_some() {
            trace!(
                resource_id = %self.id,
                who = %action.who,
                action = %action.describe(),
                "Duplicate action dropped"
            );
            return AddOutcome::Duplicate;
        }

        if action.changes_state() && self.pending_actions().any(Action::changes_state) {
            debug!(
                resource_id = %self.id,
                who = %action.who,
                action = %action.describe(),
                "Conflicting state change dropped"
            );
            return AddOutcome::Conflict;
        }

        let kind = action.kind();
        for existing in self.actions.iter_mut().filter(|a| !a.done && a.kind() == kind) {
            if existing.swallow(&action) {
                debug!(
                    resource_id = %self.id,
                    who = %action.who,
                    action = %existing.describe(),
                    "Action merged"
                );
                return AddOutcome::Merged;
            }
        }

        debug!(
            resource_id = %self.id,
            who = %action.who,
            action = %action.describe(),
            "Action registered"
        );
        self.actions.push(action);
        AddOutcome::Added
    }

    pub fn metadata(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.metadata
    }

    pub fn annotate(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.metadata.insert(key.into(), value.into());
    }

    /// Record the kinds of pending actions under [`ACTION_NAMES_KEY`]
    pub fn annotate_action_names(&mut self) {
        let names: Vec<serde_json::Value> = self
            .pending_actions()
            .map(|a| serde_json::Value::from(a.kind().as_str()))
            .collect();
        self.annotate(ACTION_NAMES_KEY, names);
    }

    pub fn has_pending(&self, kind: ActionKind) -> bool {
        self.pending_actions().any(|a| a.kind() == kind)
    }
}
