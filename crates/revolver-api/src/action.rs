//! Action object model
//!
//! An [`Action`] is an intended change to one resource, produced by a policy
//! plugin and consumed by driver reconciliation. Two predicates drive
//! deduplication: [`Action::like`] (would executing both be redundant?) and
//! [`Action::swallow`] (can the new action's payload be merged into this one?).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Discriminator of an action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActionKind {
    Noop,
    SetTag,
    UnsetTag,
    Start,
    Stop,
    RestoreSecurityGroup,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Noop => "noop",
            ActionKind::SetTag => "setTag",
            ActionKind::UnsetTag => "unsetTag",
            ActionKind::Start => "start",
            ActionKind::Stop => "stop",
            ActionKind::RestoreSecurityGroup => "restoreSecurityGroup",
        }
    }

    /// Only start and stop change the running state of a resource
    pub fn changes_state(&self) -> bool {
        matches!(self, ActionKind::Start | ActionKind::Stop)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single key/value tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

/// Ordered set of tags with unique keys
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagSet(Vec<Tag>);

impl TagSet {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Builder form of [`TagSet::insert`]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Insert a tag unless the key is already present (first writer wins).
    /// Returns whether the tag was inserted.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> bool {
        let key = key.into();
        if self.contains_key(&key) {
            return false;
        }
        self.0.push(Tag {
            key,
            value: value.into(),
        });
        true
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|t| t.key == key)
            .map(|t| t.value.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.iter().any(|t| t.key == key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|t| t.key.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tag> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Same key set, in any order
    pub fn same_keys(&self, other: &TagSet) -> bool {
        self.len() == other.len() && other.keys().all(|k| self.contains_key(k))
    }
}

impl fmt::Display for TagSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|t| format!("{}={}", t.key, t.value))
            .collect();
        f.write_str(&parts.join(", "))
    }
}

/// Kind-specific data carried by an action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "what", rename_all = "camelCase")]
pub enum ActionPayload {
    Noop,
    SetTag { tags: TagSet },
    UnsetTag { tags: TagSet },
    Start,
    Stop,
    RestoreSecurityGroup,
}

impl ActionPayload {
    pub fn kind(&self) -> ActionKind {
        match self {
            ActionPayload::Noop => ActionKind::Noop,
            ActionPayload::SetTag { .. } => ActionKind::SetTag,
            ActionPayload::UnsetTag { .. } => ActionKind::UnsetTag,
            ActionPayload::Start => ActionKind::Start,
            ActionPayload::Stop => ActionKind::Stop,
            ActionPayload::RestoreSecurityGroup => ActionKind::RestoreSecurityGroup,
        }
    }
}

/// An intended change to one resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    /// Name of the plugin or driver that produced the action
    pub who: String,

    /// Free-text explanation, surfaced in logs
    pub reason: String,

    /// Set once reconciliation has consumed the action
    #[serde(default)]
    pub done: bool,

    /// Dry-run: log instead of executing
    #[serde(default)]
    pub pretend: bool,

    #[serde(flatten)]
    pub payload: ActionPayload,
}

impl Action {
    pub fn new(who: impl Into<String>, payload: ActionPayload, reason: impl Into<String>) -> Self {
        Self {
            who: who.into(),
            reason: reason.into(),
            done: false,
            pretend: false,
            payload,
        }
    }

    pub fn noop(who: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(who, ActionPayload::Noop, reason)
    }

    pub fn start(who: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(who, ActionPayload::Start, reason)
    }

    pub fn stop(who: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(who, ActionPayload::Stop, reason)
    }

    pub fn restore_security_group(who: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(who, ActionPayload::RestoreSecurityGroup, reason)
    }

    pub fn set_tag(
        who: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::set_tags(who, TagSet::new().with(key, value), reason)
    }

    pub fn set_tags(who: impl Into<String>, tags: TagSet, reason: impl Into<String>) -> Self {
        Self::new(who, ActionPayload::SetTag { tags }, reason)
    }

    pub fn unset_tag(who: impl Into<String>, key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::unset_tags(who, TagSet::new().with(key, ""), reason)
    }

    pub fn unset_tags(who: impl Into<String>, tags: TagSet, reason: impl Into<String>) -> Self {
        Self::new(who, ActionPayload::UnsetTag { tags }, reason)
    }

    pub fn with_pretend(mut self, pretend: bool) -> Self {
        self.pretend = pretend;
        self
    }

    pub fn kind(&self) -> ActionKind {
        self.payload.kind()
    }

    pub fn changes_state(&self) -> bool {
        self.kind().changes_state()
    }

    /// Tags carried by setTag/unsetTag actions
    pub fn tags(&self) -> Option<&TagSet> {
        match &self.payload {
            ActionPayload::SetTag { tags } | ActionPayload::UnsetTag { tags } => Some(tags),
            _ => None,
        }
    }

    /// Whether executing both actions would be redundant.
    ///
    /// Same kind is enough for everything except tag actions, which also need
    /// the same key set. Reasons are ignored: two stops are alike.
    pub fn like(&self, other: &Action) -> bool {
        match (&self.payload, &other.payload) {
            (ActionPayload::SetTag { tags: a }, ActionPayload::SetTag { tags: b })
            | (ActionPayload::UnsetTag { tags: a }, ActionPayload::UnsetTag { tags: b }) => {
                a.same_keys(b)
            }
            (a, b) => a.kind() == b.kind(),
        }
    }

    /// Merge `other` into `self` when the kinds allow it.
    ///
    /// Tag actions take the keys they don't already carry; existing values
    /// are kept. Other kinds never swallow.
    pub fn swallow(&mut self, other: &Action) -> bool {
        match (&mut self.payload, &other.payload) {
            (ActionPayload::SetTag { tags: mine }, ActionPayload::SetTag { tags: theirs })
            | (ActionPayload::UnsetTag { tags: mine }, ActionPayload::UnsetTag { tags: theirs }) => {
                for tag in theirs.iter() {
                    mine.insert(tag.key.clone(), tag.value.clone());
                }
                true
            }
            _ => false,
        }
    }

    /// One-line human description for logs
    pub fn describe(&self) -> String {
        match &self.payload {
            ActionPayload::SetTag { tags } => format!("setTag {} ({})", tags, self.reason),
            ActionPayload::UnsetTag { tags } => {
                let keys: Vec<&str> = tags.keys().collect();
                format!("unsetTag {} ({})", keys.join(", "), self.reason)
            }
            other => format!("{} ({})", other.kind(), self.reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_that_change_state() {
        assert!(ActionKind::Start.changes_state());
        assert!(ActionKind::Stop.changes_state());
        assert!(!ActionKind::SetTag.changes_state());
        assert!(!ActionKind::Noop.changes_state());
    }

    #[test]
    fn stops_with_different_reasons_are_alike() {
        let a = Action::stop("powercycle", "Outside availability window");
        let b = Action::stop("validateTags", "Tag Owner is missing");
        assert!(a.like(&b));
        assert!(!a.like(&Action::start("powercycle", "Inside window")));
    }

    #[test]
    fn tag_actions_alike_only_with_same_keys() {
        let a = Action::set_tags("p", TagSet::new().with("a", "1").with("b", "2"), "r");
        let b = Action::set_tags("p", TagSet::new().with("b", "x").with("a", "y"), "r");
        let c = Action::set_tag("p", "a", "1", "r");
        assert!(a.like(&b));
        assert!(!a.like(&c));
        assert!(!a.like(&Action::unset_tags("p", TagSet::new().with("a", "").with("b", ""), "r")));
    }

    #[test]
    fn swallow_merges_missing_keys_first_writer_wins() {
        let mut a = Action::set_tag("p", "k1", "v1", "r");
        let b = Action::set_tags("p", TagSet::new().with("k1", "other").with("k2", "v2"), "r");

        assert!(a.swallow(&b));
        let tags = a.tags().unwrap();
        assert_eq!(tags.len(), 2);
        assert_eq!(tags.get("k1"), Some("v1"));
        assert_eq!(tags.get("k2"), Some("v2"));
    }

    #[test]
    fn non_tag_actions_never_swallow() {
        let mut a = Action::start("p", "r");
        assert!(!a.swallow(&Action::start("p", "r")));
        let mut t = Action::set_tag("p", "k", "v", "r");
        assert!(!t.swallow(&Action::unset_tag("p", "k", "r")));
    }

    #[test]
    fn tag_set_keys_are_unique() {
        let mut tags = TagSet::new();
        assert!(tags.insert("Owner", "alice"));
        assert!(!tags.insert("Owner", "bob"));
        assert_eq!(tags.get("Owner"), Some("alice"));
        assert_eq!(tags.to_string(), "Owner=alice");
    }

    #[test]
    fn action_serializes_with_discriminator() {
        let action = Action::set_tag("powercycle", "Warning", "bad", "Unparseable");
        let json = serde_json::to_value(&action).unwrap();
        assert_eq!(json["what"], "setTag");
        assert_eq!(json["who"], "powercycle");
        assert_eq!(json["done"], false);
    }
}
