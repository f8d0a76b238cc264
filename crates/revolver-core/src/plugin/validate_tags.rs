//! Required tag checks

use chrono::{DateTime, Utc};
use revolver_api::{Action, Resource};
use revolver_config::{MissingTagAction, PluginScope};
use tracing::debug;

use crate::Plugin;

pub const VALIDATE_TAGS: &str = "validateTags";

/// Name of the tag flagging a missing `tag`
pub fn warning_tag_for(tag: &str) -> String {
    format!("Warning{tag}")
}

/// Flags or stops resources missing required tags, and clears stale flags
#[derive(Debug, Clone)]
pub struct ValidateTagsPlugin {
    scope: PluginScope,
    tags: Vec<String>,
    on_missing: Vec<MissingTagAction>,
}

impl ValidateTagsPlugin {
    pub fn new(scope: PluginScope, tags: Vec<String>, on_missing: Vec<MissingTagAction>) -> Self {
        Self {
            scope,
            tags,
            on_missing,
        }
    }
}

impl Plugin for ValidateTagsPlugin {
    fn name(&self) -> &str {
        VALIDATE_TAGS
    }

    fn is_applicable(&self, resource: &Resource) -> bool {
        self.scope.applies_to(&resource.resource_type)
    }

    fn generate_actions(&self, resource: &mut Resource, _now: DateTime<Utc>) {
        for tag in &self.tags {
            let warning_tag = warning_tag_for(tag);

            if resource.tag(tag).is_some() {
                if resource.tag(&warning_tag).is_some() {
                    let action =
                        Action::unset_tag(VALIDATE_TAGS, warning_tag, format!("Tag {tag} is present"));
                    resource.add_action(action.with_pretend(self.scope.pretend));
                }
                continue;
            }

            let reason = format!("Tag {tag} is missing");
            debug!(resource_id = %resource.id, tag = %tag, "Required tag missing");
            for mode in &self.on_missing {
                let action = match mode {
                    MissingTagAction::Warn => {
                        Action::set_tag(VALIDATE_TAGS, &warning_tag, &reason, &reason)
                    }
                    MissingTagAction::Stop => Action::stop(VALIDATE_TAGS, &reason),
                };
                resource.add_action(action.with_pretend(self.scope.pretend));
            }
        }
    }
}
