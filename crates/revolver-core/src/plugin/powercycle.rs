//! Tag-driven power cycling

use chrono::{DateTime, Utc};
use revolver_api::Resource;
use revolver_config::PluginScope;

use crate::{Plugin, TagSchedule};

pub const POWERCYCLE: &str = "powercycle";

/// Starts and stops resources according to their own schedule tag
#[derive(Debug, Clone)]
pub struct PowercyclePlugin {
    scope: PluginScope,
    schedules: TagSchedule,
}

impl PowercyclePlugin {
    pub fn new(scope: PluginScope, schedules: TagSchedule) -> Self {
        Self { scope, schedules }
    }
}

impl Plugin for PowercyclePlugin {
    fn name(&self) -> &str {
        POWERCYCLE
    }

    fn is_applicable(&self, resource: &Resource) -> bool {
        self.scope.applies_to(&resource.resource_type)
            && self.schedules.schedule_of(resource).is_some()
    }

    fn generate_actions(&self, resource: &mut Resource, now: DateTime<Utc>) {
        let Some(schedule) = self.schedules.schedule_of(resource).map(str::to_string) else {
            return;
        };
        self.schedules
            .apply(resource, POWERCYCLE, &schedule, now, self.scope.pretend);
    }
}
