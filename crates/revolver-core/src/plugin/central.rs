//! Centrally defined power cycling policy

use chrono::{DateTime, Utc};
use revolver_api::{Resource, HIGHEST_MATCH_KEY};
use revolver_config::{MatcherSettings, PluginScope};
use tracing::{debug, info};

use crate::{FilterError, MatcherSet, Plugin, Resolution, TagSchedule};

pub const POWERCYCLE_CENTRAL: &str = "powercycleCentral";

/// `highestMatch` value when the resource's own tag decided
pub const RESOURCE_TAG_MATCH: &str = "resource-tag";

/// Picks a schedule from prioritised matchers, deferring to the resource's
/// schedule tag when its priority is high enough
#[derive(Debug, Clone)]
pub struct PowercycleCentralPlugin {
    scope: PluginScope,
    schedules: TagSchedule,
    tag_priority: f64,
    matchers: MatcherSet,
}

impl PowercycleCentralPlugin {
    /// Compile the matchers and check their schedules at `reference`.
    /// Unparseable schedules are logged and kept.
    pub fn new(
        scope: PluginScope,
        schedules: TagSchedule,
        tag_priority: f64,
        matchers: &[MatcherSettings],
        reference: DateTime<Utc>,
    ) -> Result<Self, FilterError> {
        let matchers = MatcherSet::build(matchers)?;
        let invalid = matchers.check_schedules(
            &schedules.evaluator,
            reference.with_timezone(&schedules.default_timezone),
        );

        info!(
            matcher_count = matchers.len(),
            invalid_count = invalid.len(),
            "Central policy initialized"
        );

        Ok(Self {
            scope,
            schedules,
            tag_priority,
            matchers,
        })
    }

    pub fn matchers(&self) -> &MatcherSet {
        &self.matchers
    }
}

impl Plugin for PowercycleCentralPlugin {
    fn name(&self) -> &str {
        POWERCYCLE_CENTRAL
    }

    fn is_applicable(&self, resource: &Resource) -> bool {
        self.scope.applies_to(&resource.resource_type)
    }

    fn generate_actions(&self, resource: &mut Resource, now: DateTime<Utc>) {
        let tag_schedule = self.schedules.schedule_of(resource).map(str::to_string);

        let (label, schedule) =
            match self
                .matchers
                .resolve(resource, tag_schedule.as_deref(), self.tag_priority, now)
            {
                Resolution::Matcher(m) => (m.name.clone(), m.schedule.clone()),
                Resolution::ResourceTag(tag) => (RESOURCE_TAG_MATCH.to_string(), tag.to_string()),
                Resolution::Unmatched => {
                    debug!(resource_id = %resource.id, "No matcher applies");
                    return;
                }
            };

        debug!(resource_id = %resource.id, matcher = %label, "Schedule selected");
        resource.annotate(HIGHEST_MATCH_KEY, label);
        self.schedules
            .apply(resource, POWERCYCLE_CENTRAL, &schedule, now, self.scope.pretend);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use revolver_api::{ActionKind, ResourceState};
    use revolver_config::{Comparison, Defaults, FilterSpec};

    fn now() -> DateTime<Utc> {
        // Saturday
        Utc.with_ymd_and_hms(2026, 10, 17, 12, 0, 0).unwrap()
    }

    fn matcher(name: &str, tag: &str, schedule: &str, priority: f64) -> MatcherSettings {
        let (key, value) = tag.split_once('|').unwrap();
        MatcherSettings {
            name: name.into(),
            filter: FilterSpec::Tag {
                key: key.into(),
                cmp: Some(Comparison::parse(value)),
            },
            schedule: schedule.into(),
            priority,
        }
    }

    fn plugin(tag_priority: f64) -> PowercycleCentralPlugin {
        PowercycleCentralPlugin::new(
            PluginScope::default(),
            TagSchedule::from_defaults(&Defaults::default()),
            tag_priority,
            &[
                matcher("dev-weekdays", "Environment|iequals|dev", "24x5", 10.0),
                matcher("everything-on", "Environment|contains|", "24x7", 1.0),
                matcher("broken", "Environment|never", "soon", 0.0),
            ],
            now(),
        )
        .unwrap()
    }

    fn instance(env: &str) -> Resource {
        Resource::new("i-1", "ec2", "1", ResourceState::Running).with_tag("Environment", env)
    }

    #[test]
    fn highest_priority_matcher_decides() {
        let plugin = plugin(5.0);
        let mut r = instance("DEV");
        plugin.generate_actions(&mut r, now());

        assert_eq!(r.actions().len(), 1);
        assert_eq!(r.actions()[0].kind(), ActionKind::Stop);
        assert_eq!(r.actions()[0].reason, "Availability 24x5 and it is Saturday");
        assert_eq!(r.metadata()[HIGHEST_MATCH_KEY], "dev-weekdays");
    }

    #[test]
    fn resource_tag_with_enough_priority_wins() {
        let plugin = plugin(10.0);
        let mut r = instance("dev").with_tag("Schedule", "24x7");
        plugin.generate_actions(&mut r, now());

        assert_eq!(r.actions()[0].kind(), ActionKind::Start);
        assert_eq!(r.metadata()[HIGHEST_MATCH_KEY], RESOURCE_TAG_MATCH);
    }

    #[test]
    fn lower_priority_tag_is_ignored() {
        let plugin = plugin(0.5);
        let mut r = instance("prod").with_tag("Schedule", "0x7");
        plugin.generate_actions(&mut r, now());

        assert_eq!(r.actions()[0].kind(), ActionKind::Start);
        assert_eq!(r.metadata()[HIGHEST_MATCH_KEY], "everything-on");
    }

    #[test]
    fn unmatched_resources_are_untouched() {
        let plugin = plugin(5.0);
        let mut r = Resource::new("i-9", "ec2", "1", ResourceState::Running);
        plugin.generate_actions(&mut r, now());

        assert!(r.actions().is_empty());
        assert!(r.metadata().get(HIGHEST_MATCH_KEY).is_none());
    }

    #[test]
    fn invalid_matchers_stay_live() {
        let plugin = plugin(5.0);
        assert_eq!(plugin.matchers().len(), 3);

        let mut r = instance("never");
        // "contains|" matches every Environment value and outranks "broken"
        plugin.generate_actions(&mut r, now());
        assert_eq!(r.metadata()[HIGHEST_MATCH_KEY], "everything-on");
    }
}
