//! Policy plugins
//!
//! A plugin looks at one resource at a time and registers actions on it
//! through [`Resource::add_action`]. Plugins run in configured order, so an
//! earlier plugin's state change wins over a later, conflicting one.

mod central;
mod powercycle;
mod validate_tags;

pub use central::*;
pub use powercycle::*;
pub use validate_tags::*;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use revolver_api::{Action, Resource};
use revolver_config::{Defaults, PluginSettings, Policy};
use tracing::{trace, warn};

use crate::{Directive, Evaluation, FilterError, ScheduleEvaluator};

/// Policy plugin contract
pub trait Plugin: Send + Sync {
    /// Name recorded as the origin of generated actions
    fn name(&self) -> &str;

    fn is_applicable(&self, resource: &Resource) -> bool;

    /// Register zero or more actions on the resource
    fn generate_actions(&self, resource: &mut Resource, now: DateTime<Utc>);
}

/// Build the configured plugins, compiling every filter.
///
/// `reference` is the instant matcher schedules are checked against.
pub fn build_plugins(
    policy: &Policy,
    reference: DateTime<Utc>,
) -> Result<Vec<Box<dyn Plugin>>, FilterError> {
    let schedules = TagSchedule::from_defaults(&policy.defaults);

    policy
        .plugins
        .iter()
        .map(|settings| -> Result<Box<dyn Plugin>, FilterError> {
            let plugin: Box<dyn Plugin> = match settings {
                PluginSettings::Powercycle { scope } => {
                    Box::new(PowercyclePlugin::new(scope.clone(), schedules.clone()))
                }
                PluginSettings::PowercycleCentral {
                    scope,
                    availability_tag_priority,
                    matchers,
                } => Box::new(PowercycleCentralPlugin::new(
                    scope.clone(),
                    schedules.clone(),
                    *availability_tag_priority,
                    matchers,
                    reference,
                )?),
                PluginSettings::ValidateTags {
                    scope,
                    tags,
                    on_missing,
                } => Box::new(ValidateTagsPlugin::new(
                    scope.clone(),
                    tags.clone(),
                    on_missing.clone(),
                )),
            };
            Ok(plugin)
        })
        .collect()
}

/// Schedule tag handling shared by the power-cycling plugins
#[derive(Debug, Clone)]
pub struct TagSchedule {
    pub evaluator: ScheduleEvaluator,
    pub schedule_tag: String,
    pub timezone_tag: String,
    pub default_timezone: Tz,
    pub warning_tag: String,
}

impl TagSchedule {
    pub fn from_defaults(defaults: &Defaults) -> Self {
        Self {
            evaluator: ScheduleEvaluator::new(defaults.barrier_tolerance),
            schedule_tag: defaults.schedule_tag.clone(),
            timezone_tag: defaults.timezone_tag.clone(),
            default_timezone: defaults.timezone,
            warning_tag: defaults.warning_tag.clone(),
        }
    }

    /// The resource's own schedule, if tagged
    pub fn schedule_of<'a>(&self, resource: &'a Resource) -> Option<&'a str> {
        resource.tag(&self.schedule_tag)
    }

    /// The resource's timezone tag, or the default when absent or unknown
    pub fn timezone_of(&self, resource: &Resource) -> Tz {
        match resource.tag(&self.timezone_tag) {
            Some(name) => name.trim().parse::<Tz>().unwrap_or_else(|_| {
                warn!(
                    resource_id = %resource.id,
                    timezone = %name,
                    fallback = %self.default_timezone,
                    "Invalid timezone tag"
                );
                self.default_timezone
            }),
            None => self.default_timezone,
        }
    }

    /// Evaluate `schedule` in the resource's local time and register the
    /// resulting action.
    pub fn apply(
        &self,
        resource: &mut Resource,
        who: &str,
        schedule: &str,
        now: DateTime<Utc>,
        pretend: bool,
    ) -> Evaluation {
        let local = now.with_timezone(&self.timezone_of(resource));
        let evaluation = self.evaluator.evaluate(schedule, local);

        let action = match evaluation.directive {
            Directive::Start => Action::start(who, &evaluation.reason),
            Directive::Stop => Action::stop(who, &evaluation.reason),
            Directive::Noop => {
                trace!(resource_id = %resource.id, reason = %evaluation.reason, "Nothing to do");
                return evaluation;
            }
            Directive::Unparseable => {
                warn!(
                    resource_id = %resource.id,
                    schedule = %schedule,
                    "Unparseable schedule"
                );
                Action::set_tag(who, &self.warning_tag, &evaluation.reason, &evaluation.reason)
            }
        };

        resource.add_action(action.with_pretend(pretend));
        evaluation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use revolver_api::{ActionKind, ResourceState};

    fn schedules() -> TagSchedule {
        TagSchedule::from_defaults(&Defaults::default())
    }

    #[test]
    fn timezone_tag_with_fallback() {
        let schedules = schedules();
        let dublin = Resource::new("i-1", "ec2", "1", ResourceState::Running)
            .with_tag("Timezone", "Europe/Dublin");
        assert_eq!(schedules.timezone_of(&dublin), chrono_tz::Europe::Dublin);

        let bogus = Resource::new("i-2", "ec2", "1", ResourceState::Running)
            .with_tag("timezone", "Moon/Base");
        assert_eq!(schedules.timezone_of(&bogus), Tz::UTC);
    }

    #[test]
    fn apply_registers_actions() {
        let schedules = schedules();
        let now = Utc.with_ymd_and_hms(2026, 10, 12, 20, 0, 0).unwrap();

        let mut r = Resource::new("i-1", "ec2", "1", ResourceState::Running);
        let evaluation = schedules.apply(&mut r, "test", "start=08:00;stop=18:00", now, true);
        assert_eq!(evaluation.directive, Directive::Stop);
        assert_eq!(r.actions().len(), 1);
        assert_eq!(r.actions()[0].kind(), ActionKind::Stop);
        assert!(r.actions()[0].pretend);

        let mut quiet = Resource::new("i-2", "ec2", "1", ResourceState::Running);
        schedules.apply(&mut quiet, "test", "override", now, false);
        assert!(quiet.actions().is_empty());
    }

    #[test]
    fn unparseable_schedule_sets_warning_tag() {
        let schedules = schedules();
        let now = Utc.with_ymd_and_hms(2026, 10, 12, 20, 0, 0).unwrap();

        let mut r = Resource::new("i-1", "ec2", "1", ResourceState::Running);
        schedules.apply(&mut r, "test", "maybe later", now, false);

        let action = &r.actions()[0];
        assert_eq!(action.kind(), ActionKind::SetTag);
        assert_eq!(
            action.tags().unwrap().get("ScheduleWarning"),
            Some("Unparseable availability \"maybe later\"")
        );
    }
}
