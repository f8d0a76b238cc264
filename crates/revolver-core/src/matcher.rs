//! Matcher resolution for centrally defined policy

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use revolver_api::Resource;
use revolver_config::MatcherSettings;
use tracing::{debug, warn};

use crate::{Directive, Filter, FilterError, ScheduleEvaluator};

/// Named, prioritised (filter, schedule) pair
#[derive(Debug, Clone)]
pub struct Matcher {
    pub name: String,
    pub filter: Filter,
    pub schedule: String,
    pub priority: f64,
}

impl Matcher {
    pub fn build(settings: &MatcherSettings) -> Result<Self, FilterError> {
        Ok(Self {
            name: settings.name.clone(),
            filter: Filter::build(&settings.filter)?,
            schedule: settings.schedule.clone(),
            priority: if settings.priority.is_nan() { 0.0 } else { settings.priority },
        })
    }
}

/// Which schedule applies to a resource
#[derive(Debug, Clone, Copy)]
pub enum Resolution<'a> {
    Matcher(&'a Matcher),
    /// The resource's own schedule tag wins
    ResourceTag(&'a str),
    Unmatched,
}

/// Matchers ordered by descending priority
#[derive(Debug, Clone, Default)]
pub struct MatcherSet {
    matchers: Vec<Matcher>,
}

impl MatcherSet {
    /// Sort by descending priority. The sort is stable, so equal priorities
    /// keep their configured order.
    pub fn new(mut matchers: Vec<Matcher>) -> Self {
        matchers.sort_by(|a, b| b.priority.total_cmp(&a.priority));
        Self { matchers }
    }

    pub fn build(settings: &[MatcherSettings]) -> Result<Self, FilterError> {
        let matchers = settings.iter().map(Matcher::build).collect::<Result<_, _>>()?;
        Ok(Self::new(matchers))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Matcher> {
        self.matchers.iter()
    }

    pub fn len(&self) -> usize {
        self.matchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matchers.is_empty()
    }

    /// First matcher (by priority) whose filter accepts the resource.
    /// Filter errors count as a non-match.
    pub fn first_match(&self, resource: &Resource, now: DateTime<Utc>) -> Option<&Matcher> {
        self.matchers.iter().find(|m| match m.filter.matches(resource, now) {
            Ok(matched) => matched,
            Err(e) => {
                debug!(
                    resource_id = %resource.id,
                    matcher = %m.name,
                    error = %e,
                    "Matcher filter failed; treating as no match"
                );
                false
            }
        })
    }

    /// Pick the schedule for a resource.
    ///
    /// `tag_schedule` is the resource's own schedule tag, if any. It beats
    /// the winning matcher when `tag_priority` is at least the matcher's
    /// priority, and applies on its own when no matcher matches.
    pub fn resolve<'a>(
        &'a self,
        resource: &Resource,
        tag_schedule: Option<&'a str>,
        tag_priority: f64,
        now: DateTime<Utc>,
    ) -> Resolution<'a> {
        match (self.first_match(resource, now), tag_schedule) {
            (Some(matcher), Some(tag)) if tag_priority >= matcher.priority => {
                Resolution::ResourceTag(tag)
            }
            (Some(matcher), _) => Resolution::Matcher(matcher),
            (None, Some(tag)) => Resolution::ResourceTag(tag),
            (None, None) => Resolution::Unmatched,
        }
    }

    /// Evaluate every schedule once at `reference` and report the ones that
    /// cannot be parsed. They are logged but stay in the set.
    pub fn check_schedules(
        &self,
        evaluator: &ScheduleEvaluator,
        reference: DateTime<Tz>,
    ) -> Vec<(String, String)> {
        self.matchers
            .iter()
            .filter_map(|m| {
                let evaluation = evaluator.evaluate(&m.schedule, reference);
                (evaluation.directive == Directive::Unparseable).then(|| {
                    warn!(
                        matcher = %m.name,
                        schedule = %m.schedule,
                        "Matcher schedule cannot be parsed"
                    );
                    (m.name.clone(), evaluation.reason)
                })
            })
            .collect()
    }
}
