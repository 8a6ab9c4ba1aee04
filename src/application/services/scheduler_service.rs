use std::cmp::{max, min};
use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Datelike, Duration, NaiveDate};
use tracing::{debug, info, warn};

use crate::domain::clock::Clock;
use crate::domain::entities::{NewTask, Task, TaskId, TaskPatch, TaskRole};
use crate::domain::errors::TaskError;
use crate::domain::repositories::{TaskFilter, TaskRepository};

/// How far ahead `next_occurrence` scans. Past this the answer is "nothing
/// coming up", not "never recurs again".
const NEXT_OCCURRENCE_HORIZON_DAYS: i64 = 14;

/// Scope of a recurring-task deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletePolicy {
    /// Only the identified record.
    This,
    /// The identified instance and everything the series would generate after it.
    Future,
    /// The whole series: template and every materialized instance.
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    Week,
    Month,
}

impl Granularity {
    /// Unrecognized values get the month range; the calendar has only ever
    /// had the two granularities and treats everything else as "month".
    pub fn parse_lossy(input: &str) -> Granularity {
        match input.to_lowercase().as_str() {
            "week" => Granularity::Week,
            _ => Granularity::Month,
        }
    }
}

/// Single source of truth for "is this template's pattern active on `date`":
/// the weekday is in the pattern and the date sits inside the template's
/// validity window. Calendar rendering and instance materialization both go
/// through here.
pub fn is_due_on(template: &Task, date: NaiveDate) -> bool {
    template.repeat_days.contains(&date.weekday())
        && date >= template.validity_start()
        && template.repeat_until.map_or(true, |until| date <= until)
}

/// Calendar window containing `reference`: the Sunday-to-Saturday week, or
/// the first through last day of the month. Bounds are inclusive.
pub fn date_range_for(reference: NaiveDate, granularity: Granularity) -> (NaiveDate, NaiveDate) {
    match granularity {
        Granularity::Week => {
            let offset = reference.weekday().num_days_from_sunday() as i64;
            let start = reference - Duration::days(offset);
            (start, start + Duration::days(6))
        }
        Granularity::Month => {
            let start = reference.with_day(1).unwrap_or(reference);
            let end = NaiveDate::from_ymd_opt(
                match reference.month() {
                    12 => reference.year() + 1,
                    _ => reference.year(),
                },
                match reference.month() {
                    12 => 1,
                    _ => reference.month() + 1,
                },
                1,
            )
            .and_then(|d| d.pred_opt())
            .unwrap_or(reference);
            (start, end)
        }
    }
}

fn is_active(template: &Task, today: NaiveDate) -> bool {
    template.is_repeating && template.repeat_until.map_or(true, |until| until >= today)
}

/// Computes which occurrences of recurring templates should exist in a date
/// window, materializes the missing instances, and applies scoped deletion
/// to a series.
#[derive(Clone)]
pub struct RecurrenceScheduler {
    repo: Arc<dyn TaskRepository>,
    clock: Arc<dyn Clock>,
}

impl RecurrenceScheduler {
    pub fn new(repo: Arc<dyn TaskRepository>, clock: Arc<dyn Clock>) -> Self {
        Self { repo, clock }
    }

    /// All occurrences due in `[start, end]` (inclusive, calendar-date
    /// granularity): stand-alone tasks, already-materialized instances, and
    /// instances created on the fly for any active template whose pattern
    /// hits a date in the window. Sorted ascending by due date (creation
    /// date when a record has none), stable on ties.
    ///
    /// A failure to materialize one date is logged and skipped so it cannot
    /// block the rest of the range; the missing instance shows up again on
    /// the next successful query.
    pub async fn occurrences_for_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Task>, TaskError> {
        let mut occurrences = self
            .repo
            .list_tasks(&TaskFilter::non_templates_in_range(start, end))
            .await?;

        let today = self.clock.today();
        let templates: Vec<Task> = self
            .repo
            .list_tasks(&TaskFilter::templates())
            .await?
            .into_iter()
            .filter(|t| is_active(t, today))
            .collect();

        let mut seen: HashSet<(TaskId, NaiveDate)> = occurrences
            .iter()
            .filter_map(|t| match (t.template_id, t.due_date) {
                (Some(template_id), Some(due)) => Some((template_id, due)),
                _ => None,
            })
            .collect();

        for template in &templates {
            // walk the intersection of the query window and the template's own window
            let lo = max(template.validity_start(), start);
            let hi = match template.repeat_until {
                Some(until) => min(until, end),
                None => end,
            };

            let mut day = lo;
            while day <= hi {
                if is_due_on(template, day) && !seen.contains(&(template.id, day)) {
                    match self.repo.create_task(NewTask::instance_of(template, day)).await {
                        Ok(instance) => {
                            seen.insert((template.id, day));
                            occurrences.push(instance);
                        }
                        Err(TaskError::Conflict { .. }) => {
                            // raced with another query; the slot is already filled
                            debug!(
                                template_id = template.id,
                                date = %day,
                                "instance already materialized"
                            );
                            seen.insert((template.id, day));
                        }
                        Err(err) => {
                            warn!(
                                template_id = template.id,
                                date = %day,
                                error = %err,
                                "failed to materialize instance"
                            );
                        }
                    }
                }
                match day.succ_opt() {
                    Some(next) => day = next,
                    None => break,
                }
            }
        }

        occurrences.sort_by_key(|t| t.sort_date());
        Ok(occurrences)
    }

    /// First upcoming occurrence of `template` after today, within a 14-day
    /// horizon. `None` means nothing in the near future, not "never again".
    pub fn next_occurrence(&self, template: &Task) -> Option<NaiveDate> {
        self.next_occurrence_after(template, self.clock.today())
    }

    pub fn next_occurrence_after(&self, template: &Task, from: NaiveDate) -> Option<NaiveDate> {
        for i in 1..=NEXT_OCCURRENCE_HORIZON_DAYS {
            let candidate = from + Duration::days(i);
            if is_due_on(template, candidate) {
                return Some(candidate);
            }
        }
        None
    }

    /// Delete a record with one of the three series-aware scopes.
    ///
    /// Fails with `NotFound` when the id does not resolve. Each scope is a
    /// sequence of storage operations and any failure mid-sequence is
    /// propagated, since partial deletion leaves state the caller must know
    /// about.
    pub async fn delete_with_policy(
        &self,
        id: TaskId,
        policy: DeletePolicy,
    ) -> Result<(), TaskError> {
        let task = self
            .repo
            .get_task(id)
            .await?
            .ok_or(TaskError::NotFound(id))?;

        match policy {
            DeletePolicy::This => self.repo.delete_task(id).await,
            DeletePolicy::Future => match task.role() {
                TaskRole::Instance { template_id } => {
                    self.repo.delete_task(id).await?;
                    let cutoff = match task.due_date {
                        Some(due) => due.pred_opt().unwrap_or(due),
                        None => self.clock.today(),
                    };
                    // already-materialized siblings past the cutoff have to go
                    // too, or shortening the series would leave orphans
                    let siblings = self
                        .repo
                        .list_tasks(&TaskFilter {
                            template_id: Some(template_id),
                            is_template: Some(false),
                            ..Default::default()
                        })
                        .await?;
                    for sibling in siblings {
                        if sibling.due_date.map_or(false, |due| due > cutoff) {
                            self.repo.delete_task(sibling.id).await?;
                        }
                    }
                    // the parent may already be gone (deleted on its own
                    // earlier); the instance cleanup above still stands
                    match self
                        .repo
                        .update_task(
                            template_id,
                            TaskPatch {
                                repeat_until: Some(Some(cutoff)),
                                ..Default::default()
                            },
                        )
                        .await
                    {
                        Ok(_) | Err(TaskError::NotFound(_)) => Ok(()),
                        Err(err) => Err(err),
                    }
                }
                // applied to the series definition itself, "future" collapses
                // to the whole series
                _ => self.delete_series(&task).await,
            },
            DeletePolicy::All => self.delete_series(&task).await,
        }
    }

    async fn delete_series(&self, task: &Task) -> Result<(), TaskError> {
        let template_id = match task.role() {
            TaskRole::Instance { template_id } => template_id,
            _ => task.id,
        };

        // deactivate before cascading so a concurrent range query cannot
        // regenerate instances mid-delete; a template that was already
        // deleted on its own leaves orphaned instances, and those still get
        // cleared below
        match self
            .repo
            .update_task(
                template_id,
                TaskPatch {
                    is_repeating: Some(false),
                    repeat_until: Some(Some(self.clock.today())),
                    ..Default::default()
                },
            )
            .await
        {
            Ok(_) | Err(TaskError::NotFound(_)) => {}
            Err(err) => return Err(err),
        }

        let removed = self.repo.delete_instances_of_template(template_id).await?;
        self.repo.delete_task(template_id).await?;

        info!(template_id, removed, "deleted recurring series");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Utc, Weekday};

    use crate::domain::entities::NewTask;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn template(days: Vec<Weekday>, start: Option<NaiveDate>, until: Option<NaiveDate>) -> Task {
        NewTask::template(1, "standup", days, start, until).into_task(10, Utc::now())
    }

    #[test]
    fn due_on_matching_weekday_inside_window() {
        let tpl = template(
            vec![Weekday::Mon, Weekday::Fri],
            Some(date(2025, 1, 6)),
            Some(date(2025, 1, 31)),
        );
        assert!(is_due_on(&tpl, date(2025, 1, 6))); // Monday, start day
        assert!(is_due_on(&tpl, date(2025, 1, 31))); // Friday, last day
        assert!(!is_due_on(&tpl, date(2025, 1, 7))); // Tuesday
        assert!(!is_due_on(&tpl, date(2025, 1, 3))); // before start
        assert!(!is_due_on(&tpl, date(2025, 2, 3))); // past repeat_until
    }

    #[test]
    fn validity_start_falls_back_to_creation_date() {
        let mut tpl = template(vec![Weekday::Mon], None, None);
        tpl.inserted_at = date(2025, 1, 8).and_hms_opt(9, 0, 0).unwrap().and_utc();
        assert!(!is_due_on(&tpl, date(2025, 1, 6))); // Monday before creation
        assert!(is_due_on(&tpl, date(2025, 1, 13)));
    }

    #[test]
    fn week_range_is_sunday_to_saturday() {
        // 2025-01-08 is a Wednesday
        let (start, end) = date_range_for(date(2025, 1, 8), Granularity::Week);
        assert_eq!(start, date(2025, 1, 5));
        assert_eq!(end, date(2025, 1, 11));

        // a Sunday starts its own week
        let (start, end) = date_range_for(date(2025, 1, 5), Granularity::Week);
        assert_eq!(start, date(2025, 1, 5));
        assert_eq!(end, date(2025, 1, 11));
    }

    #[test]
    fn month_range_covers_whole_month() {
        let (start, end) = date_range_for(date(2024, 2, 15), Granularity::Month);
        assert_eq!(start, date(2024, 2, 1));
        assert_eq!(end, date(2024, 2, 29)); // leap year

        let (start, end) = date_range_for(date(2025, 12, 3), Granularity::Month);
        assert_eq!(start, date(2025, 12, 1));
        assert_eq!(end, date(2025, 12, 31));
    }

    #[test]
    fn unknown_granularity_defaults_to_month() {
        assert_eq!(Granularity::parse_lossy("fortnight"), Granularity::Month);
        assert_eq!(Granularity::parse_lossy("WEEK"), Granularity::Week);
    }
}
