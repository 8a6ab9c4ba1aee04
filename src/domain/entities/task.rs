use chrono::{DateTime, NaiveDate, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::domain::errors::TaskError;

pub type TaskId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }

    pub fn parse(input: &str) -> Option<Priority> {
        match input.to_lowercase().as_str() {
            "low" => Some(Priority::Low),
            "medium" => Some(Priority::Medium),
            "high" => Some(Priority::High),
            _ => None,
        }
    }
}

/// A stored task record. One schema carries three roles (template, instance,
/// regular task); see [`TaskRole`] for the decoded view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub user_id: u64,
    pub title: String,
    pub is_complete: bool,
    pub inserted_at: DateTime<Utc>,
    pub due_date: Option<NaiveDate>,
    pub completed_at: Option<DateTime<Utc>>,
    pub priority: Priority,
    pub notes: Option<String>,
    pub tags: Vec<String>,
    pub is_repeating: bool,
    pub repeat_days: Vec<Weekday>,
    pub repeat_until: Option<NaiveDate>, // inclusive
    pub template_id: Option<TaskId>,
    pub is_template: bool,
}

/// Role a record plays, decoded from the flattened storage flags.
///
/// Exactly one role holds per record; `role()` gives the template flag
/// precedence so a malformed record can never be read as both template and
/// instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskRole {
    Template,
    Instance { template_id: TaskId },
    Regular,
}

impl Task {
    pub fn role(&self) -> TaskRole {
        if self.is_template {
            TaskRole::Template
        } else if let Some(template_id) = self.template_id {
            TaskRole::Instance { template_id }
        } else {
            TaskRole::Regular
        }
    }

    /// First date on which a template's pattern can produce an occurrence:
    /// its own due date, or its creation date when no due date was set.
    pub fn validity_start(&self) -> NaiveDate {
        self.due_date
            .unwrap_or_else(|| self.inserted_at.date_naive())
    }

    /// Date used for range filtering and result ordering (due date, falling
    /// back to the creation date).
    pub fn sort_date(&self) -> NaiveDate {
        self.due_date
            .unwrap_or_else(|| self.inserted_at.date_naive())
    }

    pub fn apply(&mut self, patch: TaskPatch) {
        if let Some(title) = patch.title {
            self.title = title;
        }
        if let Some(is_complete) = patch.is_complete {
            self.is_complete = is_complete;
        }
        if let Some(due_date) = patch.due_date {
            self.due_date = due_date;
        }
        if let Some(completed_at) = patch.completed_at {
            self.completed_at = completed_at;
        }
        if let Some(priority) = patch.priority {
            self.priority = priority;
        }
        if let Some(notes) = patch.notes {
            self.notes = notes;
        }
        if let Some(tags) = patch.tags {
            self.tags = tags;
        }
        if let Some(is_repeating) = patch.is_repeating {
            self.is_repeating = is_repeating;
        }
        if let Some(repeat_days) = patch.repeat_days {
            self.repeat_days = repeat_days;
        }
        if let Some(repeat_until) = patch.repeat_until {
            self.repeat_until = repeat_until;
        }
    }
}

/// Creation payload: everything but the id and creation timestamp, which the
/// storage backend assigns.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub user_id: u64,
    pub title: String,
    pub is_complete: bool,
    pub due_date: Option<NaiveDate>,
    pub completed_at: Option<DateTime<Utc>>,
    pub priority: Priority,
    pub notes: Option<String>,
    pub tags: Vec<String>,
    pub is_repeating: bool,
    pub repeat_days: Vec<Weekday>,
    pub repeat_until: Option<NaiveDate>,
    pub template_id: Option<TaskId>,
    pub is_template: bool,
}

impl NewTask {
    /// One-off task with no generation relationship.
    pub fn regular(user_id: u64, title: impl Into<String>) -> Self {
        Self {
            user_id,
            title: title.into(),
            is_complete: false,
            due_date: None,
            completed_at: None,
            priority: Priority::Medium,
            notes: None,
            tags: Vec::new(),
            is_repeating: false,
            repeat_days: Vec::new(),
            repeat_until: None,
            template_id: None,
            is_template: false,
        }
    }

    /// Recurring-pattern definition. Never completable itself.
    pub fn template(
        user_id: u64,
        title: impl Into<String>,
        repeat_days: Vec<Weekday>,
        start: Option<NaiveDate>,
        repeat_until: Option<NaiveDate>,
    ) -> Self {
        Self {
            due_date: start,
            is_repeating: true,
            repeat_days,
            repeat_until,
            is_template: true,
            ..Self::regular(user_id, title)
        }
    }

    /// Concrete occurrence of `template` for one due date, copying the
    /// template's presentation fields.
    pub fn instance_of(template: &Task, due_date: NaiveDate) -> Self {
        Self {
            user_id: template.user_id,
            title: template.title.clone(),
            is_complete: false,
            due_date: Some(due_date),
            completed_at: None,
            priority: template.priority,
            notes: template.notes.clone(),
            tags: template.tags.clone(),
            is_repeating: false,
            repeat_days: Vec::new(),
            repeat_until: None,
            template_id: Some(template.id),
            is_template: false,
        }
    }

    pub fn with_due(mut self, due_date: NaiveDate) -> Self {
        self.due_date = Some(due_date);
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    /// Rejects malformed records before they reach storage.
    pub fn validate(&self) -> Result<(), TaskError> {
        if self.title.trim().is_empty() {
            return Err(TaskError::validation("task title cannot be empty"));
        }
        if self.is_template && self.template_id.is_some() {
            return Err(TaskError::validation(
                "a template cannot reference another template",
            ));
        }
        if self.is_repeating && self.repeat_days.is_empty() {
            return Err(TaskError::validation(
                "a repeating task needs at least one repeat day",
            ));
        }
        if let (Some(start), Some(until)) = (self.due_date, self.repeat_until) {
            if until < start {
                return Err(TaskError::validation(format!(
                    "repeat_until {} is before the start date {}",
                    until, start
                )));
            }
        }
        Ok(())
    }

    /// Promote to a stored record once storage has assigned identity.
    pub fn into_task(self, id: TaskId, inserted_at: DateTime<Utc>) -> Task {
        Task {
            id,
            user_id: self.user_id,
            title: self.title,
            is_complete: self.is_complete,
            inserted_at,
            due_date: self.due_date,
            completed_at: self.completed_at,
            priority: self.priority,
            notes: self.notes,
            tags: self.tags,
            is_repeating: self.is_repeating,
            repeat_days: self.repeat_days,
            repeat_until: self.repeat_until,
            template_id: self.template_id,
            is_template: self.is_template,
        }
    }
}

/// Partial update. `None` leaves a field untouched; the nested options set a
/// field to an explicit value, including "cleared".
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub is_complete: Option<bool>,
    pub due_date: Option<Option<NaiveDate>>,
    pub completed_at: Option<Option<DateTime<Utc>>>,
    pub priority: Option<Priority>,
    pub notes: Option<Option<String>>,
    pub tags: Option<Vec<String>>,
    pub is_repeating: Option<bool>,
    pub repeat_days: Option<Vec<Weekday>>,
    pub repeat_until: Option<Option<NaiveDate>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_task() -> Task {
        NewTask::regular(1, "write report").into_task(7, Utc::now())
    }

    #[test]
    fn role_decoding() {
        let mut task = base_task();
        assert_eq!(task.role(), TaskRole::Regular);

        task.template_id = Some(3);
        assert_eq!(task.role(), TaskRole::Instance { template_id: 3 });

        // template flag wins over a stray back-reference
        task.is_template = true;
        assert_eq!(task.role(), TaskRole::Template);
    }

    #[test]
    fn template_with_back_reference_rejected() {
        let mut draft = NewTask::template(1, "standup", vec![Weekday::Mon], None, None);
        draft.template_id = Some(9);
        assert!(draft.validate().is_err());
    }

    #[test]
    fn repeating_task_needs_days() {
        let draft = NewTask::template(1, "standup", vec![], None, None);
        assert!(matches!(draft.validate(), Err(TaskError::Validation(_))));
    }

    #[test]
    fn repeat_until_before_start_rejected() {
        let start = NaiveDate::from_ymd_opt(2025, 1, 6).unwrap();
        let until = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let draft = NewTask::template(1, "standup", vec![Weekday::Mon], Some(start), Some(until));
        assert!(draft.validate().is_err());
    }

    #[test]
    fn patch_clears_and_sets_fields() {
        let mut task = base_task();
        task.apply(TaskPatch {
            title: Some("write the report".into()),
            due_date: Some(Some(NaiveDate::from_ymd_opt(2025, 3, 1).unwrap())),
            notes: Some(None),
            ..Default::default()
        });
        assert_eq!(task.title, "write the report");
        assert_eq!(task.due_date, NaiveDate::from_ymd_opt(2025, 3, 1));
        assert!(task.notes.is_none());
    }
}
