use async_trait::async_trait;
use chrono::NaiveDate;

use crate::domain::entities::{NewTask, Priority, Task, TaskId, TaskPatch};
use crate::domain::errors::TaskError;

/// Query filter for [`TaskRepository::list_tasks`]. All criteria are ANDed;
/// an empty filter matches every record.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub is_template: Option<bool>,
    /// Inclusive calendar-date bounds, matched against the due date or the
    /// creation date when no due date is set.
    pub due_range: Option<(NaiveDate, NaiveDate)>,
    pub template_id: Option<TaskId>,
    pub priority: Option<Priority>,
    pub is_complete: Option<bool>,
    pub user_id: Option<u64>,
}

impl TaskFilter {
    pub fn templates() -> Self {
        Self {
            is_template: Some(true),
            ..Default::default()
        }
    }

    pub fn non_templates_in_range(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            is_template: Some(false),
            due_range: Some((start, end)),
            ..Default::default()
        }
    }

    /// Whether `task` satisfies every set criterion. Both backends answer
    /// list queries through this, so range semantics cannot drift.
    pub fn matches(&self, task: &Task) -> bool {
        if let Some(is_template) = self.is_template {
            if task.is_template != is_template {
                return false;
            }
        }
        if let Some((start, end)) = self.due_range {
            let date = task.sort_date();
            if date < start || date > end {
                return false;
            }
        }
        if let Some(template_id) = self.template_id {
            if task.template_id != Some(template_id) {
                return false;
            }
        }
        if let Some(priority) = self.priority {
            if task.priority != priority {
                return false;
            }
        }
        if let Some(is_complete) = self.is_complete {
            if task.is_complete != is_complete {
                return false;
            }
        }
        if let Some(user_id) = self.user_id {
            if task.user_id != user_id {
                return false;
            }
        }
        true
    }
}

/// Storage contract consumed by the services.
///
/// Identity and creation timestamps are owned by the backend. `create_task`
/// enforces at-most-one instance per `(template_id, due_date)` and reports a
/// violation as [`TaskError::Conflict`]. `delete_task` is idempotent: deleting
/// an id that is already gone succeeds.
#[async_trait]
pub trait TaskRepository: Send + Sync {
    async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>, TaskError>;

    async fn get_task(&self, id: TaskId) -> Result<Option<Task>, TaskError>;

    async fn create_task(&self, draft: NewTask) -> Result<Task, TaskError>;

    async fn update_task(&self, id: TaskId, patch: TaskPatch) -> Result<Task, TaskError>;

    async fn delete_task(&self, id: TaskId) -> Result<(), TaskError>;

    /// Remove every instance generated from `template_id`, returning how many
    /// records went away. The template record itself is untouched.
    async fn delete_instances_of_template(&self, template_id: TaskId) -> Result<usize, TaskError>;
}
