use std::sync::Arc;

use chrono::{NaiveDate, Weekday};
use tracing::info;

use crate::domain::clock::Clock;
use crate::domain::entities::{NewTask, Priority, Task, TaskId, TaskPatch, TaskRole};
use crate::domain::errors::TaskError;
use crate::domain::repositories::{TaskFilter, TaskRepository};

/// CRUD layer over the task store: validates drafts and edits before any
/// storage mutation and stamps completion times from the injected clock.
#[derive(Clone)]
pub struct TaskService {
    repo: Arc<dyn TaskRepository>,
    clock: Arc<dyn Clock>,
}

impl TaskService {
    pub fn new(repo: Arc<dyn TaskRepository>, clock: Arc<dyn Clock>) -> Self {
        Self { repo, clock }
    }

    pub async fn create_task(
        &self,
        user_id: u64,
        title: String,
        due_date: Option<NaiveDate>,
        priority: Option<Priority>,
        notes: Option<String>,
        tags: Vec<String>,
    ) -> Result<Task, TaskError> {
        let mut draft = NewTask::regular(user_id, title).with_tags(tags);
        draft.due_date = due_date;
        draft.notes = notes;
        if let Some(priority) = priority {
            draft = draft.with_priority(priority);
        }
        draft.validate()?;
        self.repo.create_task(draft).await
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn create_template(
        &self,
        user_id: u64,
        title: String,
        repeat_days: Vec<Weekday>,
        start: Option<NaiveDate>,
        repeat_until: Option<NaiveDate>,
        priority: Option<Priority>,
        notes: Option<String>,
        tags: Vec<String>,
    ) -> Result<Task, TaskError> {
        let mut draft = NewTask::template(user_id, title, repeat_days, start, repeat_until)
            .with_tags(tags);
        draft.notes = notes;
        if let Some(priority) = priority {
            draft = draft.with_priority(priority);
        }
        draft.validate()?;
        let template = self.repo.create_task(draft).await?;
        info!(template_id = template.id, "created recurring template");
        Ok(template)
    }

    pub async fn get_task(&self, id: TaskId) -> Result<Task, TaskError> {
        self.repo
            .get_task(id)
            .await?
            .ok_or(TaskError::NotFound(id))
    }

    /// Mark a task complete or not. Templates are never actionable items and
    /// cannot be completed.
    pub async fn set_complete(&self, id: TaskId, complete: bool) -> Result<Task, TaskError> {
        let task = self.get_task(id).await?;
        if task.role() == TaskRole::Template {
            return Err(TaskError::validation("a template cannot be completed"));
        }
        let completed_at = if complete { Some(self.clock.now()) } else { None };
        self.repo
            .update_task(
                id,
                TaskPatch {
                    is_complete: Some(complete),
                    completed_at: Some(completed_at),
                    ..Default::default()
                },
            )
            .await
    }

    /// Apply a partial edit, re-checking the record's invariants with the
    /// patch applied before anything is written.
    pub async fn edit_task(&self, id: TaskId, patch: TaskPatch) -> Result<Task, TaskError> {
        let current = self.get_task(id).await?;

        let mut preview = current.clone();
        preview.apply(patch.clone());

        if preview.title.trim().is_empty() {
            return Err(TaskError::validation("task title cannot be empty"));
        }
        if preview.is_repeating && preview.repeat_days.is_empty() {
            return Err(TaskError::validation(
                "a repeating task needs at least one repeat day",
            ));
        }
        if let (Some(start), Some(until)) = (preview.due_date, preview.repeat_until) {
            if until < start {
                return Err(TaskError::validation(format!(
                    "repeat_until {} is before the start date {}",
                    until, start
                )));
            }
        }

        self.repo.update_task(id, patch).await
    }

    pub async fn list_for_user(&self, user_id: u64) -> Result<Vec<Task>, TaskError> {
        self.repo
            .list_tasks(&TaskFilter {
                is_template: Some(false),
                user_id: Some(user_id),
                ..Default::default()
            })
            .await
    }

    pub async fn list_templates_for_user(&self, user_id: u64) -> Result<Vec<Task>, TaskError> {
        self.repo
            .list_tasks(&TaskFilter {
                is_template: Some(true),
                user_id: Some(user_id),
                ..Default::default()
            })
            .await
    }
}
