use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::domain::clock::{Clock, SystemClock};
use crate::domain::entities::{NewTask, Task, TaskId, TaskPatch};
use crate::domain::errors::TaskError;
use crate::domain::repositories::{TaskFilter, TaskRepository};

/// In-memory task store. Backs the integration tests and small demo runs;
/// enforces the same `(template_id, due_date)` uniqueness the SQLite backend
/// gets from its index.
pub struct MemoryTaskRepository {
    inner: Mutex<Inner>,
    clock: Arc<dyn Clock>,
}

struct Inner {
    tasks: HashMap<TaskId, Task>,
    next_id: TaskId,
}

impl MemoryTaskRepository {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creation timestamps come from `clock`, so tests can pin them.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                tasks: HashMap::new(),
                next_id: 1,
            }),
            clock,
        }
    }
}

impl Default for MemoryTaskRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskRepository for MemoryTaskRepository {
    async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>, TaskError> {
        let inner = self.inner.lock().unwrap();
        let mut tasks: Vec<Task> = inner
            .tasks
            .values()
            .filter(|t| filter.matches(t))
            .cloned()
            .collect();
        // insertion order, so callers get a stable fetch order
        tasks.sort_by_key(|t| t.id);
        Ok(tasks)
    }

    async fn get_task(&self, id: TaskId) -> Result<Option<Task>, TaskError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.tasks.get(&id).cloned())
    }

    async fn create_task(&self, draft: NewTask) -> Result<Task, TaskError> {
        let mut inner = self.inner.lock().unwrap();

        if let (Some(template_id), Some(due_date)) = (draft.template_id, draft.due_date) {
            let taken = inner
                .tasks
                .values()
                .any(|t| t.template_id == Some(template_id) && t.due_date == Some(due_date));
            if taken {
                return Err(TaskError::Conflict {
                    template_id,
                    due_date,
                });
            }
        }

        let id = inner.next_id;
        inner.next_id += 1;
        let task = draft.into_task(id, self.clock.now());
        inner.tasks.insert(id, task.clone());
        Ok(task)
    }

    async fn update_task(&self, id: TaskId, patch: TaskPatch) -> Result<Task, TaskError> {
        let mut inner = self.inner.lock().unwrap();
        let mut updated = inner
            .tasks
            .get(&id)
            .cloned()
            .ok_or(TaskError::NotFound(id))?;
        updated.apply(patch);

        // a patch must not land on an occupied instance slot, same rule the
        // SQLite index enforces on write
        if let (Some(template_id), Some(due_date)) = (updated.template_id, updated.due_date) {
            let taken = inner.tasks.values().any(|t| {
                t.id != id && t.template_id == Some(template_id) && t.due_date == Some(due_date)
            });
            if taken {
                return Err(TaskError::Conflict {
                    template_id,
                    due_date,
                });
            }
        }

        inner.tasks.insert(id, updated.clone());
        Ok(updated)
    }

    async fn delete_task(&self, id: TaskId) -> Result<(), TaskError> {
        let mut inner = self.inner.lock().unwrap();
        inner.tasks.remove(&id);
        Ok(())
    }

    async fn delete_instances_of_template(&self, template_id: TaskId) -> Result<usize, TaskError> {
        let mut inner = self.inner.lock().unwrap();
        let before = inner.tasks.len();
        inner
            .tasks
            .retain(|_, t| t.is_template || t.template_id != Some(template_id));
        Ok(before - inner.tasks.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    use crate::domain::entities::NewTask;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[tokio::test]
    async fn assigns_increasing_ids() {
        let repo = MemoryTaskRepository::new();
        let a = repo.create_task(NewTask::regular(1, "a")).await.unwrap();
        let b = repo.create_task(NewTask::regular(1, "b")).await.unwrap();
        assert!(b.id > a.id);
    }

    #[tokio::test]
    async fn duplicate_instance_slot_conflicts() {
        let repo = MemoryTaskRepository::new();
        let tpl = repo
            .create_task(NewTask::template(
                1,
                "standup",
                vec![chrono::Weekday::Mon],
                Some(date(2025, 1, 6)),
                None,
            ))
            .await
            .unwrap();

        let first = NewTask::instance_of(&tpl, date(2025, 1, 6));
        repo.create_task(first.clone()).await.unwrap();
        let second = repo.create_task(first).await;
        assert!(matches!(second, Err(TaskError::Conflict { .. })));
    }

    #[tokio::test]
    async fn patching_due_date_onto_occupied_slot_conflicts() {
        let repo = MemoryTaskRepository::new();
        let tpl = repo
            .create_task(NewTask::template(
                1,
                "standup",
                vec![chrono::Weekday::Mon],
                Some(date(2025, 1, 6)),
                None,
            ))
            .await
            .unwrap();
        repo.create_task(NewTask::instance_of(&tpl, date(2025, 1, 6)))
            .await
            .unwrap();
        let second = repo
            .create_task(NewTask::instance_of(&tpl, date(2025, 1, 13)))
            .await
            .unwrap();

        let clash = repo
            .update_task(
                second.id,
                TaskPatch {
                    due_date: Some(Some(date(2025, 1, 6))),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(clash, Err(TaskError::Conflict { .. })));

        // a free slot is still fine
        let moved = repo
            .update_task(
                second.id,
                TaskPatch {
                    due_date: Some(Some(date(2025, 1, 20))),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(moved.due_date, Some(date(2025, 1, 20)));
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let repo = MemoryTaskRepository::new();
        let task = repo.create_task(NewTask::regular(1, "a")).await.unwrap();
        repo.delete_task(task.id).await.unwrap();
        // second delete of the same id still succeeds
        repo.delete_task(task.id).await.unwrap();
    }

    #[tokio::test]
    async fn range_filter_falls_back_to_creation_date() {
        let repo = MemoryTaskRepository::new();
        repo.create_task(NewTask::regular(1, "undated")).await.unwrap();

        let today = chrono::Utc::now().date_naive();
        let hits = repo
            .list_tasks(&TaskFilter::non_templates_in_range(today, today))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);

        let misses = repo
            .list_tasks(&TaskFilter::non_templates_in_range(
                date(2000, 1, 1),
                date(2000, 1, 2),
            ))
            .await
            .unwrap();
        assert!(misses.is_empty());
    }
}
