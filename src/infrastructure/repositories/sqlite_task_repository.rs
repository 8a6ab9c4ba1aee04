use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc, Weekday};
use rusqlite::{params, Connection, OptionalExtension};

use crate::domain::entities::{NewTask, Priority, Task, TaskId, TaskPatch};
use crate::domain::errors::TaskError;
use crate::domain::repositories::{TaskFilter, TaskRepository};
use crate::domain::value_objects::repeat_days::{from_sunday_index, to_sunday_index};

/// SQLite-backed task store. Blocking rusqlite work runs on the blocking
/// pool; the partial unique index on `(template_id, due_date)` is what makes
/// instance materialization race-safe.
pub struct SqliteTaskRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteTaskRepository {
    pub fn new(path: &str) -> Result<Self, TaskError> {
        let conn = Connection::open(path).map_err(TaskError::storage)?;
        Self::with_connection(conn)
    }

    /// Private in-memory database, for tests.
    pub fn new_in_memory() -> Result<Self, TaskError> {
        let conn = Connection::open_in_memory().map_err(TaskError::storage)?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, TaskError> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS tasks (
                id            INTEGER PRIMARY KEY,
                user_id       INTEGER NOT NULL,
                title         TEXT NOT NULL,
                is_complete   INTEGER NOT NULL DEFAULT 0,
                inserted_at   INTEGER NOT NULL,
                due_date      TEXT,
                completed_at  INTEGER,
                priority      TEXT NOT NULL,
                notes         TEXT,
                tags          TEXT NOT NULL,
                is_repeating  INTEGER NOT NULL DEFAULT 0,
                repeat_days   TEXT NOT NULL,
                repeat_until  TEXT,
                template_id   INTEGER,
                is_template   INTEGER NOT NULL DEFAULT 0
            );
            CREATE UNIQUE INDEX IF NOT EXISTS idx_tasks_template_due
                ON tasks(template_id, due_date) WHERE template_id IS NOT NULL;
            ",
        )
        .map_err(TaskError::storage)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn row_to_task(row: &rusqlite::Row) -> Result<Task, TaskError> {
        let id: i64 = row.get("id").map_err(TaskError::storage)?;
        let user_id: i64 = row.get("user_id").map_err(TaskError::storage)?;
        let title: String = row.get("title").map_err(TaskError::storage)?;
        let is_complete: bool = row.get("is_complete").map_err(TaskError::storage)?;

        let inserted_ts: i64 = row.get("inserted_at").map_err(TaskError::storage)?;
        let inserted_at = Utc
            .timestamp_opt(inserted_ts, 0)
            .single()
            .ok_or_else(|| TaskError::storage(format!("bad inserted_at {inserted_ts}")))?;

        let completed_ts: Option<i64> = row.get("completed_at").map_err(TaskError::storage)?;
        let completed_at = match completed_ts {
            Some(ts) => Some(
                Utc.timestamp_opt(ts, 0)
                    .single()
                    .ok_or_else(|| TaskError::storage(format!("bad completed_at {ts}")))?,
            ),
            None => None,
        };

        let due_date = Self::column_date(row, "due_date")?;
        let repeat_until = Self::column_date(row, "repeat_until")?;

        let priority_str: String = row.get("priority").map_err(TaskError::storage)?;
        let priority = Priority::parse(&priority_str)
            .ok_or_else(|| TaskError::storage(format!("bad priority '{priority_str}'")))?;

        let notes: Option<String> = row.get("notes").map_err(TaskError::storage)?;

        let tags_json: String = row.get("tags").map_err(TaskError::storage)?;
        let tags: Vec<String> = serde_json::from_str(&tags_json).map_err(TaskError::storage)?;

        let days_json: String = row.get("repeat_days").map_err(TaskError::storage)?;
        let day_indices: Vec<u8> = serde_json::from_str(&days_json).map_err(TaskError::storage)?;
        let repeat_days: Vec<Weekday> = day_indices
            .into_iter()
            .map(|i| {
                from_sunday_index(i)
                    .ok_or_else(|| TaskError::storage(format!("bad weekday index {i}")))
            })
            .collect::<Result<_, _>>()?;

        let is_repeating: bool = row.get("is_repeating").map_err(TaskError::storage)?;
        let template_id: Option<i64> = row.get("template_id").map_err(TaskError::storage)?;
        let is_template: bool = row.get("is_template").map_err(TaskError::storage)?;

        Ok(Task {
            id: id as TaskId,
            user_id: user_id as u64,
            title,
            is_complete,
            inserted_at,
            due_date,
            completed_at,
            priority,
            notes,
            tags,
            is_repeating,
            repeat_days,
            repeat_until,
            template_id: template_id.map(|v| v as TaskId),
            is_template,
        })
    }

    fn column_date(row: &rusqlite::Row, name: &str) -> Result<Option<NaiveDate>, TaskError> {
        let raw: Option<String> = row.get(name).map_err(TaskError::storage)?;
        match raw {
            Some(s) => NaiveDate::parse_from_str(&s, "%Y-%m-%d")
                .map(Some)
                .map_err(|e| TaskError::storage(format!("bad {name} '{s}': {e}"))),
            None => Ok(None),
        }
    }

    fn days_to_json(days: &[Weekday]) -> Result<String, TaskError> {
        let indices: Vec<u8> = days.iter().map(|d| to_sunday_index(*d)).collect();
        serde_json::to_string(&indices).map_err(TaskError::storage)
    }

    fn write_task(conn: &Connection, task: &Task, insert: bool) -> Result<(), TaskError> {
        let tags_json = serde_json::to_string(&task.tags).map_err(TaskError::storage)?;
        let days_json = Self::days_to_json(&task.repeat_days)?;
        let due = task.due_date.map(|d| d.format("%Y-%m-%d").to_string());
        let until = task.repeat_until.map(|d| d.format("%Y-%m-%d").to_string());

        let sql = if insert {
            "INSERT INTO tasks (
                id, user_id, title, is_complete, inserted_at, due_date,
                completed_at, priority, notes, tags,
                is_repeating, repeat_days, repeat_until, template_id, is_template
             )
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)"
        } else {
            "UPDATE tasks SET
                user_id = ?2,
                title = ?3,
                is_complete = ?4,
                inserted_at = ?5,
                due_date = ?6,
                completed_at = ?7,
                priority = ?8,
                notes = ?9,
                tags = ?10,
                is_repeating = ?11,
                repeat_days = ?12,
                repeat_until = ?13,
                template_id = ?14,
                is_template = ?15
             WHERE id = ?1"
        };

        conn.execute(
            sql,
            params![
                task.id as i64,
                task.user_id as i64,
                task.title,
                task.is_complete,
                task.inserted_at.timestamp(),
                due,
                task.completed_at.map(|t| t.timestamp()),
                task.priority.as_str(),
                task.notes,
                tags_json,
                task.is_repeating,
                days_json,
                until,
                task.template_id.map(|v| v as i64),
                task.is_template,
            ],
        )
        .map_err(|e| Self::map_sqlite_error(e, task))?;

        Ok(())
    }

    fn map_sqlite_error(err: rusqlite::Error, task: &Task) -> TaskError {
        if let rusqlite::Error::SqliteFailure(e, _) = &err {
            if e.code == rusqlite::ErrorCode::ConstraintViolation {
                if let (Some(template_id), Some(due_date)) = (task.template_id, task.due_date) {
                    return TaskError::Conflict {
                        template_id,
                        due_date,
                    };
                }
            }
        }
        TaskError::storage(err)
    }
}

#[async_trait]
impl TaskRepository for SqliteTaskRepository {
    async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>, TaskError> {
        let conn = self.conn.clone();
        let filter = filter.clone();

        tokio::task::spawn_blocking(move || -> Result<Vec<Task>, TaskError> {
            let conn_lock = conn.lock().unwrap();
            let mut stmt = conn_lock
                .prepare("SELECT * FROM tasks ORDER BY id")
                .map_err(TaskError::storage)?;

            let mut rows = stmt.query([]).map_err(TaskError::storage)?;
            let mut tasks = Vec::new();
            while let Some(row) = rows.next().map_err(TaskError::storage)? {
                let task = Self::row_to_task(row)?;
                if filter.matches(&task) {
                    tasks.push(task);
                }
            }
            Ok(tasks)
        })
        .await
        .map_err(TaskError::storage)?
    }

    async fn get_task(&self, id: TaskId) -> Result<Option<Task>, TaskError> {
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || -> Result<Option<Task>, TaskError> {
            let conn_lock = conn.lock().unwrap();
            let mut stmt = conn_lock
                .prepare("SELECT * FROM tasks WHERE id = ?1")
                .map_err(TaskError::storage)?;

            let mut rows = stmt
                .query(params![id as i64])
                .map_err(TaskError::storage)?;
            match rows.next().map_err(TaskError::storage)? {
                Some(row) => Ok(Some(Self::row_to_task(row)?)),
                None => Ok(None),
            }
        })
        .await
        .map_err(TaskError::storage)?
    }

    async fn create_task(&self, draft: NewTask) -> Result<Task, TaskError> {
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || -> Result<Task, TaskError> {
            let conn_lock = conn.lock().unwrap();

            let max_id: Option<i64> = conn_lock
                .query_row("SELECT MAX(id) FROM tasks", [], |row| row.get(0))
                .map_err(TaskError::storage)?;
            let id = max_id.unwrap_or(0) as TaskId + 1;

            // second precision, so the stored and returned timestamps agree
            let now = Utc
                .timestamp_opt(Utc::now().timestamp(), 0)
                .single()
                .unwrap_or_else(Utc::now);

            let task = draft.into_task(id, now);
            Self::write_task(&conn_lock, &task, true)?;
            Ok(task)
        })
        .await
        .map_err(TaskError::storage)?
    }

    async fn update_task(&self, id: TaskId, patch: TaskPatch) -> Result<Task, TaskError> {
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || -> Result<Task, TaskError> {
            let conn_lock = conn.lock().unwrap();
            let mut stmt = conn_lock
                .prepare("SELECT * FROM tasks WHERE id = ?1")
                .map_err(TaskError::storage)?;

            let mut task = stmt
                .query_row(params![id as i64], |row| {
                    Ok(Self::row_to_task(row))
                })
                .optional()
                .map_err(TaskError::storage)?
                .ok_or(TaskError::NotFound(id))??;
            drop(stmt);

            task.apply(patch);
            Self::write_task(&conn_lock, &task, false)?;
            Ok(task)
        })
        .await
        .map_err(TaskError::storage)?
    }

    async fn delete_task(&self, id: TaskId) -> Result<(), TaskError> {
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || -> Result<(), TaskError> {
            let conn_lock = conn.lock().unwrap();
            conn_lock
                .execute("DELETE FROM tasks WHERE id = ?1", params![id as i64])
                .map_err(TaskError::storage)?;
            Ok(())
        })
        .await
        .map_err(TaskError::storage)?
    }

    async fn delete_instances_of_template(&self, template_id: TaskId) -> Result<usize, TaskError> {
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || -> Result<usize, TaskError> {
            let conn_lock = conn.lock().unwrap();
            let removed = conn_lock
                .execute(
                    "DELETE FROM tasks WHERE template_id = ?1 AND is_template = 0",
                    params![template_id as i64],
                )
                .map_err(TaskError::storage)?;
            Ok(removed)
        })
        .await
        .map_err(TaskError::storage)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Weekday;

    use crate::domain::entities::NewTask;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[tokio::test]
    async fn round_trips_a_full_record() {
        let repo = SqliteTaskRepository::new_in_memory().unwrap();
        let draft = NewTask::template(
            42,
            "water plants",
            vec![Weekday::Tue, Weekday::Sat],
            Some(date(2025, 2, 4)),
            Some(date(2025, 6, 1)),
        )
        .with_notes("the ficus too")
        .with_tags(vec!["home".into(), "plants".into()]);

        let created = repo.create_task(draft).await.unwrap();
        let fetched = repo.get_task(created.id).await.unwrap().unwrap();

        assert_eq!(fetched.title, "water plants");
        assert_eq!(fetched.user_id, 42);
        assert_eq!(fetched.repeat_days, vec![Weekday::Tue, Weekday::Sat]);
        assert_eq!(fetched.due_date, Some(date(2025, 2, 4)));
        assert_eq!(fetched.repeat_until, Some(date(2025, 6, 1)));
        assert_eq!(fetched.tags, vec!["home", "plants"]);
        assert_eq!(fetched.notes.as_deref(), Some("the ficus too"));
        assert!(fetched.is_template);
        assert_eq!(fetched.inserted_at, created.inserted_at);
    }

    #[tokio::test]
    async fn unique_index_reports_conflict() {
        let repo = SqliteTaskRepository::new_in_memory().unwrap();
        let tpl = repo
            .create_task(NewTask::template(
                1,
                "standup",
                vec![Weekday::Mon],
                Some(date(2025, 1, 6)),
                None,
            ))
            .await
            .unwrap();

        repo.create_task(NewTask::instance_of(&tpl, date(2025, 1, 6)))
            .await
            .unwrap();
        let dup = repo
            .create_task(NewTask::instance_of(&tpl, date(2025, 1, 6)))
            .await;
        assert!(matches!(dup, Err(TaskError::Conflict { .. })));
    }

    #[tokio::test]
    async fn update_missing_task_is_not_found() {
        let repo = SqliteTaskRepository::new_in_memory().unwrap();
        let res = repo.update_task(99, TaskPatch::default()).await;
        assert!(matches!(res, Err(TaskError::NotFound(99))));
    }

    #[tokio::test]
    async fn cascade_delete_spares_the_template() {
        let repo = SqliteTaskRepository::new_in_memory().unwrap();
        let tpl = repo
            .create_task(NewTask::template(
                1,
                "standup",
                vec![Weekday::Mon],
                Some(date(2025, 1, 6)),
                None,
            ))
            .await
            .unwrap();
        repo.create_task(NewTask::instance_of(&tpl, date(2025, 1, 6)))
            .await
            .unwrap();
        repo.create_task(NewTask::instance_of(&tpl, date(2025, 1, 13)))
            .await
            .unwrap();

        let removed = repo.delete_instances_of_template(tpl.id).await.unwrap();
        assert_eq!(removed, 2);
        assert!(repo.get_task(tpl.id).await.unwrap().is_some());
    }
}
