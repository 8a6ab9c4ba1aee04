use chrono::NaiveDate;
use thiserror::Error;

use crate::domain::entities::TaskId;

/// Error taxonomy shared by the services and the storage backends.
///
/// `Conflict` is not an error from the scheduler's point of view: it is how a
/// backend reports that an instance for a `(template, due date)` slot already
/// exists, and callers materializing instances treat it as "already there".
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("task {0} not found")]
    NotFound(TaskId),

    #[error("invalid task data: {0}")]
    Validation(String),

    #[error("template {template_id} already has an instance due {due_date}")]
    Conflict {
        template_id: TaskId,
        due_date: NaiveDate,
    },

    #[error("storage failure: {0}")]
    Storage(String),
}

impl TaskError {
    pub fn validation(msg: impl Into<String>) -> Self {
        TaskError::Validation(msg.into())
    }

    pub fn storage(err: impl ToString) -> Self {
        TaskError::Storage(err.to_string())
    }
}
