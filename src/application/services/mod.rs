pub mod scheduler_service;
pub mod task_service;

pub use scheduler_service::{DeletePolicy, Granularity, RecurrenceScheduler};
pub use task_service::TaskService;
