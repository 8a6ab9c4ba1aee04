pub mod services;

pub use services::{DeletePolicy, Granularity, RecurrenceScheduler, TaskService};
