pub mod repositories;

pub use repositories::{MemoryTaskRepository, SqliteTaskRepository};
