pub mod clock;
pub mod entities;
pub mod errors;
pub mod repositories;
pub mod value_objects;

pub use clock::{Clock, FixedClock, SystemClock};
pub use entities::task::{NewTask, Priority, Task, TaskId, TaskPatch, TaskRole};
pub use errors::TaskError;
pub use repositories::{TaskFilter, TaskRepository};
