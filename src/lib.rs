//! Personal task manager core: one-off tasks plus recurring "template" tasks
//! whose concrete instances are materialized on demand when a calendar window
//! is queried.

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod utils;
