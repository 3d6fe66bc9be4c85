pub mod config;
pub mod scheduler;

pub use scheduler::{Scheduler, SchedulerHandle, SchedulerJob};
