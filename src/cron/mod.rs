//! Periodic background jobs.

mod jobs;
mod scheduler;

pub use scheduler::CronScheduler;
