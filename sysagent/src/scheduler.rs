//! The dispatch seam: a [`Scheduler`] fires a job's dispatch entry point once
//! after a delay.
//!
//! The engine never implements timing itself; it asks the scheduler to fire
//! and reacts when [`crate::SystemAgent::handle_task`] is invoked for the job
//! id. [`local::LocalScheduler`] provides an in-process implementation; a
//! deployment may instead bridge to an external cron-like dispatcher.
use async_trait::async_trait;
use chrono::TimeDelta;
use thiserror::Error;

use crate::job::JobId;

pub mod local;

#[async_trait]
pub trait Scheduler: Send + Sync {
    /// Arranges for the dispatch entry point to be invoked once with `job_id`
    /// after `delay`.
    ///
    /// An error here is a hard failure path: during rescheduling it forces
    /// the job into its failed state rather than leaving it stuck without a
    /// future wake-up.
    async fn schedule_once(&self, delay: TimeDelta, job_id: JobId) -> Result<(), ScheduleError>;
}

#[derive(Debug, Clone, Error)]
pub enum ScheduleError {
    #[error("scheduling backend is unavailable")]
    Unavailable,
    #[error("dispatcher has stopped")]
    Stopped,
}
