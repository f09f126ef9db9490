//! An async task engine with bounded retries.
//!
//! A [`SystemAgent`] accepts task submissions, persists them as jobs in a
//! pluggable [`store::JobStore`], and arms a pluggable
//! [`scheduler::Scheduler`] to fire the dispatch entry point. When a dispatch
//! fires, the agent resolves the job's task type through its registry, runs
//! the [`task::Task`], and applies the resulting transition: complete, fail,
//! or reschedule with a monotonically counted, bounded number of attempts.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use sysagent::prelude::*;
//!
//! struct NoopTask;
//!
//! #[async_trait::async_trait]
//! impl Task for NoopTask {
//!     fn task_type(&self) -> &'static str {
//!         "noop"
//!     }
//!
//!     async fn execute(&self, _job_id: JobId, _params: EngineData) -> TaskOutcome {
//!         TaskOutcome::complete(EngineData::new())
//!     }
//! }
//!
//! # tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap().block_on(async {
//! let store = InMemoryStore::new();
//! let (scheduler, fired) = LocalScheduler::new();
//! let agent = Arc::new(SystemAgent::new(store, scheduler).with_task(NoopTask));
//! let dispatcher = Dispatcher::spawn(Arc::clone(&agent), fired);
//!
//! let job_id = agent.schedule_task("noop", EngineData::new()).await.unwrap();
//! # let _ = job_id;
//! dispatcher.graceful_shutdown().await.unwrap();
//! # });
//! ```
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

pub mod job;
pub mod prelude;
pub mod scheduler;
pub mod store;
pub mod task;
pub mod testing;

use chrono::TimeDelta;
use job::{runner::JobRunner, EngineData, JobId, JobStatus, TASK_TYPE_KEY};
use scheduler::{ScheduleError, Scheduler};
use store::{JobStore, StoreError};
use task::{registry::TaskRegistry, Task};

/// The orchestrator: accepts new task submissions and handles fired
/// dispatches.
///
/// Holds its collaborators explicitly; construct one per process and share it
/// (typically behind an [`Arc`]) with whatever invokes scheduler callbacks.
pub struct SystemAgent<S, C> {
    store: S,
    scheduler: C,
    registry: TaskRegistry,
}

impl<S, C> SystemAgent<S, C>
where
    S: JobStore,
    C: Scheduler,
{
    pub fn new(store: S, scheduler: C) -> Self {
        Self {
            store,
            scheduler,
            registry: TaskRegistry::new(),
        }
    }

    /// Registers a task implementation, replacing any previous registration
    /// for the same task type.
    pub fn with_task<T>(mut self, task: T) -> Self
    where
        T: Task + 'static,
    {
        self.registry.register(Arc::new(task));
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Submits a new task: persists a pending job whose engine data is
    /// `params` plus the task type, then asks the scheduler to fire
    /// immediately.
    ///
    /// `task_type` is not checked against the registry here; resolution is
    /// deferred to dispatch time, so registration order and submission order
    /// are independent.
    pub async fn schedule_task(
        &self,
        task_type: impl Into<String>,
        params: EngineData,
    ) -> Result<JobId, AgentError> {
        let task_type = task_type.into();
        let mut engine_data = params;
        engine_data.insert(TASK_TYPE_KEY.to_owned(), Value::String(task_type.clone()));

        let job_id = self.store.create_job(engine_data).await?;
        self.scheduler
            .schedule_once(TimeDelta::zero(), job_id)
            .await?;
        tracing::debug!(%job_id, %task_type, "Scheduled task '{task_type}' as job {job_id}");
        Ok(job_id)
    }

    /// The dispatch entry point, invoked by the scheduler's fire callback.
    ///
    /// Fire-and-forget: every outcome, including internal errors, is recorded
    /// in the job row or the log, never returned to the scheduler. A panic in
    /// the task is converted into a job failure.
    pub async fn handle_task(&self, job_id: JobId) {
        let job = match self.store.get_job(job_id).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                tracing::error!(%job_id, "No job found for dispatched {job_id}, dropping");
                return;
            }
            Err(err) => {
                tracing::error!(?err, %job_id, "Failed to load job {job_id}: {err}");
                return;
            }
        };

        if job.status.is_terminal() {
            tracing::warn!(%job_id, status = %job.status, "Dispatch fired for terminal job {job_id}, ignoring");
            return;
        }

        let runner = JobRunner::new(&self.store, &self.scheduler);
        let Some(task_type) = job.task_type().map(ToOwned::to_owned) else {
            runner
                .fail_job(job_id, None, "Job has no task type".to_owned())
                .await;
            return;
        };
        let Some(task) = self.registry.resolve(&task_type) else {
            runner
                .fail_job(
                    job_id,
                    Some(&task_type),
                    format!("No task registered for type '{task_type}'"),
                )
                .await;
            return;
        };

        if let Err(err) = self.store.update_status(job_id, JobStatus::Processing).await {
            tracing::error!(?err, %job_id, "Failed to mark job {job_id} as processing: {err}");
            return;
        }
        runner.run(task, job).await;
    }
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("error communicating with the job store")]
    Store(#[from] StoreError),
    #[error("failed to schedule job dispatch")]
    Schedule(#[from] ScheduleError),
    #[error("failed to gracefully shut down")]
    GracefulShutdownFailed,
}
