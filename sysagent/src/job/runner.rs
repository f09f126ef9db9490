use std::sync::Arc;

use chrono::{TimeDelta, Utc};
use serde_json::Value;
use tokio::task::JoinError;

use crate::{
    job::{EngineData, Job, JobId, JobStatus, ERROR_KEY, TASK_TYPE_KEY},
    scheduler::Scheduler,
    store::{JobStore, StoreError},
    task::{Task, TaskOutcome},
};

/// Runs one dispatch of a job's task and applies the resulting transition.
///
/// The three transitions (complete, fail, reschedule) live here rather than
/// on individual tasks so that attempt counting and the bounded-retry
/// termination are uniform across heterogeneous task types.
pub(crate) struct JobRunner<'a, S, C> {
    store: &'a S,
    scheduler: &'a C,
}

impl<'a, S, C> JobRunner<'a, S, C>
where
    S: JobStore,
    C: Scheduler,
{
    pub(crate) fn new(store: &'a S, scheduler: &'a C) -> Self {
        Self { store, scheduler }
    }

    /// Executes `task` for `job` on a spawned tokio task and applies the
    /// outcome. A panic inside the task is unwound into a job failure rather
    /// than escaping the dispatch callback.
    pub(crate) async fn run(&self, task: Arc<dyn Task>, job: Job) {
        let job_id = job.id;
        let task_type = task.task_type();
        let default_max_attempts = task.max_attempts();

        tracing::debug!(%job_id, task_type, "Executing job {job_id}");
        let handle = tokio::spawn({
            let task = Arc::clone(&task);
            let params = job.engine_data;
            async move { task.execute(job_id, params).await }
        });

        match handle.await {
            Ok(TaskOutcome::Complete { result }) => self.complete_job(job_id, result).await,
            Ok(TaskOutcome::Fail { reason }) => {
                self.fail_job(job_id, Some(task_type), reason).await
            }
            Ok(TaskOutcome::Reschedule { delay }) => {
                self.reschedule(job_id, task_type, default_max_attempts, delay)
                    .await
            }
            Err(join_error) => {
                self.fail_job(job_id, Some(task_type), panic_message(join_error))
                    .await
            }
        }
    }

    /// Terminal success: shallow-merges `result` into the job's engine data
    /// and marks it completed. Pre-existing keys not named in `result` are
    /// preserved.
    pub(crate) async fn complete_job(&self, job_id: JobId, result: EngineData) {
        let outcome: Result<(), StoreError> = async {
            self.store.merge_engine_data(job_id, result).await?;
            self.store.update_status(job_id, JobStatus::Completed).await
        }
        .await;
        match outcome {
            Ok(()) => tracing::info!(%job_id, "Job {job_id} completed"),
            Err(err) => {
                tracing::error!(?err, %job_id, "Failed to mark job {job_id} as completed: {err}")
            }
        }
    }

    /// Terminal failure: records the reason alongside the task type and marks
    /// the job failed.
    pub(crate) async fn fail_job(&self, job_id: JobId, task_type: Option<&str>, reason: String) {
        tracing::error!(%job_id, task_type, "Job {job_id} failed: {reason}");
        let mut patch = EngineData::new();
        patch.insert(ERROR_KEY.to_owned(), Value::String(reason));
        patch.insert(
            "failed_at".to_owned(),
            Value::String(Utc::now().to_rfc3339()),
        );
        if let Some(task_type) = task_type {
            patch.insert(TASK_TYPE_KEY.to_owned(), Value::String(task_type.to_owned()));
        }
        let outcome: Result<(), StoreError> = async {
            self.store.merge_engine_data(job_id, patch).await?;
            self.store.update_status(job_id, JobStatus::Failed).await
        }
        .await;
        if let Err(err) = outcome {
            tracing::error!(?err, %job_id, "Failed to mark job {job_id} as failed: {err}");
        }
    }

    /// The bounded-retry protocol: increment the attempt counter, enforce the
    /// cap, and re-arm the scheduler. The job stays in `processing` until a
    /// terminal transition.
    async fn reschedule(
        &self,
        job_id: JobId,
        task_type: &str,
        default_max_attempts: u32,
        delay: TimeDelta,
    ) {
        let job = match self.store.get_job(job_id).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                tracing::error!(%job_id, "Job {job_id} not found for rescheduling");
                return;
            }
            Err(err) => {
                tracing::error!(?err, %job_id, "Failed to load job {job_id} for rescheduling: {err}");
                return;
            }
        };

        let mut retry = job.retry_state();
        let attempts = retry.attempts + 1;
        let max_attempts = retry.max_attempts.unwrap_or(default_max_attempts);
        if attempts > max_attempts {
            self.fail_job(
                job_id,
                Some(task_type),
                format!("Task exceeded maximum attempts ({max_attempts})"),
            )
            .await;
            return;
        }

        retry.attempts = attempts;
        retry.max_attempts = Some(max_attempts);
        retry.last_attempt = Some(Utc::now());
        if let Err(err) = self.store.merge_engine_data(job_id, retry.into_patch()).await {
            tracing::error!(?err, %job_id, "Failed to record attempt for job {job_id}: {err}");
            return;
        }

        match self.scheduler.schedule_once(delay, job_id).await {
            Ok(()) => {
                tracing::debug!(
                    %job_id,
                    attempt = attempts,
                    max_attempts,
                    "Job {job_id} rescheduled in {delay}"
                )
            }
            Err(err) => {
                self.fail_job(
                    job_id,
                    Some(task_type),
                    format!("Scheduler not available for rescheduling: {err}"),
                )
                .await
            }
        }
    }
}

fn panic_message(join_error: JoinError) -> String {
    let msg = join_error.to_string();
    match join_error.try_into_panic() {
        Ok(panic) => panic
            .downcast_ref::<&str>()
            .map(ToString::to_string)
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or(msg),
        Err(_) => msg,
    }
}
