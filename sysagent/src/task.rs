//! The task contract: a pluggable implementation of one kind of async work.
use async_trait::async_trait;
use chrono::TimeDelta;

use crate::job::{EngineData, JobId};

pub mod registry;

/// Cap applied to rescheduling when neither the job nor the task supplies one.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 24;

/// Delay used by [`TaskOutcome::reschedule`].
pub const DEFAULT_RESCHEDULE_DELAY: TimeDelta = TimeDelta::seconds(10);

/// One kind of async work, identified by a stable type string.
///
/// Implementations do their domain work in [`Task::execute`] and report how
/// the invocation ended through the returned [`TaskOutcome`]. The engine owns
/// everything else: status transitions, attempt counting, and re-arming the
/// scheduler.
#[async_trait]
pub trait Task: Send + Sync {
    /// Stable identifier used for registry lookup.
    ///
    /// This is persisted in job rows, so it should survive renames of the
    /// implementing Rust type and be unique across all registered tasks.
    fn task_type(&self) -> &'static str;

    /// The bounded-attempt cap for jobs of this task, used until the job has
    /// one recorded in its engine data (which happens on its first
    /// reschedule).
    fn max_attempts(&self) -> u32 {
        DEFAULT_MAX_ATTEMPTS
    }

    /// Performs one invocation of the work for `job_id`.
    ///
    /// `params` is the job's current engine data: the caller-supplied
    /// parameters plus any accumulated bookkeeping and previously merged
    /// results.
    async fn execute(&self, job_id: JobId, params: EngineData) -> TaskOutcome;
}

/// How a single [`Task::execute`] invocation ended.
///
/// Every invocation ends in exactly one of these; the type makes it
/// impossible to leave a job stuck in `processing` with no scheduled wake-up
/// the way an early return from a side-effecting helper protocol could.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    /// Terminal success: `result` is shallow-merged into the job's engine
    /// data and the job becomes `completed`.
    Complete { result: EngineData },
    /// Terminal failure: `reason` is recorded and the job becomes `failed`.
    /// Not retried, use this for errors another attempt cannot fix.
    Fail { reason: String },
    /// Ask the scheduler to fire this job again after `delay`, subject to the
    /// bounded-attempt cap.
    Reschedule { delay: TimeDelta },
}

impl TaskOutcome {
    pub fn complete(result: EngineData) -> Self {
        Self::Complete { result }
    }

    pub fn fail(reason: impl Into<String>) -> Self {
        Self::Fail {
            reason: reason.into(),
        }
    }

    /// Reschedule after the default delay of 10 seconds.
    pub fn reschedule() -> Self {
        Self::Reschedule {
            delay: DEFAULT_RESCHEDULE_DELAY,
        }
    }

    pub fn reschedule_in(delay: TimeDelta) -> Self {
        Self::Reschedule { delay }
    }
}
