//! The persisted job model shared by the agent, stores, and tasks.
use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub(crate) mod runner;

/// The key under which a job's task type is recorded in its engine data.
pub const TASK_TYPE_KEY: &str = "task_type";

/// The key under which a failure reason is recorded in a job's engine data.
pub const ERROR_KEY: &str = "error";

/// The open key-value scratch map carried by every job.
///
/// Task parameters are passed through it unchanged, the engine records its
/// retry bookkeeping in it (see [`RetryState`]), and task results are merged
/// into it on completion. Merges are shallow: top-level keys are replaced
/// wholesale.
pub type EngineData = serde_json::Map<String, Value>;

#[derive(Debug, Eq, PartialEq, Hash, Clone, Copy, Serialize, Deserialize)]
pub struct JobId(i64);

impl From<i64> for JobId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<JobId> for i64 {
    fn from(value: JobId) -> Self {
        value.0
    }
}

impl Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "JobId({})", self.0)
    }
}

/// A persisted unit of async work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub status: JobStatus,
    pub engine_data: EngineData,
    pub inserted_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// The task type recorded at schedule time, if any.
    pub fn task_type(&self) -> Option<&str> {
        self.engine_data.get(TASK_TYPE_KEY).and_then(Value::as_str)
    }

    /// The failure reason recorded by the last failed transition, if any.
    pub fn error(&self) -> Option<&str> {
        self.engine_data.get(ERROR_KEY).and_then(Value::as_str)
    }

    /// The retry bookkeeping currently recorded in the job's engine data.
    pub fn retry_state(&self) -> RetryState {
        RetryState::read(&self.engine_data)
    }
}

/// Status of a [`Job`].
///
/// Transitions are forward-only: `Pending → Processing → {Completed, Failed}`,
/// with `Processing` re-entered any number of times via rescheduling. The
/// engine itself never sets `Waiting`; it is reserved for gate steps layered
/// on top of the job table.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Waiting,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Waiting => "waiting",
        };
        write!(f, "{status}")
    }
}

/// The minimal typed view of the retry bookkeeping keys in a job's engine
/// data.
///
/// Only the shared reschedule protocol writes these keys; tasks observe them
/// read-only through the params passed to their `execute`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetryState {
    /// Number of reschedules performed so far. Monotonically non-decreasing.
    pub attempts: u32,
    /// The bounded-attempt cap recorded for this job, once known.
    pub max_attempts: Option<u32>,
    /// When the job was last rescheduled.
    pub last_attempt: Option<DateTime<Utc>>,
}

impl RetryState {
    pub const ATTEMPTS_KEY: &'static str = "attempts";
    pub const MAX_ATTEMPTS_KEY: &'static str = "max_attempts";
    pub const LAST_ATTEMPT_KEY: &'static str = "last_attempt";

    /// Reads the retry keys out of `data`, defaulting missing or malformed
    /// values to their zero state.
    pub fn read(data: &EngineData) -> Self {
        let attempts = data
            .get(Self::ATTEMPTS_KEY)
            .and_then(Value::as_u64)
            .and_then(|raw| u32::try_from(raw).ok())
            .unwrap_or(0);
        let max_attempts = data
            .get(Self::MAX_ATTEMPTS_KEY)
            .and_then(Value::as_u64)
            .and_then(|raw| u32::try_from(raw).ok());
        let last_attempt = data
            .get(Self::LAST_ATTEMPT_KEY)
            .and_then(Value::as_str)
            .and_then(|raw| raw.parse().ok());
        Self {
            attempts,
            max_attempts,
            last_attempt,
        }
    }

    /// Renders the state as a shallow engine-data patch.
    pub fn into_patch(self) -> EngineData {
        let mut patch = EngineData::new();
        patch.insert(Self::ATTEMPTS_KEY.to_owned(), self.attempts.into());
        if let Some(max_attempts) = self.max_attempts {
            patch.insert(Self::MAX_ATTEMPTS_KEY.to_owned(), max_attempts.into());
        }
        if let Some(last_attempt) = self.last_attempt {
            patch.insert(
                Self::LAST_ATTEMPT_KEY.to_owned(),
                Value::String(last_attempt.to_rfc3339()),
            );
        }
        patch
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    fn data(value: Value) -> EngineData {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn retry_state_defaults_when_keys_absent() {
        let state = RetryState::read(&data(json!({"task_type": "noop"})));
        assert_eq!(state.attempts, 0);
        assert_eq!(state.max_attempts, None);
        assert_eq!(state.last_attempt, None);
    }

    #[test]
    fn retry_state_round_trips_through_engine_data() {
        let now = Utc::now();
        let state = RetryState {
            attempts: 3,
            max_attempts: Some(24),
            last_attempt: Some(now),
        };
        let read = RetryState::read(&state.clone().into_patch());
        assert_eq!(read.attempts, 3);
        assert_eq!(read.max_attempts, Some(24));
        assert_eq!(read.last_attempt.unwrap().timestamp(), now.timestamp());
    }

    #[test]
    fn malformed_attempts_read_as_zero() {
        let state = RetryState::read(&data(json!({"attempts": "three"})));
        assert_eq!(state.attempts, 0);
    }

    #[test]
    fn out_of_range_values_read_as_zero_state() {
        let state = RetryState::read(&data(json!({
            "attempts": 5_000_000_000_u64,
            "max_attempts": 5_000_000_000_u64,
        })));
        assert_eq!(state.attempts, 0);
        assert_eq!(state.max_attempts, None);
    }

    #[test]
    fn status_display_matches_serde_representation() {
        for status in [
            JobStatus::Pending,
            JobStatus::Processing,
            JobStatus::Completed,
            JobStatus::Failed,
            JobStatus::Waiting,
        ] {
            let serialized = serde_json::to_value(status).unwrap();
            assert_eq!(serialized, json!(status.to_string()));
        }
    }

    #[test]
    fn terminal_statuses() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
        assert!(!JobStatus::Waiting.is_terminal());
    }
}
