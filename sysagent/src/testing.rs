//! Helpers for testing tasks and agents.
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::TimeDelta;

use crate::{
    job::{EngineData, JobId},
    scheduler::{ScheduleError, Scheduler},
};

/// Builds an [`EngineData`] map from a `serde_json::json!` object literal.
///
/// # Example
///
/// ```
/// use sysagent::testing::engine_data;
///
/// let params = engine_data(serde_json::json!({"prediction_id": "p1"}));
/// assert_eq!(params.get("prediction_id"), Some(&serde_json::json!("p1")));
/// ```
///
/// # Panics
///
/// Panics if `value` is not a JSON object.
pub fn engine_data(value: serde_json::Value) -> EngineData {
    value
        .as_object()
        .cloned()
        .expect("engine_data requires a JSON object literal")
}

/// A [`Scheduler`] that records every `schedule_once` call instead of firing
/// anything.
///
/// Responses can be scripted with [`RecordingScheduler::respond_with`]; when
/// none are scripted every call succeeds.
#[derive(Clone, Default)]
pub struct RecordingScheduler {
    fires: Arc<Mutex<Vec<ScheduledFire>>>,
    responses: Arc<Mutex<Vec<Result<(), ScheduleError>>>>,
}

/// One recorded `schedule_once` call.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledFire {
    pub delay: TimeDelta,
    pub job_id: JobId,
}

impl RecordingScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts the result of the next `schedule_once` call. Later calls pop
    /// scripted results in reverse order of registration; once exhausted,
    /// calls succeed again.
    pub fn respond_with(&self, result: Result<(), ScheduleError>) {
        self.responses.lock().expect("lock poisoned").push(result);
    }

    pub fn fires(&self) -> Vec<ScheduledFire> {
        self.fires.lock().expect("lock poisoned").clone()
    }

    pub fn fire_count(&self) -> usize {
        self.fires.lock().expect("lock poisoned").len()
    }

    pub fn last_fire(&self) -> Option<ScheduledFire> {
        self.fires.lock().expect("lock poisoned").last().cloned()
    }
}

#[async_trait]
impl Scheduler for RecordingScheduler {
    async fn schedule_once(&self, delay: TimeDelta, job_id: JobId) -> Result<(), ScheduleError> {
        let response = self
            .responses
            .lock()
            .expect("lock poisoned")
            .pop()
            .unwrap_or(Ok(()));
        if response.is_ok() {
            self.fires
                .lock()
                .expect("lock poisoned")
                .push(ScheduledFire { delay, job_id });
        }
        response
    }
}

/// Asserts against the calls recorded by a [`RecordingScheduler`].
///
/// # Example
///
/// ```
/// use chrono::TimeDelta;
/// use sysagent::assert_scheduled;
/// use sysagent::job::JobId;
/// use sysagent::scheduler::Scheduler;
/// use sysagent::testing::RecordingScheduler;
///
/// # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
/// let scheduler = RecordingScheduler::new();
/// scheduler
///     .schedule_once(TimeDelta::seconds(5), JobId::from(1))
///     .await
///     .unwrap();
///
/// assert_scheduled!(to: scheduler, job: JobId::from(1));
/// assert_scheduled!(to: scheduler, job: JobId::from(1), after: TimeDelta::seconds(5));
/// # });
/// ```
#[macro_export]
macro_rules! assert_scheduled {
    (nothing to: $scheduler:expr) => {
        assert!(
            $scheduler.fires().is_empty(),
            "expected no scheduled fires, found {:?}",
            $scheduler.fires()
        );
    };
    (to: $scheduler:expr, job: $job_id:expr) => {
        assert!(
            $scheduler.fires().iter().any(|fire| fire.job_id == $job_id),
            "no fire recorded for {}, recorded: {:?}",
            $job_id,
            $scheduler.fires()
        );
    };
    (to: $scheduler:expr, job: $job_id:expr, after: $delay:expr) => {
        assert!(
            $scheduler
                .fires()
                .iter()
                .any(|fire| fire.job_id == $job_id && fire.delay == $delay),
            "no fire recorded for {} after {}, recorded: {:?}",
            $job_id,
            $delay,
            $scheduler.fires()
        );
    };
}
