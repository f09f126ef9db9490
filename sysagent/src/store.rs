//! The persistence seam: jobs live in a [`JobStore`].
//!
//! The engine treats the store as an abstract row store: it creates jobs,
//! loads them by id, flips their status, and shallow-merges patches into
//! their engine data. Locking, retention, and querying are store-internal
//! concerns.
use async_trait::async_trait;
use thiserror::Error;

use crate::job::{EngineData, Job, JobId, JobStatus};

pub mod memory;

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persists a new job with status [`JobStatus::Pending`] and the given
    /// engine data, returning its assigned id.
    async fn create_job(&self, engine_data: EngineData) -> Result<JobId, StoreError>;

    async fn get_job(&self, id: JobId) -> Result<Option<Job>, StoreError>;

    /// Updates a job's status. Implementations set `completed_at` /
    /// `failed_at` when the new status is terminal.
    async fn update_status(&self, id: JobId, status: JobStatus) -> Result<(), StoreError>;

    /// Shallow top-level merge of `patch` into the job's engine data: keys in
    /// `patch` replace identically-named keys wholesale, all other keys are
    /// preserved.
    ///
    /// There is no compare-and-swap here: concurrent merges for the same job
    /// are last-write-wins. The engine schedules at most one in-flight
    /// invocation per job, so this only matters if an external scheduler
    /// double-fires.
    async fn merge_engine_data(&self, id: JobId, patch: EngineData) -> Result<(), StoreError>;
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no job found with id {0}")]
    JobNotFound(JobId),
    #[error("error encoding or decoding engine data")]
    EncodeDecode(#[from] serde_json::Error),
    #[error("job store in bad state")]
    BadState,
}
