//! Provides an in memory implementation of [`JobStore`].
//!
//! It is a correct (but not optimized) implementation primarily intended for
//! tests and single-process deployments without a database.
use std::sync::{
    atomic::{AtomicI64, Ordering},
    Arc, RwLock,
};

use async_trait::async_trait;
use chrono::Utc;

use super::{JobStore, StoreError};
use crate::job::{EngineData, Job, JobId, JobStatus};

/// An in memory implementation of [`JobStore`] backed by a row vector behind
/// an `RwLock`.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    jobs: Arc<RwLock<Vec<Job>>>,
    id_counter: Arc<AtomicI64>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every job currently in the store, mostly useful in tests.
    pub fn all_jobs(&self) -> Result<Vec<Job>, StoreError> {
        Ok(self
            .jobs
            .read()
            .map_err(|_| StoreError::BadState)?
            .clone())
    }
}

#[async_trait]
impl JobStore for InMemoryStore {
    async fn create_job(&self, engine_data: EngineData) -> Result<JobId, StoreError> {
        let id = JobId::from(self.id_counter.fetch_add(1, Ordering::SeqCst));
        self.jobs
            .write()
            .map_err(|_| StoreError::BadState)?
            .push(Job {
                id,
                status: JobStatus::Pending,
                engine_data,
                inserted_at: Utc::now(),
                completed_at: None,
                failed_at: None,
            });
        Ok(id)
    }

    async fn get_job(&self, id: JobId) -> Result<Option<Job>, StoreError> {
        Ok(self
            .jobs
            .read()
            .map_err(|_| StoreError::BadState)?
            .iter()
            .find(|job| job.id == id)
            .cloned())
    }

    async fn update_status(&self, id: JobId, status: JobStatus) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write().map_err(|_| StoreError::BadState)?;
        match jobs.iter_mut().find(|job| job.id == id) {
            None => Err(StoreError::JobNotFound(id)),
            Some(job) => {
                job.status = status;
                match status {
                    JobStatus::Completed => job.completed_at = Some(Utc::now()),
                    JobStatus::Failed => job.failed_at = Some(Utc::now()),
                    _ => {}
                }
                Ok(())
            }
        }
    }

    async fn merge_engine_data(&self, id: JobId, patch: EngineData) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write().map_err(|_| StoreError::BadState)?;
        match jobs.iter_mut().find(|job| job.id == id) {
            None => Err(StoreError::JobNotFound(id)),
            Some(job) => {
                for (key, value) in patch {
                    job.engine_data.insert(key, value);
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn data(value: serde_json::Value) -> EngineData {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn create_and_get_round_trip() {
        let store = InMemoryStore::new();
        let id = store
            .create_job(data(json!({"task_type": "noop", "n": 1})))
            .await
            .unwrap();

        let job = store.get_job(id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.task_type(), Some("noop"));
        assert_eq!(job.engine_data.get("n"), Some(&json!(1)));
        assert!(job.completed_at.is_none());
        assert!(job.failed_at.is_none());
    }

    #[tokio::test]
    async fn ids_are_distinct() {
        let store = InMemoryStore::new();
        let first = store.create_job(EngineData::new()).await.unwrap();
        let second = store.create_job(EngineData::new()).await.unwrap();
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn get_missing_job_returns_none() {
        let store = InMemoryStore::new();
        assert!(store.get_job(JobId::from(42)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_status_sets_terminal_timestamps() {
        let store = InMemoryStore::new();
        let id = store.create_job(EngineData::new()).await.unwrap();

        store
            .update_status(id, JobStatus::Processing)
            .await
            .unwrap();
        let job = store.get_job(id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Processing);
        assert!(job.completed_at.is_none());

        store.update_status(id, JobStatus::Failed).await.unwrap();
        let job = store.get_job(id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.failed_at.is_some());
    }

    #[tokio::test]
    async fn merge_is_shallow_and_preserves_other_keys() {
        let store = InMemoryStore::new();
        let id = store
            .create_job(data(json!({"keep": "me", "nested": {"a": 1}})))
            .await
            .unwrap();

        store
            .merge_engine_data(id, data(json!({"nested": {"b": 2}, "new": true})))
            .await
            .unwrap();

        let job = store.get_job(id).await.unwrap().unwrap();
        assert_eq!(job.engine_data.get("keep"), Some(&json!("me")));
        // top-level replacement, not a deep merge
        assert_eq!(job.engine_data.get("nested"), Some(&json!({"b": 2})));
        assert_eq!(job.engine_data.get("new"), Some(&json!(true)));
    }

    #[tokio::test]
    async fn missing_job_errors() {
        let store = InMemoryStore::new();
        let id = JobId::from(999_999);
        assert_matches!(
            store.update_status(id, JobStatus::Completed).await,
            Err(StoreError::JobNotFound(missing)) if missing == id
        );
        assert_matches!(
            store.merge_engine_data(id, EngineData::new()).await,
            Err(StoreError::JobNotFound(missing)) if missing == id
        );
    }

    #[tokio::test]
    async fn badstate_errors_after_poisoned_lock() {
        let store = InMemoryStore::new();
        let id = store.create_job(EngineData::new()).await.unwrap();

        tokio::task::spawn({
            let store = store.clone();
            async move {
                let _guard = store.jobs.write();
                panic!()
            }
        })
        .await
        .unwrap_err();

        assert_matches!(
            store.create_job(EngineData::new()).await,
            Err(StoreError::BadState)
        );
        assert_matches!(store.get_job(id).await, Err(StoreError::BadState));
        assert_matches!(
            store.update_status(id, JobStatus::Completed).await,
            Err(StoreError::BadState)
        );
        assert_matches!(
            store.merge_engine_data(id, EngineData::new()).await,
            Err(StoreError::BadState)
        );
    }
}
