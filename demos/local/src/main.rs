use std::sync::Arc;

use async_trait::async_trait;
use chrono::TimeDelta;
use serde_json::json;
use sysagent::prelude::*;

#[tokio::main]
pub async fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let store = InMemoryStore::new();
    let (scheduler, fired) = LocalScheduler::new();
    let agent = Arc::new(
        SystemAgent::new(store.clone(), scheduler)
            .with_task(PublishTask)
            .with_task(FlakyTask),
    );
    let dispatcher = Dispatcher::spawn(Arc::clone(&agent), fired);

    let mut params = EngineData::new();
    params.insert("post_id".to_owned(), json!(42));
    let job_id = agent.schedule_task("publish", params).await.unwrap();
    println!("Scheduled publish job {job_id}");

    let job_id = agent
        .schedule_task("flaky", EngineData::new())
        .await
        .unwrap();
    println!("Scheduled flaky job {job_id}");

    tokio::time::sleep(std::time::Duration::from_secs(5)).await;

    for job in store.all_jobs().unwrap() {
        println!(
            "job {}: status={} attempts={} error={:?}",
            job.id,
            job.status,
            job.retry_state().attempts,
            job.error()
        );
    }

    dispatcher.graceful_shutdown().await.unwrap();
}

/// Pretends to publish a post once an external system reports it ready,
/// which here takes two polls.
struct PublishTask;

#[async_trait]
impl Task for PublishTask {
    fn task_type(&self) -> &'static str {
        "publish"
    }

    async fn execute(&self, job_id: JobId, params: EngineData) -> TaskOutcome {
        let attempts = RetryState::read(&params).attempts;
        if attempts < 2 {
            println!("{job_id}: publish not ready yet (poll {attempts})");
            return TaskOutcome::reschedule_in(TimeDelta::seconds(1));
        }
        let mut result = EngineData::new();
        result.insert("published".to_owned(), json!(true));
        TaskOutcome::complete(result)
    }
}

/// Always asks to retry, demonstrating the bounded-attempt termination.
struct FlakyTask;

#[async_trait]
impl Task for FlakyTask {
    fn task_type(&self) -> &'static str {
        "flaky"
    }

    fn max_attempts(&self) -> u32 {
        3
    }

    async fn execute(&self, _job_id: JobId, _params: EngineData) -> TaskOutcome {
        TaskOutcome::reschedule_in(TimeDelta::seconds(1))
    }
}
