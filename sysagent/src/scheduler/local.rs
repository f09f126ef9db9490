//! An in-process [`Scheduler`] and its dispatch loop.
//!
//! [`LocalScheduler`] turns `schedule_once` calls into timed sends onto an
//! unbounded channel; [`Dispatcher`] consumes the resulting stream of fired
//! job ids and feeds them to [`SystemAgent::handle_task`]. Together they make
//! the engine runnable without any external cron infrastructure.
use std::sync::Arc;

use async_stream::stream;
use async_trait::async_trait;
use chrono::TimeDelta;
use futures::{Stream, StreamExt};
use tokio::{sync::mpsc, task::JoinHandle};

use super::{ScheduleError, Scheduler};
use crate::{job::JobId, store::JobStore, AgentError, SystemAgent};

/// An in-process fire-once-after-delay scheduler.
#[derive(Clone)]
pub struct LocalScheduler {
    sender: mpsc::UnboundedSender<JobId>,
}

impl LocalScheduler {
    /// Creates the scheduler and the fired-job feed a [`Dispatcher`] will
    /// consume.
    pub fn new() -> (Self, FiredJobs) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, FiredJobs { receiver })
    }
}

#[async_trait]
impl Scheduler for LocalScheduler {
    async fn schedule_once(&self, delay: TimeDelta, job_id: JobId) -> Result<(), ScheduleError> {
        let delay = delay.to_std().unwrap_or(std::time::Duration::ZERO);
        if delay.is_zero() {
            return self
                .sender
                .send(job_id)
                .map_err(|_| ScheduleError::Stopped);
        }
        let sender = self.sender.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if sender.send(job_id).is_err() {
                tracing::warn!(%job_id, "Dispatcher stopped before job {job_id} fired");
            }
        });
        Ok(())
    }
}

/// The receiving side of a [`LocalScheduler`]: job ids whose delay has
/// elapsed.
pub struct FiredJobs {
    receiver: mpsc::UnboundedReceiver<JobId>,
}

impl FiredJobs {
    fn into_stream(self) -> impl Stream<Item = JobId> + Send {
        let mut receiver = self.receiver;
        stream! {
            while let Some(job_id) = receiver.recv().await {
                yield job_id;
            }
        }
    }
}

enum Message {
    Terminate,
}

/// Drives fired jobs through an agent until shut down.
pub struct Dispatcher {
    sender: mpsc::UnboundedSender<Message>,
    handle: Option<JoinHandle<()>>,
}

impl Dispatcher {
    pub fn spawn<S>(agent: Arc<SystemAgent<S, LocalScheduler>>, fired: FiredJobs) -> Self
    where
        S: JobStore + 'static,
    {
        let (sender, mut rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(async move {
            let stream = fired.into_stream();
            tokio::pin!(stream);
            loop {
                tokio::select! {
                    fired = stream.next() => match fired {
                        Some(job_id) => agent.handle_task(job_id).await,
                        None => break,
                    },
                    _ = rx.recv() => {
                        break;
                    }
                }
            }
            tracing::debug!("Shutting down task dispatcher");
        });
        Self {
            sender,
            handle: Some(handle),
        }
    }

    pub async fn graceful_shutdown(mut self) -> Result<(), AgentError> {
        self.sender
            .send(Message::Terminate)
            .map_err(|_| AgentError::GracefulShutdownFailed)?;
        if let Some(handle) = self.handle.take() {
            handle
                .await
                .map_err(|_| AgentError::GracefulShutdownFailed)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;
    use crate::{
        job::{EngineData, JobStatus},
        store::memory::InMemoryStore,
        task::{Task, TaskOutcome},
    };
    use serde_json::json;

    #[tokio::test]
    async fn zero_delay_fires_immediately() {
        let (scheduler, fired) = LocalScheduler::new();
        scheduler
            .schedule_once(TimeDelta::zero(), JobId::from(7))
            .await
            .unwrap();

        let stream = fired.into_stream();
        tokio::pin!(stream);
        assert_eq!(stream.next().await, Some(JobId::from(7)));
    }

    #[tokio::test]
    async fn delayed_fire_arrives_after_sleep() {
        let (scheduler, fired) = LocalScheduler::new();
        scheduler
            .schedule_once(TimeDelta::milliseconds(20), JobId::from(3))
            .await
            .unwrap();

        let stream = fired.into_stream();
        tokio::pin!(stream);
        let job_id = tokio::time::timeout(Duration::from_secs(1), stream.next())
            .await
            .unwrap();
        assert_eq!(job_id, Some(JobId::from(3)));
    }

    #[tokio::test]
    async fn schedule_after_dispatcher_gone_errors() {
        let (scheduler, fired) = LocalScheduler::new();
        drop(fired);
        let result = scheduler
            .schedule_once(TimeDelta::zero(), JobId::from(1))
            .await;
        assert!(matches!(result, Err(ScheduleError::Stopped)));
    }

    struct PollTwiceTask {
        seen: Arc<Mutex<Vec<u32>>>,
    }

    #[async_trait]
    impl Task for PollTwiceTask {
        fn task_type(&self) -> &'static str {
            "poll_twice"
        }

        async fn execute(&self, _job_id: JobId, params: EngineData) -> TaskOutcome {
            let attempts = crate::job::RetryState::read(&params).attempts;
            self.seen.lock().unwrap().push(attempts);
            if attempts < 2 {
                TaskOutcome::reschedule_in(TimeDelta::milliseconds(5))
            } else {
                let mut result = EngineData::new();
                result.insert("done".to_owned(), json!(true));
                TaskOutcome::complete(result)
            }
        }
    }

    #[tokio::test]
    async fn dispatcher_runs_a_job_to_completion() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let store = InMemoryStore::new();
        let (scheduler, fired) = LocalScheduler::new();
        let agent = Arc::new(
            SystemAgent::new(store.clone(), scheduler).with_task(PollTwiceTask {
                seen: Arc::clone(&seen),
            }),
        );
        let dispatcher = Dispatcher::spawn(Arc::clone(&agent), fired);

        let job_id = agent
            .schedule_task("poll_twice", EngineData::new())
            .await
            .unwrap();

        let job = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let job = store.get_job(job_id).await.unwrap().unwrap();
                if job.status.is_terminal() {
                    return job;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.engine_data.get("done"), Some(&json!(true)));
        assert_eq!(job.retry_state().attempts, 2);
        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2]);

        dispatcher.graceful_shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn graceful_shutdown_stops_the_loop() {
        let store = InMemoryStore::new();
        let (scheduler, fired) = LocalScheduler::new();
        let agent = Arc::new(SystemAgent::new(store, scheduler));
        let dispatcher = Dispatcher::spawn(agent, fired);
        dispatcher.graceful_shutdown().await.unwrap();
    }
}
