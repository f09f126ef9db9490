//! Maps task-type strings to [`Task`] implementations.
use std::{collections::HashMap, sync::Arc};

use super::Task;

/// Registry of every task the agent can dispatch to, keyed by
/// [`Task::task_type`].
///
/// Populated once at startup. Registering a second task for the same type
/// replaces the first (last registration wins) and logs a warning.
#[derive(Default)]
pub struct TaskRegistry {
    tasks: HashMap<&'static str, Arc<dyn Task>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, task: Arc<dyn Task>) {
        let task_type = task.task_type();
        if self.tasks.insert(task_type, task).is_some() {
            tracing::warn!(
                task_type,
                "Replacing previously registered task for type '{task_type}'"
            );
        }
    }

    pub fn resolve(&self, task_type: &str) -> Option<Arc<dyn Task>> {
        self.tasks.get(task_type).cloned()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        job::{EngineData, JobId},
        task::TaskOutcome,
    };
    use async_trait::async_trait;

    struct StubTask {
        max_attempts: u32,
    }

    #[async_trait]
    impl Task for StubTask {
        fn task_type(&self) -> &'static str {
            "stub"
        }

        fn max_attempts(&self) -> u32 {
            self.max_attempts
        }

        async fn execute(&self, _job_id: JobId, _params: EngineData) -> TaskOutcome {
            TaskOutcome::complete(EngineData::new())
        }
    }

    #[test]
    fn resolve_returns_registered_task() {
        let mut registry = TaskRegistry::new();
        registry.register(Arc::new(StubTask { max_attempts: 3 }));

        let task = registry.resolve("stub").unwrap();
        assert_eq!(task.task_type(), "stub");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn resolve_unknown_type_returns_none() {
        let registry = TaskRegistry::new();
        assert!(registry.resolve("never_registered").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn last_registration_wins() {
        let mut registry = TaskRegistry::new();
        registry.register(Arc::new(StubTask { max_attempts: 3 }));
        registry.register(Arc::new(StubTask { max_attempts: 7 }));

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.resolve("stub").unwrap().max_attempts(), 7);
    }
}
