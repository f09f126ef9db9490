//! Weaves internal links into existing content via a completion model.
use std::fmt::Write;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use sysagent::{
    job::{EngineData, JobId},
    task::{Task, TaskOutcome},
};

use crate::completion::CompletionClient;

const SYSTEM_PROMPT: &str = "You are an editor inserting internal links into web content. \
    Insert each provided link exactly once where its title fits naturally, using HTML anchor \
    tags. Do not otherwise alter the text. Return only the rewritten content.";

#[derive(Debug, Clone, Deserialize)]
pub struct LinkTarget {
    pub title: String,
    pub url: String,
}

#[derive(Debug, Deserialize)]
struct InternalLinkingParams {
    content: String,
    targets: Vec<LinkTarget>,
}

/// Rewrites `content` so that it links to each of the given targets.
pub struct InternalLinkingTask {
    client: Arc<dyn CompletionClient>,
}

impl InternalLinkingTask {
    pub const TASK_TYPE: &'static str = "internal_linking";

    pub fn new(client: Arc<dyn CompletionClient>) -> Self {
        Self { client }
    }

    fn prompt(params: &InternalLinkingParams) -> String {
        let mut prompt = String::from("Links to insert:\n");
        for target in &params.targets {
            let _ = writeln!(prompt, "- \"{}\": {}", target.title, target.url);
        }
        let _ = write!(prompt, "\nContent:\n{}", params.content);
        prompt
    }
}

#[async_trait]
impl Task for InternalLinkingTask {
    fn task_type(&self) -> &'static str {
        Self::TASK_TYPE
    }

    fn max_attempts(&self) -> u32 {
        3
    }

    async fn execute(&self, job_id: JobId, params: EngineData) -> TaskOutcome {
        let params: InternalLinkingParams = match serde_json::from_value(Value::Object(params)) {
            Ok(params) => params,
            Err(err) => {
                return TaskOutcome::fail(format!("Invalid internal linking parameters: {err}"))
            }
        };
        if params.targets.is_empty() {
            return TaskOutcome::fail("No link targets provided");
        }

        let linked = match self
            .client
            .complete(SYSTEM_PROMPT, &Self::prompt(&params))
            .await
        {
            Ok(linked) => linked,
            Err(err) if err.is_transient() => {
                tracing::debug!(%job_id, ?err, "Link insertion failed, will retry: {err}");
                return TaskOutcome::reschedule();
            }
            Err(err) => return TaskOutcome::fail(format!("Link insertion failed: {err}")),
        };

        if linked.trim().is_empty() {
            return TaskOutcome::fail("Model returned no linked content");
        }
        let mut result = EngineData::new();
        result.insert("linked_content".to_owned(), json!(linked));
        result.insert("links_inserted".to_owned(), json!(params.targets.len()));
        TaskOutcome::complete(result)
    }
}
