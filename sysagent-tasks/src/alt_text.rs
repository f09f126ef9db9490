//! Generates alt text for an image via a completion model.
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use sysagent::{
    job::{EngineData, JobId},
    task::{Task, TaskOutcome},
};

use crate::completion::CompletionClient;

const SYSTEM_PROMPT: &str = "You write concise, descriptive alt text for images. Respond with \
    a single sentence of at most 125 characters, no quotes, no preamble.";

#[derive(Debug, Deserialize)]
struct AltTextParams {
    image_url: String,
    #[serde(default)]
    context: Option<String>,
}

/// Produces alt text for an image that lacks one.
pub struct AltTextTask {
    client: Arc<dyn CompletionClient>,
}

impl AltTextTask {
    pub const TASK_TYPE: &'static str = "alt_text";

    pub fn new(client: Arc<dyn CompletionClient>) -> Self {
        Self { client }
    }

    fn prompt(params: &AltTextParams) -> String {
        match &params.context {
            Some(context) => format!(
                "Write alt text for the image at {} appearing in this context: {context}",
                params.image_url
            ),
            None => format!("Write alt text for the image at {}", params.image_url),
        }
    }
}

#[async_trait]
impl Task for AltTextTask {
    fn task_type(&self) -> &'static str {
        Self::TASK_TYPE
    }

    fn max_attempts(&self) -> u32 {
        3
    }

    async fn execute(&self, job_id: JobId, params: EngineData) -> TaskOutcome {
        let params: AltTextParams = match serde_json::from_value(Value::Object(params)) {
            Ok(params) => params,
            Err(err) => return TaskOutcome::fail(format!("Invalid alt text parameters: {err}")),
        };

        let alt_text = match self
            .client
            .complete(SYSTEM_PROMPT, &Self::prompt(&params))
            .await
        {
            Ok(alt_text) => alt_text,
            Err(err) if err.is_transient() => {
                tracing::debug!(%job_id, ?err, "Alt text generation failed, will retry: {err}");
                return TaskOutcome::reschedule();
            }
            Err(err) => return TaskOutcome::fail(format!("Alt text generation failed: {err}")),
        };

        let alt_text = alt_text.trim();
        if alt_text.is_empty() {
            return TaskOutcome::fail("Model returned empty alt text");
        }
        let mut result = EngineData::new();
        result.insert("alt_text".to_owned(), json!(alt_text));
        TaskOutcome::complete(result)
    }
}
