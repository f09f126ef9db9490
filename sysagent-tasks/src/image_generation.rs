//! Polls an external image-generation prediction until it resolves.
//!
//! The task never blocks waiting for the prediction: each invocation makes
//! one poll, then either completes, fails, or asks to be woken again in five
//! seconds, bounded by 24 attempts (roughly a two-minute polling window).
use std::sync::Arc;

use async_trait::async_trait;
use chrono::TimeDelta;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

use sysagent::{
    job::{EngineData, JobId},
    task::{Task, TaskOutcome},
};

use crate::http::build_client;

const POLL_DELAY: TimeDelta = TimeDelta::seconds(5);
const MAX_POLL_ATTEMPTS: u32 = 24;

/// Status field reported by the prediction resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PredictionStatus {
    Starting,
    Processing,
    Succeeded,
    Failed,
    Canceled,
    /// Anything the API contract does not name today. Never retried, to
    /// avoid polling forever against an unanticipated contract change.
    Unknown(String),
}

impl From<&str> for PredictionStatus {
    fn from(value: &str) -> Self {
        match value {
            "starting" => Self::Starting,
            "processing" => Self::Processing,
            "succeeded" => Self::Succeeded,
            "failed" => Self::Failed,
            "canceled" => Self::Canceled,
            other => Self::Unknown(other.to_owned()),
        }
    }
}

/// One observation of the external prediction resource.
#[derive(Debug, Clone, Deserialize)]
pub struct Prediction {
    pub status: String,
    #[serde(default)]
    pub output: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
}

impl Prediction {
    pub fn status(&self) -> PredictionStatus {
        self.status.as_str().into()
    }

    /// The output URL(s), tolerating both the single-string and the
    /// string-array output shapes.
    pub fn output_urls(&self) -> Vec<String> {
        match &self.output {
            Some(Value::String(url)) => vec![url.clone()],
            Some(Value::Array(values)) => values
                .iter()
                .filter_map(Value::as_str)
                .map(ToOwned::to_owned)
                .collect(),
            _ => Vec::new(),
        }
    }
}

#[derive(Debug, Error)]
pub enum PredictionError {
    #[error("prediction request failed")]
    Transport(#[from] reqwest::Error),
    #[error("prediction service returned status {0}")]
    Status(StatusCode),
}

/// Read access to an external prediction resource.
#[async_trait]
pub trait PredictionClient: Send + Sync {
    async fn get_prediction(&self, prediction_id: &str) -> Result<Prediction, PredictionError>;
}

/// [`PredictionClient`] over a Replicate-style HTTP API.
pub struct HttpPredictionClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl HttpPredictionClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            http: build_client(30),
            base_url: base_url.into(),
            token: token.into(),
        }
    }
}

#[async_trait]
impl PredictionClient for HttpPredictionClient {
    async fn get_prediction(&self, prediction_id: &str) -> Result<Prediction, PredictionError> {
        let url = format!(
            "{}/v1/predictions/{prediction_id}",
            self.base_url.trim_end_matches('/')
        );
        let response = self.http.get(url).bearer_auth(&self.token).send().await?;
        if !response.status().is_success() {
            return Err(PredictionError::Status(response.status()));
        }
        Ok(response.json().await?)
    }
}

#[derive(Debug, Deserialize)]
struct ImageGenerationParams {
    prediction_id: String,
}

/// Task polling an image-generation prediction to completion.
pub struct ImageGenerationTask {
    client: Arc<dyn PredictionClient>,
}

impl ImageGenerationTask {
    pub const TASK_TYPE: &'static str = "image_generation";

    pub fn new(client: Arc<dyn PredictionClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Task for ImageGenerationTask {
    fn task_type(&self) -> &'static str {
        Self::TASK_TYPE
    }

    fn max_attempts(&self) -> u32 {
        MAX_POLL_ATTEMPTS
    }

    async fn execute(&self, job_id: JobId, params: EngineData) -> TaskOutcome {
        let params: ImageGenerationParams = match serde_json::from_value(Value::Object(params)) {
            Ok(params) => params,
            Err(err) => {
                return TaskOutcome::fail(format!("Invalid image generation parameters: {err}"))
            }
        };

        let prediction = match self.client.get_prediction(&params.prediction_id).await {
            Ok(prediction) => prediction,
            Err(err) => {
                // Transient transport failures poll again under the same
                // bounded-attempt cap as a normal in-progress poll.
                tracing::debug!(%job_id, ?err, "Prediction poll failed, will retry: {err}");
                return TaskOutcome::reschedule_in(POLL_DELAY);
            }
        };

        match prediction.status() {
            PredictionStatus::Starting | PredictionStatus::Processing => {
                tracing::debug!(
                    %job_id,
                    prediction_id = %params.prediction_id,
                    status = %prediction.status,
                    "Prediction still in progress"
                );
                TaskOutcome::reschedule_in(POLL_DELAY)
            }
            PredictionStatus::Succeeded => match prediction.output_urls().first() {
                // Retrying cannot conjure a URL out of a malformed success.
                None => TaskOutcome::fail(format!(
                    "Prediction {} succeeded but no image URL found in output",
                    params.prediction_id
                )),
                Some(url) => {
                    let mut result = EngineData::new();
                    result.insert("image_url".to_owned(), json!(url));
                    result.insert("prediction_status".to_owned(), json!("succeeded"));
                    TaskOutcome::complete(result)
                }
            },
            PredictionStatus::Failed | PredictionStatus::Canceled => {
                TaskOutcome::fail(prediction.error.clone().unwrap_or_else(|| {
                    format!(
                        "Prediction {} ended as '{}' without error detail",
                        params.prediction_id, prediction.status
                    )
                }))
            }
            PredictionStatus::Unknown(status) => {
                TaskOutcome::fail(format!("Unknown prediction status: {status}"))
            }
        }
    }
}
