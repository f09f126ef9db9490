//! Creates a GitHub issue, typically to surface an automation failure to
//! humans.
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use sysagent::{
    job::{EngineData, JobId},
    task::{Task, TaskOutcome},
};

use crate::http::build_client;

const GITHUB_API: &str = "https://api.github.com";

#[derive(Debug, Clone, Serialize)]
pub struct NewIssue {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatedIssue {
    pub number: u64,
    pub html_url: String,
}

#[derive(Debug, Error)]
pub enum IssueError {
    #[error("issue request failed")]
    Transport(#[from] reqwest::Error),
    #[error("GitHub returned status {status}: {body}")]
    Status { status: StatusCode, body: String },
}

#[async_trait]
pub trait IssueClient: Send + Sync {
    async fn create_issue(&self, repo: &str, issue: &NewIssue) -> Result<CreatedIssue, IssueError>;
}

/// [`IssueClient`] over the GitHub REST API.
pub struct HttpGitHubClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl HttpGitHubClient {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            http: build_client(30),
            base_url: GITHUB_API.to_owned(),
            token: token.into(),
        }
    }

    /// Points the client at a different API root, e.g. a GitHub Enterprise
    /// host.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl IssueClient for HttpGitHubClient {
    async fn create_issue(&self, repo: &str, issue: &NewIssue) -> Result<CreatedIssue, IssueError> {
        let url = format!("{}/repos/{repo}/issues", self.base_url.trim_end_matches('/'));
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", "sysagent")
            .json(issue)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(IssueError::Status { status, body });
        }
        Ok(response.json().await?)
    }
}

#[derive(Debug, Deserialize)]
struct GitHubIssueParams {
    repo: String,
    title: String,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    labels: Vec<String>,
}

/// Opens a GitHub issue described by the job parameters.
pub struct GitHubIssueTask {
    client: Arc<dyn IssueClient>,
}

impl GitHubIssueTask {
    pub const TASK_TYPE: &'static str = "github_issue";

    pub fn new(client: Arc<dyn IssueClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Task for GitHubIssueTask {
    fn task_type(&self) -> &'static str {
        Self::TASK_TYPE
    }

    fn max_attempts(&self) -> u32 {
        5
    }

    async fn execute(&self, job_id: JobId, params: EngineData) -> TaskOutcome {
        let params: GitHubIssueParams = match serde_json::from_value(Value::Object(params)) {
            Ok(params) => params,
            Err(err) => {
                return TaskOutcome::fail(format!("Invalid GitHub issue parameters: {err}"))
            }
        };
        let issue = NewIssue {
            title: params.title,
            body: params.body,
            labels: params.labels,
        };

        match self.client.create_issue(&params.repo, &issue).await {
            Ok(created) => {
                let mut result = EngineData::new();
                result.insert("issue_number".to_owned(), json!(created.number));
                result.insert("issue_url".to_owned(), json!(created.html_url));
                TaskOutcome::complete(result)
            }
            // Rejections are configuration or auth problems; retrying sends
            // the same request to the same answer.
            Err(IssueError::Status { status, body }) if status.is_client_error() => {
                TaskOutcome::fail(format!(
                    "GitHub rejected issue creation ({status}): {body}"
                ))
            }
            Err(err) => {
                tracing::debug!(%job_id, ?err, "Issue creation failed, will retry: {err}");
                TaskOutcome::reschedule()
            }
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::Mutex;

    use super::*;
    use sysagent::testing::engine_data;

    struct MockIssueClient {
        responses: Mutex<Vec<Result<CreatedIssue, IssueError>>>,
        requests: Mutex<Vec<(String, NewIssue)>>,
    }

    impl MockIssueClient {
        fn returning(responses: Vec<Result<CreatedIssue, IssueError>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses),
                requests: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl IssueClient for MockIssueClient {
        async fn create_issue(
            &self,
            repo: &str,
            issue: &NewIssue,
        ) -> Result<CreatedIssue, IssueError> {
            self.requests
                .lock()
                .unwrap()
                .push((repo.to_owned(), issue.clone()));
            self.responses
                .lock()
                .unwrap()
                .pop()
                .expect("no scripted issue response left")
        }
    }

    fn params() -> EngineData {
        engine_data(serde_json::json!({
            "repo": "acme/website",
            "title": "Image generation failed",
            "body": "Prediction p1 failed repeatedly.",
            "labels": ["automation"],
        }))
    }

    #[tokio::test]
    async fn created_issue_completes_with_number_and_url() {
        let client = MockIssueClient::returning(vec![Ok(CreatedIssue {
            number: 17,
            html_url: "https://github.com/acme/website/issues/17".to_owned(),
        })]);
        let task = GitHubIssueTask::new(client.clone());

        let outcome = task.execute(JobId::from(1), params()).await;
        let TaskOutcome::Complete { result } = outcome else {
            panic!("expected completion, got {outcome:?}");
        };
        assert_eq!(result.get("issue_number"), Some(&serde_json::json!(17)));
        assert_eq!(
            result.get("issue_url"),
            Some(&serde_json::json!(
                "https://github.com/acme/website/issues/17"
            ))
        );

        let requests = client.requests.lock().unwrap();
        assert_eq!(requests[0].0, "acme/website");
        assert_eq!(requests[0].1.title, "Image generation failed");
        assert_eq!(requests[0].1.labels, vec!["automation".to_owned()]);
    }

    #[tokio::test]
    async fn client_error_fails_without_retry() {
        let client = MockIssueClient::returning(vec![Err(IssueError::Status {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            body: "Validation Failed".to_owned(),
        })]);
        let task = GitHubIssueTask::new(client);

        let outcome = task.execute(JobId::from(1), params()).await;
        let TaskOutcome::Fail { reason } = outcome else {
            panic!("expected failure, got {outcome:?}");
        };
        assert!(reason.contains("422"));
        assert!(reason.contains("Validation Failed"));
    }

    #[tokio::test]
    async fn server_error_reschedules() {
        let client = MockIssueClient::returning(vec![Err(IssueError::Status {
            status: StatusCode::BAD_GATEWAY,
            body: String::new(),
        })]);
        let task = GitHubIssueTask::new(client);

        let outcome = task.execute(JobId::from(1), params()).await;
        assert_eq!(outcome, TaskOutcome::reschedule());
    }

    #[tokio::test]
    async fn missing_title_fails_fast() {
        let client = MockIssueClient::returning(vec![]);
        let task = GitHubIssueTask::new(client);

        let outcome = task
            .execute(
                JobId::from(1),
                engine_data(serde_json::json!({"repo": "acme/website"})),
            )
            .await;
        let TaskOutcome::Fail { reason } = outcome else {
            panic!("expected failure, got {outcome:?}");
        };
        assert!(reason.contains("Invalid GitHub issue parameters"));
    }
}
