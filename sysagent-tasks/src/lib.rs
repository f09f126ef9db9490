//! Built-in task implementations for the [`sysagent`] engine.
//!
//! Each task pairs a domain trait for its external service (so tests and
//! alternative transports can swap the client) with an HTTP implementation
//! backed by `reqwest`:
//!
//! - [`image_generation::ImageGenerationTask`]: polls an image-generation
//!   prediction to completion.
//! - [`internal_linking::InternalLinkingTask`]: weaves internal links into
//!   content via a completion model.
//! - [`alt_text::AltTextTask`]: generates alt text for images.
//! - [`github_issue::GitHubIssueTask`]: opens a GitHub issue.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use sysagent::prelude::*;
//! use sysagent_tasks::image_generation::{HttpPredictionClient, ImageGenerationTask};
//!
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! let client = Arc::new(HttpPredictionClient::new(
//!     "https://api.replicate.com",
//!     std::env::var("REPLICATE_API_TOKEN").unwrap_or_default(),
//! ));
//! let store = InMemoryStore::new();
//! let (scheduler, fired) = LocalScheduler::new();
//! let agent = Arc::new(
//!     SystemAgent::new(store, scheduler).with_task(ImageGenerationTask::new(client)),
//! );
//! let dispatcher = Dispatcher::spawn(Arc::clone(&agent), fired);
//!
//! let params = sysagent::testing::engine_data(serde_json::json!({"prediction_id": "p1"}));
//! agent
//!     .schedule_task(ImageGenerationTask::TASK_TYPE, params)
//!     .await
//!     .unwrap();
//! # dispatcher.graceful_shutdown().await.unwrap();
//! # });
//! ```
pub mod alt_text;
pub mod completion;
pub mod github_issue;
mod http;
pub mod image_generation;
pub mod internal_linking;

pub use alt_text::AltTextTask;
pub use github_issue::GitHubIssueTask;
pub use image_generation::ImageGenerationTask;
pub use internal_linking::InternalLinkingTask;
