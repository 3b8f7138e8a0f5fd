//! Task bridge client
//!
//! The task bridge hands out tasks to workers and collects their results. The worker only
//! needs four calls: take a task, download its file, report progress and report completion.
//! [`TaskBridge`] is the seam the worker talks to; [`HttpTaskBridge`] is the real client.

use async_trait::async_trait;
use futures::StreamExt;
use log::debug;
use reqwest::{Client, StatusCode, Url};
use std::path::Path;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use crate::models::{CompletionReport, ProgressUpdate, TakeRequest, Task};

/// Task bridge error types
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Transport or decoding failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    /// Bridge answered with an unexpected status
    #[error("{endpoint} answered with status {status}")]
    UnexpectedStatus { endpoint: String, status: StatusCode },
    /// API root cannot take path segments
    #[error("Invalid API URL: {0}")]
    InvalidUrl(String),
    /// I/O error while writing a downloaded file
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

#[async_trait]
pub trait TaskBridge: Send + Sync {
    /// Try to claim a task. `Ok(None)` means no task is available right now.
    async fn take(&self, request: &TakeRequest) -> Result<Option<Task>, BridgeError>;

    /// Download the task's audio file to `destination`, returning the number of bytes written.
    async fn fetch_file(&self, task_id: &str, destination: &Path) -> Result<u64, BridgeError>;

    /// Report progress in percent.
    async fn report_progress(&self, task_id: &str, progress: u8) -> Result<(), BridgeError>;

    /// Report the final result of a task.
    async fn complete(&self, task_id: &str, report: &CompletionReport) -> Result<(), BridgeError>;
}

/// Task bridge reached over HTTP
#[derive(Clone, Debug)]
pub struct HttpTaskBridge {
    client: Client,
    api_url: Url,
}

impl HttpTaskBridge {
    /// `api_url` is the API root, e.g. `https://taskbridge.ai/api/v2/`
    pub fn new(api_url: Url) -> Self {
        Self::with_client(Client::new(), api_url)
    }

    pub fn with_client(client: Client, api_url: Url) -> Self {
        Self { client, api_url }
    }

    /// Build an endpoint URL below the API root.
    ///
    /// Segments are percent-encoded, so task ids cannot escape their path segment.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, BridgeError> {
        let mut url = self.api_url.clone();
        url.path_segments_mut()
            .map_err(|_| BridgeError::InvalidUrl(self.api_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn check_status(response: &reqwest::Response, endpoint: &Url) -> Result<(), BridgeError> {
        if response.status().is_success() {
            Ok(())
        } else {
            Err(BridgeError::UnexpectedStatus {
                endpoint: endpoint.to_string(),
                status: response.status(),
            })
        }
    }
}

#[async_trait]
impl TaskBridge for HttpTaskBridge {
    async fn take(&self, request: &TakeRequest) -> Result<Option<Task>, BridgeError> {
        let url = self.endpoint(&["tasks", "take", ""])?;
        let response = self.client.post(url).json(request).send().await?;
        debug!("Take request answered with {}", response.status());

        // Anything but 200 means there is nothing to do
        if response.status() != StatusCode::OK {
            return Ok(None);
        }

        Ok(Some(response.json::<Task>().await?))
    }

    async fn fetch_file(&self, task_id: &str, destination: &Path) -> Result<u64, BridgeError> {
        let url = self.endpoint(&["tasks", "file", task_id])?;
        let response = self.client.get(url.clone()).send().await?;
        Self::check_status(&response, &url)?;

        let mut file = File::create(destination).await?;
        let mut written = 0u64;
        let mut chunks = response.bytes_stream();
        while let Some(chunk) = chunks.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        Ok(written)
    }

    async fn report_progress(&self, task_id: &str, progress: u8) -> Result<(), BridgeError> {
        let url = self.endpoint(&["tasks", "progress", task_id, ""])?;
        let response = self
            .client
            .post(url.clone())
            .json(&ProgressUpdate::new(progress))
            .send()
            .await?;
        Self::check_status(&response, &url)
    }

    async fn complete(&self, task_id: &str, report: &CompletionReport) -> Result<(), BridgeError> {
        let url = self.endpoint(&["tasks", "complete", task_id, ""])?;
        let response = self.client.post(url.clone()).json(report).send().await?;
        Self::check_status(&response, &url)
    }
}
