use reqwest::{multipart, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::api::job::dto::{DeleteResponse, JobStatusResponse, JobSummary, SubmitResponse};
use crate::api::validation::ErrorResponse;
use crate::languages::Language;
use crate::workflow::JobStatus;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("job {0} not found")]
    NotFound(i64),

    #[error("unexpected response: {0}")]
    Unexpected(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Cap on a whole status, listing or delete call.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Cap on an upload, which carries the whole video.
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(600);

/// HTTP client for the narration service.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    request_timeout: Duration,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(UPLOAD_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            request_timeout: REQUEST_TIMEOUT,
        })
    }

    /// Override the cap on non-upload calls. A call that runs over fails with
    /// [`ClientError::Http`], which the poller counts as a failed read.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.http.get(self.url(path)).timeout(self.request_timeout)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Upload a video and queue it for narration.
    pub async fn submit(
        &self,
        video: &Path,
        description_text: &str,
        target_language: &str,
    ) -> Result<SubmitResponse, ClientError> {
        let file_name = video
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| ClientError::Unexpected(format!("not a file: {}", video.display())))?
            .to_string();
        let bytes = tokio::fs::read(video).await?;
        debug!("Uploading {} ({} bytes)", file_name, bytes.len());

        let form = multipart::Form::new()
            .part("video_file", multipart::Part::bytes(bytes).file_name(file_name))
            .text("description_text", description_text.to_string())
            .text("target_language", target_language.to_string());

        let response = self
            .http
            .post(self.url("/generate"))
            .multipart(form)
            .send()
            .await?;
        decode(response).await
    }

    pub async fn status(&self, id: i64) -> Result<JobStatusResponse, ClientError> {
        let response = self.get(&format!("/status/{id}")).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(ClientError::NotFound(id));
        }
        decode(response).await
    }

    pub async fn list_jobs(
        &self,
        status: Option<JobStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<JobSummary>, ClientError> {
        let mut query = vec![
            ("limit", limit.to_string()),
            ("offset", offset.to_string()),
        ];
        if let Some(status) = status {
            query.push(("status", status.as_str().to_string()));
        }
        let response = self.get("/jobs").query(&query).send().await?;
        decode(response).await
    }

    pub async fn delete_job(&self, id: i64) -> Result<DeleteResponse, ClientError> {
        let response = self
            .http
            .delete(self.url(&format!("/jobs/{id}")))
            .timeout(self.request_timeout)
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(ClientError::NotFound(id));
        }
        decode(response).await
    }

    pub async fn languages(&self) -> Result<Vec<Language>, ClientError> {
        let response = self.get("/languages").send().await?;
        decode(response).await
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json().await?);
    }

    let body = response.text().await?;
    let message = match serde_json::from_str::<ErrorResponse>(&body) {
        Ok(error) if error.fields.is_null() => error.error,
        Ok(error) => format!("{} {}", error.error, error.fields),
        Err(_) => body,
    };
    Err(ClientError::Api {
        status: status.as_u16(),
        message,
    })
}
