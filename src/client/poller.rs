use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::api_client::{ApiClient, ClientError};
use crate::api::job::dto::JobStatusResponse;
use crate::workflow::JobStatus;

/// Where the poller reads job status from.
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn fetch_status(&self, id: i64) -> Result<JobStatusResponse, ClientError>;
}

#[async_trait]
impl StatusSource for ApiClient {
    async fn fetch_status(&self, id: i64) -> Result<JobStatusResponse, ClientError> {
        self.status(id).await
    }
}

/// What the user is told a job is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Queued,
    WritingScript,
    GeneratingVoiceover,
    MergingVideo,
    Done,
    Failed,
}

impl Phase {
    pub fn label(self) -> &'static str {
        match self {
            Phase::Queued => "Waiting in queue",
            Phase::WritingScript => "Preparing narration script",
            Phase::GeneratingVoiceover => "Generating voiceover",
            Phase::MergingVideo => "Merging audio and video",
            Phase::Done => "Video ready",
            Phase::Failed => "Generation failed",
        }
    }
}

impl From<JobStatus> for Phase {
    fn from(status: JobStatus) -> Self {
        match status {
            JobStatus::Pending => Phase::Queued,
            JobStatus::Scripting => Phase::WritingScript,
            JobStatus::Voiceover => Phase::GeneratingVoiceover,
            JobStatus::VideoGen => Phase::MergingVideo,
            JobStatus::Completed => Phase::Done,
            JobStatus::Failed => Phase::Failed,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Reported to the caller after every successful status read.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    pub job_id: i64,
    pub status: JobStatus,
    pub phase: Phase,
    pub progress: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Completed { output_reference: String },
    Failed { error_message: String },
    /// The token fired; no request was issued after that.
    Cancelled,
    /// `max_polls` reads returned without a terminal state.
    TimedOut { polls: u32 },
}

#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub interval: Duration,
    /// Consecutive failed reads after which polling gives up.
    pub max_consecutive_errors: u32,
    /// Upper bound on reads; `None` polls until a terminal state.
    pub max_polls: Option<u32>,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            max_consecutive_errors: 3,
            max_polls: None,
        }
    }
}

/// Polls a job until it finishes, fails, or the caller cancels.
pub struct StatusPoller {
    source: Arc<dyn StatusSource>,
    config: PollerConfig,
}

impl StatusPoller {
    pub fn new(source: Arc<dyn StatusSource>, config: PollerConfig) -> Self {
        Self { source, config }
    }

    /// Poll job `id`, calling `on_update` after every read.
    ///
    /// A 404 ends polling at once. Other read errors are retried on the next
    /// tick until `max_consecutive_errors` of them happen in a row.
    pub async fn poll<F>(
        &self,
        id: i64,
        token: &CancellationToken,
        mut on_update: F,
    ) -> Result<PollOutcome, ClientError>
    where
        F: FnMut(&ProgressUpdate),
    {
        let mut polls: u32 = 0;
        let mut consecutive_errors: u32 = 0;

        loop {
            let fetched = tokio::select! {
                biased;
                _ = token.cancelled() => return Ok(PollOutcome::Cancelled),
                fetched = self.source.fetch_status(id) => fetched,
            };
            polls += 1;

            match fetched {
                Ok(job) => {
                    consecutive_errors = 0;
                    let update = ProgressUpdate {
                        job_id: id,
                        status: job.status,
                        phase: Phase::from(job.status),
                        progress: job.progress,
                    };
                    debug!("Job {}: {} ({}%)", id, update.phase, update.progress);
                    on_update(&update);

                    match job.status {
                        JobStatus::Completed => {
                            let output_reference = job.output_file_path.ok_or_else(|| {
                                ClientError::Unexpected(format!("job {id} completed without output"))
                            })?;
                            return Ok(PollOutcome::Completed { output_reference });
                        }
                        JobStatus::Failed => {
                            return Ok(PollOutcome::Failed {
                                error_message: job.error_message.unwrap_or_default(),
                            });
                        }
                        _ => {}
                    }
                }
                Err(e @ ClientError::NotFound(_)) => return Err(e),
                Err(e) => {
                    consecutive_errors += 1;
                    if consecutive_errors >= self.config.max_consecutive_errors {
                        return Err(e);
                    }
                    warn!(
                        "Status read for job {} failed ({}/{}): {}",
                        id, consecutive_errors, self.config.max_consecutive_errors, e
                    );
                }
            }

            if self.config.max_polls.map_or(false, |max| polls >= max) {
                return Ok(PollOutcome::TimedOut { polls });
            }

            tokio::select! {
                biased;
                _ = token.cancelled() => return Ok(PollOutcome::Cancelled),
                _ = tokio::time::sleep(self.config.interval) => {}
            }
        }
    }
}
