use actix_web::{HttpResponse, ResponseError};
use std::sync::Arc;
use tracing::{error, info, warn};
use validator::ValidationErrors;

use super::dto::{DeleteResponse, JobStatusResponse, JobSummary, StatsResponse, SubmitResponse};
use super::models::{GenerateForm, JobSubmission, ListJobsQuery, UploadLimits};
use crate::api::validation::{field_errors, ErrorResponse};
use crate::collaborators::LocalFileStore;
use crate::db::{JobFilter, JobStore, StoreError};
use crate::languages::{Language, LanguageCatalog};
use crate::worker::JobQueue;
use crate::workflow::NewJob;

/// Service-level errors
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Submission or query failed validation
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationErrors),

    #[error("job {0} not found")]
    NotFound(i64),

    /// Job store operation failed
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Upload could not be written to the file store
    #[error("file storage error: {0}")]
    Storage(#[from] std::io::Error),
}

impl ResponseError for ServiceError {
    fn error_response(&self) -> HttpResponse {
        match self {
            ServiceError::Validation(errors) => {
                warn!("Validation error: {}", errors);
                HttpResponse::BadRequest().json(ErrorResponse {
                    error: "Validation failed".to_string(),
                    fields: field_errors(errors),
                })
            }
            ServiceError::NotFound(id) | ServiceError::Store(StoreError::NotFound(id)) => {
                warn!("Job not found: {}", id);
                HttpResponse::NotFound().json(ErrorResponse::message(
                    "Not found",
                    format!("Job with id {} not found", id),
                ))
            }
            ServiceError::Store(e) => {
                error!("Store error: {}", e);
                HttpResponse::InternalServerError().json(ErrorResponse::message(
                    "Failed to process request",
                    "Database error occurred",
                ))
            }
            ServiceError::Storage(e) => {
                error!("File storage error: {}", e);
                HttpResponse::InternalServerError().json(ErrorResponse::message(
                    "Failed to process request",
                    "Could not store uploaded file",
                ))
            }
        }
    }
}

/// Job service containing business logic
pub struct JobService {
    store: Arc<dyn JobStore>,
    files: LocalFileStore,
    languages: LanguageCatalog,
    limits: UploadLimits,
    queue: JobQueue,
}

impl JobService {
    /// Create a new JobService instance
    pub fn new(
        store: Arc<dyn JobStore>,
        files: LocalFileStore,
        languages: LanguageCatalog,
        limits: UploadLimits,
        queue: JobQueue,
    ) -> Self {
        Self {
            store,
            files,
            languages,
            limits,
            queue,
        }
    }

    /// Accept a narration job
    ///
    /// # Business Logic
    /// - Validates every field; nothing is stored on failure
    /// - Copies the upload into the file store
    /// - Creates the job as PENDING and wakes a worker
    ///
    /// Processing happens in the worker pool; this returns immediately.
    pub async fn submit(&self, form: GenerateForm) -> Result<SubmitResponse, ServiceError> {
        let submission = JobSubmission::from(&form);
        submission.validate(&self.limits, &self.languages)?;

        let file_name = submission.file_name.as_deref().unwrap_or_default();
        info!(
            "Service: Accepting job for {} ({} bytes), language={}",
            file_name, submission.file_size, submission.target_language
        );

        let input_reference = self
            .files
            .save_upload(form.video_file.file.path(), file_name)
            .await?;

        let new_job = NewJob {
            input_reference: input_reference.clone(),
            description_text: submission.description_text,
            target_language: submission.target_language,
        };
        let job = match self.store.insert(new_job).await {
            Ok(job) => job,
            Err(e) => {
                self.files.remove_all([input_reference.as_str()]).await;
                return Err(e.into());
            }
        };

        self.queue.notify();
        info!("Service: Job created successfully with id={}", job.id);

        Ok(SubmitResponse {
            id: job.id,
            status: job.status,
            progress: job.progress,
        })
    }

    pub async fn status(&self, id: i64) -> Result<JobStatusResponse, ServiceError> {
        let job = self.store.get(id).await?.ok_or(ServiceError::NotFound(id))?;
        Ok(job.into())
    }

    pub async fn list(&self, query: &ListJobsQuery) -> Result<Vec<JobSummary>, ServiceError> {
        let filter = JobFilter {
            status: query.status,
            updated_before: None,
            limit: Some(query.limit),
            offset: query.offset,
        };
        let jobs = self.store.list(&filter).await?;
        Ok(jobs.into_iter().map(JobSummary::from).collect())
    }

    /// Delete a job record. Its files are left for the retention sweep.
    pub async fn delete(&self, id: i64) -> Result<DeleteResponse, ServiceError> {
        if !self.store.delete(id).await? {
            return Err(ServiceError::NotFound(id));
        }
        info!("Service: Deleted job {}", id);
        Ok(DeleteResponse {
            message: format!("Job {} deleted successfully", id),
        })
    }

    /// Job totals per status and the completed share
    pub async fn stats(&self) -> Result<StatsResponse, ServiceError> {
        let counts = self.store.count_by_status().await?;
        Ok(StatsResponse::from_counts(&counts))
    }

    pub fn languages(&self) -> &[Language] {
        self.languages.all()
    }
}
