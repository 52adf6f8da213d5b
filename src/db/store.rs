use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::workflow::state::{JobRecord, JobStatus, NewJob, Transition, TransitionError, UnknownStatus};

/// Errors raised by job stores
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("job {0} not found")]
    NotFound(i64),

    #[error("job {id}: {source}")]
    Transition {
        id: i64,
        #[source]
        source: TransitionError,
    },

    #[error("corrupt job row: {0}")]
    Corrupt(#[from] UnknownStatus),
}

/// Selection for job listings. Results are ordered newest first
/// (`created_at` descending, then `id` descending).
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub updated_before: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
    pub offset: i64,
}

impl JobFilter {
    pub fn with_status(status: JobStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn matches(&self, job: &JobRecord) -> bool {
        self.status.map_or(true, |status| job.status == status)
            && self
                .updated_before
                .map_or(true, |cutoff| job.updated_at < cutoff)
    }
}

/// Persistence for job records.
///
/// Implementations must make every write of a job a single atomic snapshot
/// replacement so concurrent readers never observe a torn record.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new PENDING job and assign its id.
    async fn insert(&self, job: NewJob) -> Result<JobRecord, StoreError>;

    async fn get(&self, id: i64) -> Result<Option<JobRecord>, StoreError>;

    async fn list(&self, filter: &JobFilter) -> Result<Vec<JobRecord>, StoreError>;

    /// Number of jobs in each status. Statuses with no jobs may be absent.
    async fn count_by_status(&self) -> Result<HashMap<JobStatus, i64>, StoreError>;

    async fn count(&self) -> Result<i64, StoreError> {
        Ok(self.count_by_status().await?.values().sum())
    }

    /// Remove a job record. Returns `false` when no such job exists.
    async fn delete(&self, id: i64) -> Result<bool, StoreError>;

    /// Apply `transition` to the current snapshot of job `id` and persist the result.
    async fn transition(&self, id: i64, transition: Transition) -> Result<JobRecord, StoreError>;

    /// Atomically take the oldest PENDING job and move it to SCRIPTING.
    async fn claim_next(&self) -> Result<Option<JobRecord>, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;

    async fn close(&self);
}
