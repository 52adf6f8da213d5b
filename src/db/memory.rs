use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;
use tracing::debug;

use crate::db::store::{JobFilter, JobStore, StoreError};
use crate::workflow::state::{JobRecord, JobStatus, NewJob, Transition};

#[derive(Default)]
struct Inner {
    jobs: BTreeMap<i64, JobRecord>,
    last_id: i64,
}

/// In-process [`JobStore`] used when no database is configured and in tests.
///
/// Records are replaced whole under the write lock, so readers only ever clone
/// complete snapshots.
#[derive(Default)]
pub struct MemoryJobStore {
    inner: RwLock<Inner>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a record as-is. Test fixtures use this to build histories the
    /// workflow itself would take time to produce.
    pub async fn put(&self, job: JobRecord) {
        let mut inner = self.inner.write().await;
        inner.last_id = inner.last_id.max(job.id);
        inner.jobs.insert(job.id, job);
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn insert(&self, job: NewJob) -> Result<JobRecord, StoreError> {
        let mut inner = self.inner.write().await;
        inner.last_id += 1;
        let record = JobRecord::pending(inner.last_id, job, Utc::now());
        inner.jobs.insert(record.id, record.clone());
        debug!("Job created with id={}", record.id);
        Ok(record)
    }

    async fn get(&self, id: i64) -> Result<Option<JobRecord>, StoreError> {
        Ok(self.inner.read().await.jobs.get(&id).cloned())
    }

    async fn list(&self, filter: &JobFilter) -> Result<Vec<JobRecord>, StoreError> {
        let inner = self.inner.read().await;
        let mut jobs: Vec<JobRecord> = inner
            .jobs
            .values()
            .filter(|job| filter.matches(job))
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let offset = usize::try_from(filter.offset).unwrap_or(0);
        let limit = filter
            .limit
            .and_then(|limit| usize::try_from(limit).ok())
            .unwrap_or(usize::MAX);
        Ok(jobs.into_iter().skip(offset).take(limit).collect())
    }

    async fn count_by_status(&self) -> Result<HashMap<JobStatus, i64>, StoreError> {
        let inner = self.inner.read().await;
        let mut counts = HashMap::new();
        for job in inner.jobs.values() {
            *counts.entry(job.status).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn delete(&self, id: i64) -> Result<bool, StoreError> {
        Ok(self.inner.write().await.jobs.remove(&id).is_some())
    }

    async fn transition(&self, id: i64, transition: Transition) -> Result<JobRecord, StoreError> {
        let mut inner = self.inner.write().await;
        let current = inner.jobs.get(&id).ok_or(StoreError::NotFound(id))?;
        let next = current
            .apply(transition, Utc::now())
            .map_err(|source| StoreError::Transition { id, source })?;
        debug!("Job {} moved {} -> {}", id, current.status, next.status);
        inner.jobs.insert(id, next.clone());
        Ok(next)
    }

    async fn claim_next(&self) -> Result<Option<JobRecord>, StoreError> {
        let mut inner = self.inner.write().await;
        let oldest = inner
            .jobs
            .values()
            .filter(|job| job.status == JobStatus::Pending)
            .min_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

        let Some(job) = oldest else {
            return Ok(None);
        };

        let started = job
            .apply(Transition::Start, Utc::now())
            .map_err(|source| StoreError::Transition { id: job.id, source })?;
        inner.jobs.insert(started.id, started.clone());
        debug!("Claimed job {}", started.id);
        Ok(Some(started))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn close(&self) {}
}
