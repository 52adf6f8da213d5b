use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::collaborators::LocalFileStore;
use crate::db::{JobFilter, JobStore, StoreError};
use crate::workflow::JobStatus;

/// How often the sweep runs.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Deletes completed jobs, and the files they reference, once they are older
/// than the retention period.
pub struct RetentionTask {
    store: Arc<dyn JobStore>,
    files: LocalFileStore,
    retention: chrono::Duration,
}

impl RetentionTask {
    pub fn new(store: Arc<dyn JobStore>, files: LocalFileStore, retention_days: u32) -> Self {
        Self {
            store,
            files,
            retention: chrono::Duration::days(i64::from(retention_days)),
        }
    }

    /// Sweep every [`SWEEP_INTERVAL`] until `token` is cancelled.
    pub async fn run(self, token: CancellationToken) {
        info!(
            "Retention task started: completed jobs are kept {} days",
            self.retention.num_days()
        );
        let mut interval = tokio::time::interval(SWEEP_INTERVAL);

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = interval.tick() => {
                    if let Err(e) = self.sweep(Utc::now()).await {
                        error!("Retention sweep failed: {}", e);
                    }
                }
            }
        }
        info!("Retention task stopped");
    }

    /// Delete completed jobs last updated before `now - retention`.
    /// Returns how many were removed.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let filter = JobFilter {
            updated_before: Some(now - self.retention),
            ..JobFilter::with_status(JobStatus::Completed)
        };
        let expired = self.store.list(&filter).await?;

        let mut removed = 0;
        for job in expired {
            if !self.store.delete(job.id).await? {
                continue;
            }
            let references = [
                Some(job.input_reference.as_str()),
                job.audio_reference.as_deref(),
                job.output_reference.as_deref(),
            ];
            self.files.remove_all(references.into_iter().flatten()).await;
            debug!("Removed expired job {}", job.id);
            removed += 1;
        }

        if removed > 0 {
            info!("Cleaned up {} old jobs", removed);
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryJobStore;
    use crate::workflow::JobRecord;

    fn completed(id: i64, files: &LocalFileStore, age_days: i64, now: DateTime<Utc>) -> JobRecord {
        let at = now - chrono::Duration::days(age_days);
        let (input, _) = files.allocate("upload", "mp4");
        JobRecord {
            id,
            status: JobStatus::Completed,
            progress: 100,
            input_reference: input,
            description_text: "Sunset over the bay".to_string(),
            target_language: "en".to_string(),
            narration_text: Some("Sunset over the bay.".to_string()),
            audio_reference: Some(format!("narration_{id}.mp3")),
            output_reference: Some(format!("output_{id}.mp4")),
            error_message: None,
            created_at: at,
            updated_at: at,
        }
    }

    #[tokio::test]
    async fn test_sweep_removes_only_expired_completed_jobs() {
        let dir = tempfile::tempdir().unwrap();
        let files = LocalFileStore::new(dir.path());
        let store = Arc::new(MemoryJobStore::new());
        let now = Utc::now();

        let old = completed(1, &files, 10, now);
        let fresh = completed(2, &files, 1, now);
        let mut old_failed = completed(3, &files, 30, now);
        old_failed.status = JobStatus::Failed;
        old_failed.output_reference = None;
        old_failed.error_message = Some("boom".to_string());

        let old_output = old.output_reference.clone().unwrap();
        tokio::fs::write(dir.path().join(&old_output), b"video").await.unwrap();
        tokio::fs::write(dir.path().join(&old.input_reference), b"input").await.unwrap();

        store.put(old).await;
        store.put(fresh).await;
        store.put(old_failed).await;

        let task = RetentionTask::new(store.clone(), files, 7);
        assert_eq!(task.sweep(now).await.unwrap(), 1);

        assert!(store.get(1).await.unwrap().is_none());
        assert!(store.get(2).await.unwrap().is_some());
        assert!(store.get(3).await.unwrap().is_some());
        assert!(!dir.path().join(old_output).exists());

        // Nothing left to do on a second pass.
        assert_eq!(task.sweep(now).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel() {
        let dir = tempfile::tempdir().unwrap();
        let task = RetentionTask::new(
            Arc::new(MemoryJobStore::new()),
            LocalFileStore::new(dir.path()),
            7,
        );
        let token = CancellationToken::new();
        let handle = tokio::spawn(task.run(token.clone()));
        token.cancel();
        handle.await.unwrap();
    }
}
