use tracing::{info, warn};

use crate::db::{JobFilter, JobStore, StoreError};
use crate::workflow::{JobStatus, Transition};

pub const INTERRUPTED_MESSAGE: &str = "interrupted by server restart";

/// Fail every job a previous process left mid-workflow.
///
/// Must run before any worker starts; afterwards an in-flight job always has a
/// live owner. Returns the number of jobs failed.
pub async fn fail_interrupted_jobs(store: &dyn JobStore) -> Result<usize, StoreError> {
    let mut failed = 0;

    for status in JobStatus::IN_FLIGHT {
        for job in store.list(&JobFilter::with_status(status)).await? {
            let transition = Transition::Fail {
                message: INTERRUPTED_MESSAGE.to_string(),
            };
            match store.transition(job.id, transition).await {
                Ok(_) => failed += 1,
                // Deleted or finished in the meantime.
                Err(StoreError::NotFound(_)) | Err(StoreError::Transition { .. }) => {
                    warn!("Job {} changed while recovering, skipping", job.id)
                }
                Err(e) => return Err(e),
            }
        }
    }

    if failed > 0 {
        info!("Marked {} interrupted jobs as failed", failed);
    }
    Ok(failed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryJobStore;
    use crate::workflow::NewJob;

    fn new_job() -> NewJob {
        NewJob {
            input_reference: "upload_a.mp4".to_string(),
            description_text: "A walk in the park".to_string(),
            target_language: "en".to_string(),
        }
    }

    #[tokio::test]
    async fn test_only_in_flight_jobs_are_failed() {
        let store = MemoryJobStore::new();
        let pending = store.insert(new_job()).await.unwrap();
        let claimed = store.insert(new_job()).await.unwrap();
        store.insert(new_job()).await.unwrap();

        // Claims go oldest first; advance the second claim to VOICEOVER.
        let scripting = store.claim_next().await.unwrap().unwrap();
        assert_eq!(scripting.id, pending.id);
        let voiced = store.claim_next().await.unwrap().unwrap();
        assert_eq!(voiced.id, claimed.id);
        store
            .transition(
                voiced.id,
                Transition::Scripted {
                    narration_text: "Hello.".to_string(),
                },
            )
            .await
            .unwrap();

        let failed = fail_interrupted_jobs(&store).await.unwrap();
        assert_eq!(failed, 2);

        let first = store.get(pending.id).await.unwrap().unwrap();
        assert_eq!(first.status, JobStatus::Failed);
        assert_eq!(first.progress, 25);
        assert_eq!(first.error_message.as_deref(), Some(INTERRUPTED_MESSAGE));

        let second = store.get(claimed.id).await.unwrap().unwrap();
        assert_eq!(second.status, JobStatus::Failed);
        assert_eq!(second.progress, 55);

        let untouched = store
            .list(&JobFilter::with_status(JobStatus::Pending))
            .await
            .unwrap();
        assert_eq!(untouched.len(), 1);
    }
}
