use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info};

use crate::db::JobStore;
use crate::workflow::Workflow;

/// Hand-off between the submission endpoint and the workers.
///
/// The PENDING rows are the queue; this only wakes an idle worker so a new job
/// does not wait for the next poll.
#[derive(Clone, Default)]
pub struct JobQueue {
    notify: Arc<Notify>,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal that a job is waiting. Never blocks.
    pub fn notify(&self) {
        self.notify.notify_one();
    }

    pub async fn notified(&self) {
        self.notify.notified().await;
    }
}

/// Background worker for processing jobs
pub struct JobWorker {
    store: Arc<dyn JobStore>,
    workflow: Arc<Workflow>,
    queue: JobQueue,
    poll_interval: Duration,
}

impl JobWorker {
    /// Create a new JobWorker instance
    pub fn new(
        store: Arc<dyn JobStore>,
        workflow: Arc<Workflow>,
        queue: JobQueue,
        poll_interval: Duration,
    ) -> Self {
        Self {
            store,
            workflow,
            queue,
            poll_interval,
        }
    }

    /// Run worker with semaphore-based bounded concurrency
    ///
    /// # Architecture
    /// - Acquires a semaphore permit before claiming a job, so no job is taken
    ///   off the queue unless there is capacity to run it
    /// - Claims the oldest PENDING job (moving it to SCRIPTING)
    /// - Spawns the workflow for it; the permit is released when it finishes
    /// - Waits for a queue notification, the poll interval or shutdown when
    ///   nothing is pending
    ///
    /// # Shutdown
    /// Once `shutdown_rx` flips to `true` no more jobs are claimed. The call
    /// returns after every job this worker started has reached a terminal state
    /// or stopped on a store error.
    pub async fn run(
        &self,
        worker_id: u32,
        semaphore: Arc<Semaphore>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        info!("Worker {} started with semaphore-based concurrency", worker_id);
        let mut in_flight: Vec<JoinHandle<()>> = Vec::new();

        loop {
            in_flight.retain(|handle| !handle.is_finished());
            if *shutdown_rx.borrow() {
                break;
            }

            let permit = tokio::select! {
                permit = semaphore.clone().acquire_owned() => permit,
                _ = shutdown_rx.changed() => break,
            };
            let permit = match permit {
                Ok(permit) => permit,
                Err(e) => {
                    error!("Worker {} failed to acquire semaphore: {:?}", worker_id, e);
                    break;
                }
            };

            match self.store.claim_next().await {
                Ok(Some(job)) => {
                    info!("Worker {} acquired job: id={}", worker_id, job.id);
                    let workflow = self.workflow.clone();
                    let job_id = job.id;

                    in_flight.push(tokio::spawn(async move {
                        match workflow.run(job).await {
                            Ok(done) => info!("Completed job {}: status={}", job_id, done.status),
                            Err(e) => error!("Job {} stopped: {}", job_id, e),
                        }
                        drop(permit);
                        debug!("Released semaphore permit for job {}", job_id);
                    }));
                }
                Ok(None) => {
                    drop(permit);
                    debug!("Worker {} found no jobs available, waiting...", worker_id);
                    tokio::select! {
                        _ = self.queue.notified() => {}
                        _ = sleep(self.poll_interval) => {}
                        _ = shutdown_rx.changed() => break,
                    }
                }
                Err(e) => {
                    drop(permit);
                    error!("Worker {} encountered database error: {}", worker_id, e);
                    tokio::select! {
                        _ = sleep(Duration::from_secs(1)) => {}
                        _ = shutdown_rx.changed() => break,
                    }
                }
            }
        }

        if !in_flight.is_empty() {
            info!(
                "Worker {} waiting for {} in-flight jobs",
                worker_id,
                in_flight.len()
            );
        }
        for result in futures_util::future::join_all(in_flight).await {
            if let Err(e) = result {
                error!("Worker {} job task panicked: {:?}", worker_id, e);
            }
        }
        info!("Worker {} stopped", worker_id);
    }
}
