mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};

use narrator::collaborators::LocalFileStore;
use narrator::db::{JobFilter, JobStore, MemoryJobStore};
use narrator::languages::LanguageCatalog;
use narrator::worker::{JobQueue, JobWorker};
use narrator::workflow::{JobStatus, Workflow};

use common::{collaborators, files_with_prefix, new_job, CopyMuxer, StubSpeech};

fn workflow(
    store: Arc<MemoryJobStore>,
    dir: &std::path::Path,
    speech: StubSpeech,
    muxer: Arc<CopyMuxer>,
) -> Workflow {
    Workflow::new(
        store,
        LocalFileStore::new(dir),
        LanguageCatalog::default(),
        collaborators(speech, muxer),
    )
}

#[tokio::test]
async fn completed_job_has_output_and_full_progress() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryJobStore::new());
    let job = store.insert(new_job(dir.path(), "te").await).await.unwrap();

    let workflow = workflow(
        store.clone(),
        dir.path(),
        StubSpeech { fail: false },
        Arc::new(CopyMuxer::default()),
    );
    let done = workflow.run(job).await.unwrap();

    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(done.progress, 100);
    assert_eq!(done.error_message, None);
    assert_eq!(done.narration_text.as_deref(), Some("[te] Waves rolling onto the beach"));

    let output = done.output_reference.clone().unwrap();
    assert!(dir.path().join(&output).exists());
    let audio = done.audio_reference.clone().unwrap();
    assert!(audio.ends_with(".mp3"));
    assert!(dir.path().join(&audio).exists());

    // The stored snapshot is the one returned.
    assert_eq!(store.get(done.id).await.unwrap(), Some(done));
}

#[tokio::test]
async fn voiceover_failure_keeps_progress_and_records_message() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryJobStore::new());
    let job = store.insert(new_job(dir.path(), "en").await).await.unwrap();

    let workflow = workflow(
        store.clone(),
        dir.path(),
        StubSpeech { fail: true },
        Arc::new(CopyMuxer::default()),
    );
    let done = workflow.run(job).await.unwrap();

    assert_eq!(done.status, JobStatus::Failed);
    assert_eq!(done.progress, 55);
    assert_eq!(done.output_reference, None);
    let message = done.error_message.unwrap();
    assert!(message.starts_with("audio generation failed"), "{message}");
    assert!(message.contains("quota exceeded"));
}

#[tokio::test]
async fn unknown_language_fails_during_scripting() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryJobStore::new());
    let job = store.insert(new_job(dir.path(), "xx").await).await.unwrap();

    let workflow = workflow(
        store,
        dir.path(),
        StubSpeech { fail: false },
        Arc::new(CopyMuxer::default()),
    );
    let done = workflow.run(job).await.unwrap();

    assert_eq!(done.status, JobStatus::Failed);
    assert_eq!(done.progress, 25);
    assert_eq!(done.error_message.as_deref(), Some("unsupported target language `xx`"));
}

#[tokio::test]
async fn mux_failure_removes_partial_output() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryJobStore::new());
    let job = store.insert(new_job(dir.path(), "en").await).await.unwrap();

    let workflow = workflow(
        store,
        dir.path(),
        StubSpeech { fail: false },
        Arc::new(CopyMuxer::failing()),
    );
    let done = workflow.run(job).await.unwrap();

    assert_eq!(done.status, JobStatus::Failed);
    assert_eq!(done.progress, 85);
    assert!(done
        .error_message
        .unwrap()
        .starts_with("video and audio merging failed"));
    assert!(files_with_prefix(dir.path(), "output_").is_empty());
}

#[tokio::test]
async fn deleted_job_stops_the_workflow() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryJobStore::new());
    let job = store.insert(new_job(dir.path(), "en").await).await.unwrap();
    assert!(store.delete(job.id).await.unwrap());

    let workflow = workflow(
        store.clone(),
        dir.path(),
        StubSpeech { fail: false },
        Arc::new(CopyMuxer::default()),
    );
    assert!(workflow.run(job).await.is_err());
    assert_eq!(store.count().await.unwrap(), 0);
}

#[tokio::test]
async fn worker_pool_respects_the_concurrency_limit() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryJobStore::new());
    for _ in 0..6 {
        store.insert(new_job(dir.path(), "en").await).await.unwrap();
    }

    let muxer = Arc::new(CopyMuxer::with_delay(Duration::from_millis(50)));
    let workflow = Arc::new(workflow(
        store.clone(),
        dir.path(),
        StubSpeech { fail: false },
        muxer.clone(),
    ));
    let queue = JobQueue::new();
    let semaphore = Arc::new(Semaphore::new(2));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut workers = Vec::new();
    for worker_id in 1..=3 {
        let worker = JobWorker::new(
            store.clone(),
            workflow.clone(),
            queue.clone(),
            Duration::from_millis(20),
        );
        let semaphore = semaphore.clone();
        let shutdown_rx = shutdown_rx.clone();
        workers.push(tokio::spawn(async move {
            worker.run(worker_id, semaphore, shutdown_rx).await
        }));
    }

    let completed = JobFilter::with_status(JobStatus::Completed);
    let all_done = async {
        while store.list(&completed).await.unwrap().len() < 6 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(10), all_done)
        .await
        .expect("jobs did not finish");

    shutdown_tx.send(true).unwrap();
    for worker in workers {
        worker.await.unwrap();
    }

    let peak = muxer.peak.load(Ordering::SeqCst);
    assert!(peak >= 1 && peak <= 2, "peak concurrency {peak}");
    assert_eq!(files_with_prefix(dir.path(), "output_").len(), 6);
}

#[tokio::test]
async fn notify_wakes_an_idle_worker() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryJobStore::new());
    let workflow = Arc::new(workflow(
        store.clone(),
        dir.path(),
        StubSpeech { fail: false },
        Arc::new(CopyMuxer::default()),
    ));
    let queue = JobQueue::new();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // A poll interval far longer than the test: only the notification can wake it.
    let worker = JobWorker::new(store.clone(), workflow, queue.clone(), Duration::from_secs(3600));
    let handle = tokio::spawn(async move {
        worker
            .run(1, Arc::new(Semaphore::new(1)), shutdown_rx)
            .await
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    let job = store.insert(new_job(dir.path(), "en").await).await.unwrap();
    queue.notify();

    let finished = async {
        loop {
            let current = store.get(job.id).await.unwrap().unwrap();
            if current.is_terminal() {
                return current;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    };
    let current = tokio::time::timeout(Duration::from_secs(5), finished)
        .await
        .expect("worker was not woken");
    assert_eq!(current.status, JobStatus::Completed);

    shutdown_tx.send(true).unwrap();
    handle.await.unwrap();
}
