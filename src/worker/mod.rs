pub mod job_worker;
pub mod recovery;
pub mod retention;

pub use job_worker::{JobQueue, JobWorker};
pub use recovery::fail_interrupted_jobs;
pub use retention::RetentionTask;
