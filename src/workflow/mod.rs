pub mod runner;
pub mod state;

pub use runner::{Collaborators, StepError, Workflow};
pub use state::{JobRecord, JobStatus, NewJob, Transition, TransitionError};
