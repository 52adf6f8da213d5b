use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle state of a narration job.
///
/// The non-terminal states form a strict order; a job only ever moves to the
/// immediate successor of its current state, or to `Failed`.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Scripting,
    Voiceover,
    VideoGen,
    Completed,
    Failed,
}

impl JobStatus {
    pub const ALL: [JobStatus; 6] = [
        JobStatus::Pending,
        JobStatus::Scripting,
        JobStatus::Voiceover,
        JobStatus::VideoGen,
        JobStatus::Completed,
        JobStatus::Failed,
    ];

    /// States a worker can be in the middle of.
    pub const IN_FLIGHT: [JobStatus; 3] = [
        JobStatus::Scripting,
        JobStatus::Voiceover,
        JobStatus::VideoGen,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Scripting => "SCRIPTING",
            JobStatus::Voiceover => "VOICEOVER",
            JobStatus::VideoGen => "VIDEO_GEN",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Progress recorded when a job enters this state. `Failed` has no
    /// threshold of its own: it keeps whatever the job had reached.
    pub fn progress_threshold(self) -> Option<i32> {
        match self {
            JobStatus::Pending => Some(0),
            JobStatus::Scripting => Some(25),
            JobStatus::Voiceover => Some(55),
            JobStatus::VideoGen => Some(85),
            JobStatus::Completed => Some(100),
            JobStatus::Failed => None,
        }
    }

    /// The next state on the success path.
    pub fn successor(self) -> Option<JobStatus> {
        match self {
            JobStatus::Pending => Some(JobStatus::Scripting),
            JobStatus::Scripting => Some(JobStatus::Voiceover),
            JobStatus::Voiceover => Some(JobStatus::VideoGen),
            JobStatus::VideoGen => Some(JobStatus::Completed),
            JobStatus::Completed | JobStatus::Failed => None,
        }
    }

    pub fn can_transition_to(self, next: JobStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        next == JobStatus::Failed || self.successor() == Some(next)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown job status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for JobStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

/// One edge of the workflow graph, carrying whatever the finished stage produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Start,
    Scripted { narration_text: String },
    Voiced { audio_reference: String },
    Muxed { output_reference: String },
    Fail { message: String },
}

impl Transition {
    /// State this transition leads to, or `None` when it has no edge out of `from`.
    pub fn target(&self, from: JobStatus) -> Option<JobStatus> {
        let target = match self {
            Transition::Start => JobStatus::Scripting,
            Transition::Scripted { .. } => JobStatus::Voiceover,
            Transition::Voiced { .. } => JobStatus::VideoGen,
            Transition::Muxed { .. } => JobStatus::Completed,
            Transition::Fail { .. } => JobStatus::Failed,
        };
        from.can_transition_to(target).then_some(target)
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("job is already {0} and cannot change state")]
    Terminal(JobStatus),

    #[error("cannot move a {from} job via {transition}")]
    OutOfOrder {
        from: JobStatus,
        transition: &'static str,
    },

    #[error("{0} must not be empty")]
    MissingArtifact(&'static str),
}

/// Fields supplied at submission time.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub input_reference: String,
    pub description_text: String,
    pub target_language: String,
}

/// A job snapshot. Every field a status read returns comes from one of these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobRecord {
    pub id: i64,
    pub status: JobStatus,
    pub progress: i32,
    pub input_reference: String,
    pub description_text: String,
    pub target_language: String,
    pub narration_text: Option<String>,
    pub audio_reference: Option<String>,
    pub output_reference: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const UNKNOWN_FAILURE: &str = "workflow step failed without an error message";

impl JobRecord {
    /// Build the record for a freshly inserted job.
    pub fn pending(id: i64, job: NewJob, now: DateTime<Utc>) -> Self {
        Self {
            id,
            status: JobStatus::Pending,
            progress: 0,
            input_reference: job.input_reference,
            description_text: job.description_text,
            target_language: job.target_language,
            narration_text: None,
            audio_reference: None,
            output_reference: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Compute the snapshot that results from `transition`.
    ///
    /// `self` is left untouched; stores persist the returned record as a whole.
    pub fn apply(
        &self,
        transition: Transition,
        at: DateTime<Utc>,
    ) -> Result<JobRecord, TransitionError> {
        if self.status.is_terminal() {
            return Err(TransitionError::Terminal(self.status));
        }

        let target = transition
            .target(self.status)
            .ok_or(TransitionError::OutOfOrder {
                from: self.status,
                transition: transition_name(&transition),
            })?;

        let mut next = self.clone();
        next.status = target;
        next.updated_at = at.max(self.updated_at);
        if let Some(threshold) = target.progress_threshold() {
            next.progress = next.progress.max(threshold);
        }

        match transition {
            Transition::Start => {}
            Transition::Scripted { narration_text } => {
                next.narration_text = Some(non_empty(narration_text, "narration text")?);
            }
            Transition::Voiced { audio_reference } => {
                next.audio_reference = Some(non_empty(audio_reference, "audio reference")?);
            }
            Transition::Muxed { output_reference } => {
                next.output_reference = Some(non_empty(output_reference, "output reference")?);
            }
            Transition::Fail { message } => {
                let message = message.trim();
                next.error_message = Some(if message.is_empty() {
                    UNKNOWN_FAILURE.to_string()
                } else {
                    message.to_string()
                });
            }
        }

        Ok(next)
    }
}

fn non_empty(value: String, what: &'static str) -> Result<String, TransitionError> {
    if value.trim().is_empty() {
        Err(TransitionError::MissingArtifact(what))
    } else {
        Ok(value)
    }
}

fn transition_name(transition: &Transition) -> &'static str {
    match transition {
        Transition::Start => "start",
        Transition::Scripted { .. } => "scripted",
        Transition::Voiced { .. } => "voiced",
        Transition::Muxed { .. } => "muxed",
        Transition::Fail { .. } => "fail",
    }
}
