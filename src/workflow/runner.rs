use std::sync::Arc;
use tracing::{error, info, warn};

use crate::collaborators::{
    CollaboratorError, LocalFileStore, SpeechSynthesizer, TextPreparer, VideoMuxer,
};
use crate::db::{JobStore, StoreError};
use crate::languages::{Language, LanguageCatalog};
use crate::workflow::state::{JobRecord, JobStatus, Transition};

/// Failure of one workflow stage. Recorded on the job as its error message.
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("text preparation failed: {0}")]
    Scripting(#[source] CollaboratorError),

    #[error("audio generation failed: {0}")]
    Voiceover(#[source] CollaboratorError),

    #[error("video and audio merging failed: {0}")]
    VideoGen(#[source] CollaboratorError),

    #[error("unsupported target language `{0}`")]
    UnknownLanguage(String),

    #[error("{0} is missing from the job record")]
    MissingArtifact(&'static str),

    #[error("file store error: {0}")]
    Storage(#[from] std::io::Error),
}

/// The services each stage delegates to.
#[derive(Clone)]
pub struct Collaborators {
    pub text: Arc<dyn TextPreparer>,
    pub speech: Arc<dyn SpeechSynthesizer>,
    pub muxer: Arc<dyn VideoMuxer>,
}

/// Drives a job from its current state to a terminal one.
///
/// Every stage runs once. Its result, or its failure, is persisted as a
/// single transition before the next stage starts.
pub struct Workflow {
    store: Arc<dyn JobStore>,
    files: LocalFileStore,
    languages: LanguageCatalog,
    collaborators: Collaborators,
}

impl Workflow {
    pub fn new(
        store: Arc<dyn JobStore>,
        files: LocalFileStore,
        languages: LanguageCatalog,
        collaborators: Collaborators,
    ) -> Self {
        Self {
            store,
            files,
            languages,
            collaborators,
        }
    }

    /// Run `job` to completion or failure and return its final snapshot.
    ///
    /// Errors only when the store itself cannot be written; stage failures are
    /// recorded on the job instead.
    pub async fn run(&self, mut job: JobRecord) -> Result<JobRecord, StoreError> {
        info!("Starting workflow for job {} at {}", job.id, job.status);

        loop {
            let outcome = match job.status {
                JobStatus::Pending => Ok(Transition::Start),
                JobStatus::Scripting => self.write_script(&job).await,
                JobStatus::Voiceover => self.record_voiceover(&job).await,
                JobStatus::VideoGen => self.merge_video(&job).await,
                JobStatus::Completed | JobStatus::Failed => break,
            };

            let transition = outcome.unwrap_or_else(|e| {
                warn!("Job {} failed during {}: {}", job.id, job.status, e);
                Transition::Fail {
                    message: e.to_string(),
                }
            });

            job = match self.store.transition(job.id, transition).await {
                Ok(next) => next,
                Err(e) => {
                    error!("Failed to update job {}: {}", job.id, e);
                    return Err(e);
                }
            };
            info!(
                "Updated job {} status to {}, progress: {}%",
                job.id, job.status, job.progress
            );
        }

        Ok(job)
    }

    fn language(&self, job: &JobRecord) -> Result<&Language, StepError> {
        self.languages
            .get(&job.target_language)
            .ok_or_else(|| StepError::UnknownLanguage(job.target_language.clone()))
    }

    async fn write_script(&self, job: &JobRecord) -> Result<Transition, StepError> {
        let language = self.language(job)?;
        let narration_text = self
            .collaborators
            .text
            .prepare(&job.description_text, language)
            .await
            .map_err(StepError::Scripting)?;

        Ok(Transition::Scripted { narration_text })
    }

    async fn record_voiceover(&self, job: &JobRecord) -> Result<Transition, StepError> {
        let language = self.language(job)?;
        let text = job
            .narration_text
            .as_deref()
            .ok_or(StepError::MissingArtifact("narration text"))?;

        let audio = self
            .collaborators
            .speech
            .synthesize(text, language)
            .await
            .map_err(StepError::Voiceover)?;
        info!("Generated audio content size: {} bytes", audio.bytes.len());

        let audio_reference = self
            .files
            .write("narration", audio.extension, &audio.bytes)
            .await?;
        Ok(Transition::Voiced { audio_reference })
    }

    async fn merge_video(&self, job: &JobRecord) -> Result<Transition, StepError> {
        let audio_reference = job
            .audio_reference
            .as_deref()
            .ok_or(StepError::MissingArtifact("audio reference"))?;
        let video = self.files.resolve(&job.input_reference)?;
        let audio = self.files.resolve(audio_reference)?;
        let (output_reference, output) = self.files.allocate("output", "mp4");

        if let Err(e) = self.collaborators.muxer.mux(&video, &audio, &output).await {
            self.files.remove_all([output_reference.as_str()]).await;
            return Err(StepError::VideoGen(e));
        }

        Ok(Transition::Muxed { output_reference })
    }
}
