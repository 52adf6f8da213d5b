//! Shared fixtures: stub collaborators and job builders.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use narrator::collaborators::{
    CollaboratorError, SpeechSynthesizer, SynthesizedAudio, TextPreparer, VideoMuxer,
};
use narrator::languages::Language;
use narrator::workflow::{Collaborators, JobRecord, JobStatus, NewJob};

/// Echoes the description back, tagged with the language.
pub struct EchoText;

#[async_trait]
impl TextPreparer for EchoText {
    async fn prepare(&self, text: &str, language: &Language) -> Result<String, CollaboratorError> {
        Ok(format!("[{}] {}", language.code, text))
    }
}

/// Returns a few fixed bytes, or a quota error when `fail` is set.
pub struct StubSpeech {
    pub fail: bool,
}

#[async_trait]
impl SpeechSynthesizer for StubSpeech {
    async fn synthesize(
        &self,
        _text: &str,
        _language: &Language,
    ) -> Result<SynthesizedAudio, CollaboratorError> {
        if self.fail {
            return Err(CollaboratorError::Api {
                service: "speech",
                status: 429,
                body: "quota exceeded".to_string(),
            });
        }
        Ok(SynthesizedAudio {
            bytes: b"ID3 stub audio".to_vec(),
            extension: "mp3",
        })
    }
}

/// Copies the video to the output. Tracks how many mux calls overlap.
#[derive(Default)]
pub struct CopyMuxer {
    pub delay: Duration,
    pub fail: bool,
    running: AtomicUsize,
    pub peak: AtomicUsize,
}

impl CopyMuxer {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl VideoMuxer for CopyMuxer {
    async fn mux(&self, video: &Path, _audio: &Path, output: &Path) -> Result<(), CollaboratorError> {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;

        // Leave a partial file behind on failure.
        let result = if self.fail {
            tokio::fs::write(output, b"partial").await.ok();
            Err(CollaboratorError::Process {
                program: "ffmpeg".to_string(),
                exit_code: Some(1),
                stderr: "Invalid data found when processing input".to_string(),
            })
        } else {
            tokio::fs::copy(video, output).await.map(|_| ()).map_err(CollaboratorError::from)
        };

        self.running.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

pub fn collaborators(speech: StubSpeech, muxer: Arc<CopyMuxer>) -> Collaborators {
    Collaborators {
        text: Arc::new(EchoText),
        speech: Arc::new(speech),
        muxer,
    }
}

/// A job whose input file exists in `dir`.
pub async fn new_job(dir: &Path, language: &str) -> NewJob {
    let input_reference = format!("upload_{}.mp4", uuid::Uuid::new_v4());
    tokio::fs::write(dir.join(&input_reference), b"\x00\x00\x00\x18ftypmp42")
        .await
        .unwrap();
    NewJob {
        input_reference,
        description_text: "Waves rolling onto the beach".to_string(),
        target_language: language.to_string(),
    }
}

/// A record in an arbitrary state, for seeding listings.
pub fn record(id: i64, status: JobStatus, created_at: DateTime<Utc>) -> JobRecord {
    JobRecord {
        id,
        status,
        progress: status.progress_threshold().unwrap_or(25),
        input_reference: format!("upload_{id}.mp4"),
        description_text: "City lights at night".to_string(),
        target_language: "en".to_string(),
        narration_text: None,
        audio_reference: None,
        output_reference: (status == JobStatus::Completed).then(|| format!("output_{id}.mp4")),
        error_message: (status == JobStatus::Failed).then(|| "text preparation failed".to_string()),
        created_at,
        updated_at: created_at,
    }
}

pub fn files_with_prefix(dir: &Path, prefix: &str) -> Vec<String> {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|entry| entry.ok())
                .map(|entry| entry.file_name().to_string_lossy().into_owned())
                .filter(|name| name.starts_with(prefix))
                .collect()
        })
        .unwrap_or_default()
}
