use async_trait::async_trait;
use serde::Serialize;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use super::{truncate_output, CollaboratorError, SpeechSynthesizer, SynthesizedAudio};
use crate::languages::Language;

#[derive(Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    response_format: &'static str,
}

/// OpenAI `audio/speech` synthesis. Produces mp3.
#[derive(Debug, Clone)]
pub struct OpenAiSpeech {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiSpeech {
    pub fn new(base_url: &str, api_key: &str, model: &str) -> Result<Self, CollaboratorError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        })
    }
}

#[async_trait]
impl SpeechSynthesizer for OpenAiSpeech {
    async fn synthesize(
        &self,
        text: &str,
        language: &Language,
    ) -> Result<SynthesizedAudio, CollaboratorError> {
        info!(
            "Generating audio with OpenAI TTS for language: {}, voice: {}",
            language.code, language.voice
        );

        let response = self
            .client
            .post(format!("{}/audio/speech", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&SpeechRequest {
                model: &self.model,
                input: text,
                voice: &language.voice,
                response_format: "mp3",
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CollaboratorError::Api {
                service: "text-to-speech",
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await?.to_vec();
        if bytes.is_empty() {
            return Err(CollaboratorError::Invalid(
                "text-to-speech returned empty audio".to_string(),
            ));
        }
        Ok(SynthesizedAudio {
            bytes,
            extension: "mp3",
        })
    }
}

/// Offline synthesis through the `espeak-ng` binary. Produces wav.
#[derive(Debug, Clone)]
pub struct EspeakSpeech {
    program: PathBuf,
}

impl EspeakSpeech {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for EspeakSpeech {
    async fn synthesize(
        &self,
        text: &str,
        language: &Language,
    ) -> Result<SynthesizedAudio, CollaboratorError> {
        let program = self.program.display().to_string();
        info!("Generating audio with {} for language: {}", program, language.code);

        let spawn_error = |source: std::io::Error| CollaboratorError::Spawn {
            program: program.clone(),
            source,
        };

        // The script goes in on stdin so text starting with `-` is never read as an option.
        let mut child = tokio::process::Command::new(&self.program)
            .args(["--stdout", "-v", language.code.as_str(), "--stdin"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(spawn_error)?;

        let stdin = child.stdin.take();
        let feed = async move {
            if let Some(mut stdin) = stdin {
                stdin.write_all(text.as_bytes()).await?;
                stdin.shutdown().await?;
            }
            Ok::<(), std::io::Error>(())
        };
        let (fed, output) = tokio::join!(feed, child.wait_with_output());
        let output = output.map_err(spawn_error)?;

        if !output.status.success() {
            return Err(CollaboratorError::Process {
                program: program.clone(),
                exit_code: output.status.code(),
                stderr: truncate_output(&output.stderr, 500),
            });
        }
        fed.map_err(spawn_error)?;
        if output.stdout.is_empty() {
            return Err(CollaboratorError::Invalid(format!(
                "{program} produced no audio"
            )));
        }

        Ok(SynthesizedAudio {
            bytes: output.stdout,
            extension: "wav",
        })
    }
}

/// Tries `primary` and falls back to `fallback` when it fails.
pub struct FallbackSpeech {
    primary: Arc<dyn SpeechSynthesizer>,
    fallback: Arc<dyn SpeechSynthesizer>,
}

impl FallbackSpeech {
    pub fn new(primary: Arc<dyn SpeechSynthesizer>, fallback: Arc<dyn SpeechSynthesizer>) -> Self {
        Self { primary, fallback }
    }
}

#[async_trait]
impl SpeechSynthesizer for FallbackSpeech {
    async fn synthesize(
        &self,
        text: &str,
        language: &Language,
    ) -> Result<SynthesizedAudio, CollaboratorError> {
        match self.primary.synthesize(text, language).await {
            Ok(audio) => Ok(audio),
            Err(primary_err) => {
                warn!("Primary text-to-speech failed, using fallback: {}", primary_err);
                self.fallback
                    .synthesize(text, language)
                    .await
                    .map_err(|fallback_err| {
                        CollaboratorError::Invalid(format!(
                            "{primary_err}; fallback also failed: {fallback_err}"
                        ))
                    })
            }
        }
    }
}
