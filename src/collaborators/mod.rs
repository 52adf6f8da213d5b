//! External services the workflow delegates real work to.
//!
//! Each stage of the narration workflow talks to one collaborator through a
//! narrow trait so the workflow can be driven by stubs in tests and by HTTP
//! APIs or local binaries in production.

pub mod file_store;
pub mod muxer;
pub mod speech;
pub mod text;

use async_trait::async_trait;
use std::path::Path;

use crate::languages::Language;

pub use file_store::LocalFileStore;
pub use muxer::FfmpegMuxer;
pub use speech::{EspeakSpeech, FallbackSpeech, OpenAiSpeech};
pub use text::{ScriptNormalizer, TranslatingPreparer};

/// Failure reported by a collaborator.
#[derive(Debug, thiserror::Error)]
pub enum CollaboratorError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{service} returned {status}: {body}")]
    Api {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("{program} could not be started: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with code {exit_code:?}: {stderr}")]
    Process {
        program: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Invalid(String),
}

/// Audio produced by a speech synthesizer.
#[derive(Debug, Clone)]
pub struct SynthesizedAudio {
    pub bytes: Vec<u8>,
    /// File extension matching the encoding, without the dot.
    pub extension: &'static str,
}

/// Turns a raw description into narration-ready text.
#[async_trait]
pub trait TextPreparer: Send + Sync {
    async fn prepare(&self, text: &str, language: &Language) -> Result<String, CollaboratorError>;
}

/// Text-to-speech.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(
        &self,
        text: &str,
        language: &Language,
    ) -> Result<SynthesizedAudio, CollaboratorError>;
}

/// Lays a narration track over a video.
#[async_trait]
pub trait VideoMuxer: Send + Sync {
    async fn mux(&self, video: &Path, audio: &Path, output: &Path) -> Result<(), CollaboratorError>;
}

/// Trim a collaborator's error output to something that fits in a job record.
pub(crate) fn truncate_output(output: &[u8], max_chars: usize) -> String {
    let text = String::from_utf8_lossy(output);
    let text = text.trim();
    let char_count = text.chars().count();
    if char_count <= max_chars {
        return text.to_string();
    }
    let tail: String = text.chars().skip(char_count - max_chars).collect();
    format!("...{tail}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_keeps_the_tail() {
        assert_eq!(truncate_output(b"  short  ", 10), "short");
        assert_eq!(truncate_output(b"0123456789abcdef", 6), "...abcdef");
    }
}
