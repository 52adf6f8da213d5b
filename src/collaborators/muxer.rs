use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::{truncate_output, CollaboratorError, VideoMuxer};

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: ProbeFormat,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

/// What the muxer needs to know about the source video.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoInfo {
    pub duration_secs: f64,
    pub has_audio: bool,
}

/// Merges narration into a video with `ffmpeg`.
///
/// The narration is padded to the video's length and mixed with the original
/// soundtrack when there is one. The video stream is copied untouched.
#[derive(Debug, Clone)]
pub struct FfmpegMuxer {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

impl FfmpegMuxer {
    pub fn new(ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    pub async fn probe(&self, video: &Path) -> Result<VideoInfo, CollaboratorError> {
        let program = self.ffprobe.display().to_string();
        let output = tokio::process::Command::new(&self.ffprobe)
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(video)
            .output()
            .await
            .map_err(|source| CollaboratorError::Spawn {
                program: program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(CollaboratorError::Process {
                program,
                exit_code: output.status.code(),
                stderr: truncate_output(&output.stderr, 500),
            });
        }

        parse_probe(&output.stdout)
    }

    /// Arguments for the merge, given what the probe found.
    pub fn merge_args(video: &Path, audio: &Path, output: &Path, info: &VideoInfo) -> Vec<String> {
        let duration = format!("{:.3}", info.duration_secs);
        let filter = if info.has_audio {
            format!(
                "[1:a]apad=whole_dur={duration}[narration];\
                 [0:a][narration]amix=inputs=2:duration=first:dropout_transition=3[aout]"
            )
        } else {
            format!("[1:a]apad=whole_dur={duration}[aout]")
        };

        let mut args: Vec<String> = vec!["-y".into(), "-i".into()];
        args.push(video.display().to_string());
        args.push("-i".into());
        args.push(audio.display().to_string());
        args.extend(
            [
                "-filter_complex",
                filter.as_str(),
                "-map",
                "0:v",
                "-map",
                "[aout]",
                "-c:v",
                "copy",
                "-c:a",
                "aac",
                "-b:a",
                "128k",
                "-t",
                duration.as_str(),
            ]
            .map(String::from),
        );
        args.push(output.display().to_string());
        args
    }
}

fn parse_probe(stdout: &[u8]) -> Result<VideoInfo, CollaboratorError> {
    let probe: ProbeOutput = serde_json::from_slice(stdout)
        .map_err(|e| CollaboratorError::Invalid(format!("failed to parse ffprobe output: {e}")))?;

    let duration_secs = probe
        .format
        .duration
        .as_deref()
        .and_then(|d| d.trim().parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0)
        .ok_or_else(|| CollaboratorError::Invalid("video has no usable duration".to_string()))?;

    let has_audio = probe
        .streams
        .iter()
        .any(|s| s.codec_type.as_deref() == Some("audio"));

    Ok(VideoInfo {
        duration_secs,
        has_audio,
    })
}

#[async_trait]
impl VideoMuxer for FfmpegMuxer {
    async fn mux(&self, video: &Path, audio: &Path, output: &Path) -> Result<(), CollaboratorError> {
        let info = self.probe(video).await?;
        debug!(
            "Video duration: {} seconds, has audio: {}",
            info.duration_secs, info.has_audio
        );

        let program = self.ffmpeg.display().to_string();
        let result = tokio::process::Command::new(&self.ffmpeg)
            .args(Self::merge_args(video, audio, output, &info))
            .output()
            .await
            .map_err(|source| CollaboratorError::Spawn {
                program: program.clone(),
                source,
            })?;

        if !result.status.success() {
            return Err(CollaboratorError::Process {
                program,
                exit_code: result.status.code(),
                stderr: truncate_output(&result.stderr, 1000),
            });
        }

        info!("Merged narration into {}", output.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_probe_with_audio() {
        let json = br#"{
            "streams": [{"codec_type": "video"}, {"codec_type": "audio"}],
            "format": {"duration": "12.480000"}
        }"#;
        let info = parse_probe(json).unwrap();
        assert_eq!(
            info,
            VideoInfo {
                duration_secs: 12.48,
                has_audio: true
            }
        );
    }

    #[test]
    fn test_parse_probe_rejects_missing_duration() {
        let json = br#"{"streams": [{"codec_type": "video"}], "format": {}}"#;
        assert!(parse_probe(json).is_err());
        assert!(parse_probe(b"not json").is_err());
    }

    #[test]
    fn test_merge_args_mix_original_audio() {
        let info = VideoInfo {
            duration_secs: 10.0,
            has_audio: true,
        };
        let args = FfmpegMuxer::merge_args(
            Path::new("in.mp4"),
            Path::new("voice.mp3"),
            Path::new("out.mp4"),
            &info,
        );
        assert_eq!(&args[..5], ["-y", "-i", "in.mp4", "-i", "voice.mp3"]);
        assert!(args[6].contains("amix=inputs=2"));
        assert!(args.windows(2).any(|w| w == ["-t", "10.000"]));
        assert_eq!(args.last().unwrap(), "out.mp4");
    }

    #[test]
    fn test_merge_args_without_original_audio() {
        let info = VideoInfo {
            duration_secs: 4.5,
            has_audio: false,
        };
        let args = FfmpegMuxer::merge_args(
            Path::new("in.mp4"),
            Path::new("voice.wav"),
            Path::new("out.mp4"),
            &info,
        );
        assert_eq!(args[6], "[1:a]apad=whole_dur=4.500[aout]");
        assert!(!args.iter().any(|a| a.contains("amix")));
    }
}
