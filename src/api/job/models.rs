use actix_multipart::form::{tempfile::TempFile, text::Text, MultipartForm};
use serde::{Deserialize, Deserializer};
use std::borrow::Cow;
use std::path::Path;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::config::Config;
use crate::languages::LanguageCatalog;
use crate::workflow::JobStatus;

/// Multipart body of `POST /generate`
#[derive(Debug, MultipartForm)]
pub struct GenerateForm {
    pub video_file: TempFile,
    pub description_text: Text<String>,
    pub target_language: Text<String>,
}

/// Upload constraints applied to every submission.
#[derive(Debug, Clone)]
pub struct UploadLimits {
    pub max_video_size: usize,
    pub max_description_length: usize,
    pub allowed_video_formats: Vec<String>,
}

impl UploadLimits {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_video_size: config.max_video_size,
            max_description_length: config.max_description_length,
            allowed_video_formats: config.allowed_video_formats.clone(),
        }
    }

    /// Error reported on `video_file` for an upload over `max_video_size`
    pub fn size_error(&self) -> ValidationError {
        invalid(
            "size",
            format!(
                "File too large. Maximum size is {}MB",
                self.max_video_size / (1024 * 1024)
            ),
        )
    }
}

/// The parts of a submission that are checked before anything is stored.
#[derive(Debug, Clone)]
pub struct JobSubmission {
    pub file_name: Option<String>,
    pub file_size: usize,
    pub description_text: String,
    pub target_language: String,
}

impl From<&GenerateForm> for JobSubmission {
    fn from(form: &GenerateForm) -> Self {
        Self {
            file_name: form.video_file.file_name.clone(),
            file_size: form.video_file.size,
            description_text: form.description_text.trim().to_string(),
            target_language: form.target_language.trim().to_string(),
        }
    }
}

fn invalid(code: &'static str, message: String) -> ValidationError {
    let mut error = ValidationError::new(code);
    error.message = Some(Cow::from(message));
    error
}

impl JobSubmission {
    /// Check every field, collecting all violations.
    pub fn validate(
        &self,
        limits: &UploadLimits,
        languages: &LanguageCatalog,
    ) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if self.file_size > limits.max_video_size {
            errors.add("video_file", limits.size_error());
        }
        match self.file_name.as_deref().filter(|name| !name.trim().is_empty()) {
            None => errors.add("video_file", invalid("required", "No video file provided".to_string())),
            Some(name) => {
                let extension = Path::new(name)
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| ext.to_ascii_lowercase());
                let allowed = extension
                    .as_deref()
                    .map_or(false, |ext| limits.allowed_video_formats.iter().any(|f| f == ext));
                if !allowed {
                    errors.add(
                        "video_file",
                        invalid(
                            "format",
                            format!(
                                "Invalid file format. Allowed formats: {}",
                                limits.allowed_video_formats.join(", ")
                            ),
                        ),
                    );
                }
            }
        }

        if self.description_text.is_empty() {
            errors.add(
                "description_text",
                invalid("required", "Description text cannot be empty".to_string()),
            );
        } else if self.description_text.chars().count() > limits.max_description_length {
            errors.add(
                "description_text",
                invalid(
                    "length",
                    format!(
                        "Description text too long. Maximum {} characters",
                        limits.max_description_length
                    ),
                ),
            );
        }

        if !languages.contains(&self.target_language) {
            errors.add(
                "target_language",
                invalid(
                    "language",
                    format!(
                        "Unsupported language. Supported languages: {}",
                        languages.codes().join(", ")
                    ),
                ),
            );
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Status names are matched without regard to case, like `JobStatus::from_str`.
fn status_from_str<'de, D>(deserializer: D) -> Result<Option<JobStatus>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer)?
        .map(|status| status.parse().map_err(serde::de::Error::custom))
        .transpose()
}

fn default_limit() -> i64 {
    100
}

/// Query string of `GET /jobs`
#[derive(Debug, Deserialize, Validate)]
pub struct ListJobsQuery {
    #[serde(default, deserialize_with = "status_from_str")]
    pub status: Option<JobStatus>,

    #[serde(default = "default_limit")]
    #[validate(range(min = 1, max = 500, message = "Limit must be between 1 and 500"))]
    pub limit: i64,

    #[serde(default)]
    #[validate(range(min = 0, message = "Offset must not be negative"))]
    pub offset: i64,
}
