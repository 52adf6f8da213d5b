use chrono::{DateTime, Utc};
use sqlx::FromRow;

use crate::workflow::state::{JobRecord, UnknownStatus};

/// Database representation of a job with all fields
#[derive(Debug, FromRow)]
pub struct JobRow {
    pub id: i64,
    pub status: String,
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

impl TryFrom<JobRow> for JobRecord {
    type Error = UnknownStatus;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        Ok(JobRecord {
            id: row.id,
            status: row.status.parse()?,
            progress: row.progress,
            input_reference: row.input_reference,
            description_text: row.description_text,
            target_language: row.target_language,
            narration_text: row.narration_text,
            audio_reference: row.audio_reference,
            output_reference: row.output_reference,
            error_message: row.error_message,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::state::JobStatus;

    fn row(status: &str) -> JobRow {
        let now = Utc::now();
        JobRow {
            id: 7,
            status: status.to_string(),
            progress: 85,
            input_reference: "upload_7.mp4".into(),
            description_text: "Garden view".into(),
            target_language: "te".into(),
            narration_text: Some("Garden view.".into()),
            audio_reference: Some("narration_7.mp3".into()),
            output_reference: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_row_converts_to_record() {
        let record = JobRecord::try_from(row("VIDEO_GEN")).unwrap();
        assert_eq!(record.id, 7);
        assert_eq!(record.status, JobStatus::VideoGen);
        assert_eq!(record.audio_reference.as_deref(), Some("narration_7.mp3"));
    }

    #[test]
    fn test_row_with_unknown_status_is_rejected() {
        assert!(JobRecord::try_from(row("PROCESSING")).is_err());
    }
}
