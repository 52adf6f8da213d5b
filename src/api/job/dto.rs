use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::workflow::{JobRecord, JobStatus};

/// Response for an accepted submission
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct SubmitResponse {
    pub id: i64,
    pub status: JobStatus,
    pub progress: i32,
}

/// Response for a status read
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobStatusResponse {
    pub id: i64,
    pub status: JobStatus,
    pub progress: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_file_path: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<JobRecord> for JobStatusResponse {
    fn from(job: JobRecord) -> Self {
        Self {
            id: job.id,
            status: job.status,
            progress: job.progress,
            error_message: job.error_message,
            output_file_path: job.output_reference,
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}

/// One row of `GET /jobs`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobSummary {
    pub id: i64,
    pub status: JobStatus,
    pub progress: i32,
    pub target_language: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<JobRecord> for JobSummary {
    fn from(job: JobRecord) -> Self {
        Self {
            id: job.id,
            status: job.status,
            progress: job.progress,
            target_language: job.target_language,
            error_message: job.error_message,
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub message: String,
}

/// Body of `GET /stats`
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct StatsResponse {
    pub total_jobs: i64,
    pub completed_jobs: i64,
    pub failed_jobs: i64,
    /// PENDING plus in-flight jobs
    pub active_jobs: i64,
    /// Completed share of all jobs, e.g. `"67%"`. `"100%"` when there are no jobs.
    pub success_rate: String,
    pub jobs_by_status: BTreeMap<String, i64>,
}

impl StatsResponse {
    pub fn from_counts(counts: &HashMap<JobStatus, i64>) -> Self {
        let count = |status: JobStatus| counts.get(&status).copied().unwrap_or(0);

        let total_jobs: i64 = counts.values().sum();
        let completed_jobs = count(JobStatus::Completed);
        let failed_jobs = count(JobStatus::Failed);
        let rate = if total_jobs > 0 {
            (completed_jobs as f64 / total_jobs as f64 * 100.0).round() as i64
        } else {
            100
        };

        Self {
            total_jobs,
            completed_jobs,
            failed_jobs,
            active_jobs: total_jobs - completed_jobs - failed_jobs,
            success_rate: format!("{}%", rate),
            jobs_by_status: JobStatus::ALL
                .into_iter()
                .map(|status| (status.as_str().to_string(), count(status)))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_without_jobs() {
        let stats = StatsResponse::from_counts(&HashMap::new());
        assert_eq!(stats.total_jobs, 0);
        assert_eq!(stats.success_rate, "100%");
        assert_eq!(stats.jobs_by_status.len(), JobStatus::ALL.len());
        assert!(stats.jobs_by_status.values().all(|count| *count == 0));
    }

    #[test]
    fn test_stats_success_rate_is_rounded() {
        let counts = HashMap::from([
            (JobStatus::Completed, 2),
            (JobStatus::Failed, 1),
            (JobStatus::VideoGen, 3),
        ]);
        let stats = StatsResponse::from_counts(&counts);
        assert_eq!(stats.total_jobs, 6);
        assert_eq!(stats.active_jobs, 3);
        assert_eq!(stats.success_rate, "33%");
        assert_eq!(stats.jobs_by_status["VIDEO_GEN"], 3);
        assert_eq!(stats.jobs_by_status["PENDING"], 0);
    }
}
