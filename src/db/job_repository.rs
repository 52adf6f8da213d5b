use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Pool, Postgres, QueryBuilder, Transaction};
use std::collections::HashMap;
use tracing::debug;

use crate::db::models::JobRow;
use crate::db::store::{JobFilter, JobStore, StoreError};
use crate::workflow::state::{JobRecord, JobStatus, NewJob, Transition};

const SELECT_JOB: &str = r#"
    SELECT id, status, progress, input_reference, description_text, target_language,
           narration_text, audio_reference, output_reference, error_message,
           created_at, updated_at
    FROM jobs
"#;

/// Repository for Job database operations
pub struct JobRepository;

impl JobRepository {
    /// Create a new job in the database and return the full job record
    pub async fn create(pool: &Pool<Postgres>, job: &NewJob) -> Result<JobRecord, StoreError> {
        debug!(
            "Creating job: input={}, language={}",
            job.input_reference, job.target_language
        );

        let row = sqlx::query_as::<_, JobRow>(
            r#"
            INSERT INTO jobs (status, progress, input_reference, description_text, target_language)
            VALUES ('PENDING', 0, $1, $2, $3)
            RETURNING id, status, progress, input_reference, description_text, target_language,
                      narration_text, audio_reference, output_reference, error_message,
                      created_at, updated_at
            "#,
        )
        .bind(&job.input_reference)
        .bind(&job.description_text)
        .bind(&job.target_language)
        .fetch_one(pool)
        .await?;

        debug!("Job created with id={}", row.id);
        Ok(JobRecord::try_from(row)?)
    }

    pub async fn find(pool: &Pool<Postgres>, id: i64) -> Result<Option<JobRecord>, StoreError> {
        let row = sqlx::query_as::<_, JobRow>(&format!("{SELECT_JOB} WHERE id = $1"))
            .bind(id)
            .fetch_optional(pool)
            .await?;

        Ok(row.map(JobRecord::try_from).transpose()?)
    }

    pub async fn list(pool: &Pool<Postgres>, filter: &JobFilter) -> Result<Vec<JobRecord>, StoreError> {
        let mut query = QueryBuilder::<Postgres>::new(SELECT_JOB);
        query.push(" WHERE TRUE");
        if let Some(status) = filter.status {
            query.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(cutoff) = filter.updated_before {
            query.push(" AND updated_at < ").push_bind(cutoff);
        }
        query.push(" ORDER BY created_at DESC, id DESC");
        if let Some(limit) = filter.limit {
            query.push(" LIMIT ").push_bind(limit);
        }
        query.push(" OFFSET ").push_bind(filter.offset);

        let rows = query.build_query_as::<JobRow>().fetch_all(pool).await?;
        debug!("Listed {} jobs", rows.len());

        rows.into_iter()
            .map(|row| JobRecord::try_from(row).map_err(StoreError::from))
            .collect()
    }

    pub async fn count_by_status(
        pool: &Pool<Postgres>,
    ) -> Result<HashMap<JobStatus, i64>, StoreError> {
        let rows = sqlx::query_as::<_, (String, i64)>(
            "SELECT status, COUNT(*) FROM jobs GROUP BY status",
        )
        .fetch_all(pool)
        .await?;

        let mut counts = HashMap::new();
        for (status, count) in rows {
            counts.insert(status.parse::<JobStatus>()?, count);
        }
        Ok(counts)
    }

    pub async fn delete(pool: &Pool<Postgres>, id: i64) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM jobs WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        debug!("Delete job {}: {} rows affected", id, result.rows_affected());
        Ok(result.rows_affected() > 0)
    }

    /// Apply a workflow transition while holding the row lock.
    pub async fn transition(
        pool: &Pool<Postgres>,
        id: i64,
        transition: Transition,
    ) -> Result<JobRecord, StoreError> {
        let mut tx = pool.begin().await?;

        let row = sqlx::query_as::<_, JobRow>(&format!("{SELECT_JOB} WHERE id = $1 FOR UPDATE"))
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(StoreError::NotFound(id))?;

        let current = JobRecord::try_from(row)?;
        let next = current
            .apply(transition, Utc::now())
            .map_err(|source| StoreError::Transition { id, source })?;

        Self::write_snapshot(&mut tx, &next).await?;
        tx.commit().await?;

        debug!("Job {} moved {} -> {}", id, current.status, next.status);
        Ok(next)
    }

    /// Lock the oldest PENDING job, skipping rows other workers hold, and start it.
    pub async fn claim_next(pool: &Pool<Postgres>) -> Result<Option<JobRecord>, StoreError> {
        let mut tx = pool.begin().await?;

        let row = sqlx::query_as::<_, JobRow>(&format!(
            "{SELECT_JOB} WHERE status = 'PENDING' ORDER BY created_at, id LIMIT 1 FOR UPDATE SKIP LOCKED"
        ))
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.rollback().await?;
            return Ok(None);
        };

        let current = JobRecord::try_from(row)?;
        let started = current
            .apply(Transition::Start, Utc::now())
            .map_err(|source| StoreError::Transition {
                id: current.id,
                source,
            })?;

        Self::write_snapshot(&mut tx, &started).await?;
        tx.commit().await?;

        debug!("Claimed job {}", started.id);
        Ok(Some(started))
    }

    async fn write_snapshot(
        tx: &mut Transaction<'_, Postgres>,
        job: &JobRecord,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE jobs
            SET status = $2, progress = $3, narration_text = $4, audio_reference = $5,
                output_reference = $6, error_message = $7, updated_at = $8
            WHERE id = $1
            "#,
        )
        .bind(job.id)
        .bind(job.status.as_str())
        .bind(job.progress)
        .bind(&job.narration_text)
        .bind(&job.audio_reference)
        .bind(&job.output_reference)
        .bind(&job.error_message)
        .bind(job.updated_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}

/// [`JobStore`] backed by PostgreSQL.
#[derive(Clone)]
pub struct PgJobStore {
    pool: Pool<Postgres>,
}

impl PgJobStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Pool<Postgres> {
        &self.pool
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn insert(&self, job: NewJob) -> Result<JobRecord, StoreError> {
        JobRepository::create(&self.pool, &job).await
    }

    async fn get(&self, id: i64) -> Result<Option<JobRecord>, StoreError> {
        JobRepository::find(&self.pool, id).await
    }

    async fn list(&self, filter: &JobFilter) -> Result<Vec<JobRecord>, StoreError> {
        JobRepository::list(&self.pool, filter).await
    }

    async fn count_by_status(&self) -> Result<HashMap<JobStatus, i64>, StoreError> {
        JobRepository::count_by_status(&self.pool).await
    }

    async fn delete(&self, id: i64) -> Result<bool, StoreError> {
        JobRepository::delete(&self.pool, id).await
    }

    async fn transition(&self, id: i64, transition: Transition) -> Result<JobRecord, StoreError> {
        JobRepository::transition(&self.pool, id, transition).await
    }

    async fn claim_next(&self) -> Result<Option<JobRecord>, StoreError> {
        JobRepository::claim_next(&self.pool).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
