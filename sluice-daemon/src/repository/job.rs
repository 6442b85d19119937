//! Job Repository
//!
//! PostgreSQL implementation of [`JobStore`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sluice_core::domain::batch::is_fully_terminal;
use sluice_core::domain::job::{ArchivedJob, JobStatus, TrackedJob};
use sluice_core::dto::job::{NewJob, SubmissionRecord};
use sqlx::PgPool;
use uuid::Uuid;

use super::{JobStore, StoreError};

const JOB_COLUMNS: &str = r#"
    id, status, batch_id, description_path, template_path, backend_handle,
    max_attempts, cluster_list, fairshare, site_name, created_at, modified_at,
    start_time, end_time
"#;

#[derive(Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn insert_jobs(&self, jobs: Vec<NewJob>) -> Result<Vec<Uuid>, StoreError> {
        let now = Utc::now();
        let mut ids = Vec::with_capacity(jobs.len());
        let mut tx = self.pool.begin().await?;

        for job in jobs {
            let id = Uuid::new_v4();

            sqlx::query(
                r#"
                INSERT INTO jobs (id, status, batch_id, description_path, template_path,
                                  created_at, modified_at)
                VALUES ($1, $2, $3, $4, $5, $6, $6)
                "#,
            )
            .bind(id)
            .bind(JobStatus::New.as_str())
            .bind(&job.batch_id)
            .bind(&job.description_path)
            .bind(&job.template_path)
            .bind(now)
            .execute(&mut *tx)
            .await?;

            ids.push(id);
        }

        tx.commit().await?;

        Ok(ids)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<TrackedJob>, StoreError> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TrackedJob::try_from).transpose()
    }

    async fn find_by_status(
        &self,
        status: JobStatus,
        limit: i64,
    ) -> Result<Vec<TrackedJob>, StoreError> {
        let rows = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE status = $1 ORDER BY modified_at ASC LIMIT $2"
        ))
        .bind(status.as_str())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TrackedJob::try_from).collect()
    }

    async fn find_by_batch(&self, batch_id: &str) -> Result<Vec<TrackedJob>, StoreError> {
        let rows = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE batch_id = $1 ORDER BY created_at ASC"
        ))
        .bind(batch_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TrackedJob::try_from).collect()
    }

    async fn update_status(
        &self,
        id: Uuid,
        expected: JobStatus,
        next: JobStatus,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let (start_time, end_time) = match next {
            JobStatus::Running => ("$3", "end_time"),
            JobStatus::Submitted => ("NULL", "NULL"),
            status if status.is_terminal() => ("start_time", "$3"),
            _ => ("start_time", "end_time"),
        };

        let result = sqlx::query(&format!(
            r#"
            UPDATE jobs
            SET status = $1, modified_at = $3, start_time = {start_time}, end_time = {end_time}
            WHERE id = $2 AND status = $4
            "#
        ))
        .bind(next.as_str())
        .bind(id)
        .bind(at)
        .bind(expected.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn mark_submitted(
        &self,
        id: Uuid,
        expected: JobStatus,
        record: &SubmissionRecord,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = $1, backend_handle = $2, max_attempts = $3, cluster_list = $4,
                fairshare = $5, site_name = $6, modified_at = $7,
                start_time = NULL, end_time = NULL
            WHERE id = $8 AND status = $9
            "#,
        )
        .bind(JobStatus::Submitted.as_str())
        .bind(&record.backend_handle)
        .bind(record.max_attempts)
        .bind(&record.cluster_list)
        .bind(&record.fairshare)
        .bind(&record.site_name)
        .bind(Utc::now())
        .bind(id)
        .bind(expected.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn count_by_batch_status(&self) -> Result<Vec<(String, JobStatus, i64)>, StoreError> {
        let rows = sqlx::query_as::<_, (String, String, i64)>(
            "SELECT batch_id, status, COUNT(*) FROM jobs GROUP BY batch_id, status",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(batch_id, status, count)| {
                string_to_status(&status).map(|status| (batch_id, status, count))
            })
            .collect()
    }

    async fn archive_batch(&self, batch_id: &str, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let mut tx = self.pool.begin().await?;

        let rows = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE batch_id = $1 FOR UPDATE"
        ))
        .bind(batch_id)
        .fetch_all(&mut *tx)
        .await?;
        let jobs = rows
            .into_iter()
            .map(TrackedJob::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        if jobs.is_empty() || !is_fully_terminal(jobs.iter().map(|job| job.status)) {
            tx.rollback().await?;
            return Ok(0);
        }

        for job in &jobs {
            let record = ArchivedJob::from_job(job, now);

            sqlx::query(
                r#"
                INSERT INTO jobs_archive (id, site_name, status, start_time, end_time, batch_id)
                VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT (id) DO NOTHING
                "#,
            )
            .bind(record.id)
            .bind(&record.site_name)
            .bind(record.status.as_str())
            .bind(record.start_time)
            .bind(record.end_time)
            .bind(&record.batch_id)
            .execute(&mut *tx)
            .await?;
        }

        let ids: Vec<Uuid> = jobs.iter().map(|job| job.id).collect();
        sqlx::query("DELETE FROM jobs WHERE id = ANY($1)")
            .bind(&ids)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(jobs.len())
    }
}

// =============================================================================
// Helper Types and Functions
// =============================================================================

/// Internal row type for mapping database results
#[derive(sqlx::FromRow)]
struct JobRow {
    id: Uuid,
    status: String,
    batch_id: String,
    description_path: String,
    template_path: String,
    backend_handle: Option<String>,
    max_attempts: Option<i32>,
    cluster_list: Option<String>,
    fairshare: Option<String>,
    site_name: Option<String>,
    created_at: DateTime<Utc>,
    modified_at: DateTime<Utc>,
    start_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
}

impl TryFrom<JobRow> for TrackedJob {
    type Error = StoreError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        Ok(TrackedJob {
            id: row.id,
            status: string_to_status(&row.status)?,
            batch_id: row.batch_id,
            description_path: row.description_path,
            template_path: row.template_path,
            backend_handle: row.backend_handle,
            max_attempts: row.max_attempts,
            cluster_list: row.cluster_list,
            fairshare: row.fairshare,
            site_name: row.site_name,
            created_at: row.created_at,
            modified_at: row.modified_at,
            start_time: row.start_time,
            end_time: row.end_time,
        })
    }
}

fn string_to_status(s: &str) -> Result<JobStatus, StoreError> {
    s.parse().map_err(StoreError::Other)
}
