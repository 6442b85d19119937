//! Table-backed submission queue
//!
//! Submissions are rows in `backend_jobs`; the backend's own submitter picks
//! up rows in state `tosubmit` and `toresubmit`. A job owns at most one row,
//! so sending it again returns the handle it already has.

use async_trait::async_trait;
use sqlx::PgPool;

use super::{BackendError, BackendHandle, ExecutionBackend, Submission};

#[derive(Clone)]
pub struct QueueBackend {
    pool: PgPool,
}

impl QueueBackend {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ExecutionBackend for QueueBackend {
    async fn submit(&self, submission: &Submission) -> Result<BackendHandle, BackendError> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO backend_jobs (app_job_id, description, cluster_list, max_attempts,
                                      fairshare, download_files)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (app_job_id) DO UPDATE
                SET description = EXCLUDED.description,
                    cluster_list = EXCLUDED.cluster_list,
                    max_attempts = EXCLUDED.max_attempts,
                    fairshare = EXCLUDED.fairshare,
                    modified_at = NOW()
            RETURNING id
            "#,
        )
        .bind(submission.job_id)
        .bind(&submission.description)
        .bind(&submission.cluster_list)
        .bind(submission.max_attempts)
        .bind(&submission.fairshare)
        .bind(&submission.download_files)
        .fetch_one(&self.pool)
        .await?;

        tracing::debug!("Queued job {} as backend job {}", submission.job_id, id);

        Ok(BackendHandle(id.to_string()))
    }

    async fn resubmit(&self, handle: &BackendHandle) -> Result<(), BackendError> {
        let id: i64 = handle
            .0
            .parse()
            .map_err(|_| BackendError::Rejected(format!("malformed handle {handle}")))?;

        let result = sqlx::query(
            "UPDATE backend_jobs SET state = 'toresubmit', modified_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(BackendError::Rejected(format!("unknown handle {handle}")));
        }

        Ok(())
    }
}
