use sqlx::{PgPool, postgres::PgPoolOptions};
use std::time::Duration;

pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    // Live jobs
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS jobs (
            id UUID PRIMARY KEY,
            status VARCHAR(20) NOT NULL,
            batch_id VARCHAR(255) NOT NULL,
            description_path TEXT NOT NULL,
            template_path TEXT NOT NULL,
            backend_handle VARCHAR(255),
            max_attempts INTEGER,
            cluster_list TEXT,
            fairshare VARCHAR(50),
            site_name VARCHAR(255),
            created_at TIMESTAMPTZ NOT NULL,
            modified_at TIMESTAMPTZ NOT NULL,
            start_time TIMESTAMPTZ,
            end_time TIMESTAMPTZ
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Jobs of archived batches
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS jobs_archive (
            id UUID PRIMARY KEY,
            site_name VARCHAR(255),
            status VARCHAR(20) NOT NULL,
            start_time TIMESTAMPTZ NOT NULL,
            end_time TIMESTAMPTZ NOT NULL,
            batch_id VARCHAR(255) NOT NULL,
            archived_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Submission queue drained by the execution backend
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS backend_jobs (
            id BIGSERIAL PRIMARY KEY,
            app_job_id UUID NOT NULL,
            state VARCHAR(20) NOT NULL DEFAULT 'tosubmit',
            description TEXT NOT NULL,
            cluster_list TEXT NOT NULL,
            max_attempts INTEGER NOT NULL,
            fairshare VARCHAR(50) NOT NULL,
            download_files TEXT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            modified_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_status_modified ON jobs(status, modified_at)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_batch_id ON jobs(batch_id)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_archive_batch_id ON jobs_archive(batch_id)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_backend_jobs_state ON backend_jobs(state)")
        .execute(pool)
        .await?;

    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_backend_jobs_app_job_id ON backend_jobs(app_job_id)",
    )
    .execute(pool)
    .await?;

    tracing::info!("Database migrations completed successfully");

    Ok(())
}
