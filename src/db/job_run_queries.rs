use sqlx::PgExecutor;

pub async fn record_start<'e, E: PgExecutor<'e>>(
    executor: E,
    job_name: &str,
) -> Result<i32, sqlx::Error> {
    sqlx::query_scalar(
        "INSERT INTO job_runs (job_name, status)
         VALUES ($1, 'running'::job_status)
         RETURNING id",
    )
    .bind(job_name)
    .fetch_one(executor)
    .await
}

pub async fn record_success<'e, E: PgExecutor<'e>>(
    executor: E,
    job_id: i32,
    items_processed: i32,
    items_failed: i32,
    duration_ms: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE job_runs
         SET completed_at = NOW(),
             status = 'success'::job_status,
             items_processed = $2,
             items_failed = $3,
             duration_ms = $4
         WHERE id = $1",
    )
    .bind(job_id)
    .bind(items_processed)
    .bind(items_failed)
    .bind(duration_ms)
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn record_failure<'e, E: PgExecutor<'e>>(
    executor: E,
    job_id: i32,
    error_message: &str,
    duration_ms: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE job_runs
         SET completed_at = NOW(),
             status = 'failed'::job_status,
             error_message = $2,
             duration_ms = $3
         WHERE id = $1",
    )
    .bind(job_id)
    .bind(error_message)
    .bind(duration_ms)
    .execute(executor)
    .await?;
    Ok(())
}
