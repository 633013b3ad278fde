use chrono::NaiveDate;
use sqlx::{PgExecutor, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::models::{PerformanceSnapshot, SnapshotQuery};

const SNAPSHOT_COLUMNS: &str = "id, portfolio_id, snapshot_date, total_value, total_cost_basis, \
     total_return, return_pct, day_change, created_at";

/// Insert-only; a second snapshot for the same (portfolio, date) is ignored.
pub async fn insert_if_absent<'e, E: PgExecutor<'e>>(
    executor: E,
    snapshot: &PerformanceSnapshot,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO performance_snapshots
            (id, portfolio_id, snapshot_date, total_value, total_cost_basis,
             total_return, return_pct, day_change, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
         ON CONFLICT (portfolio_id, snapshot_date) DO NOTHING",
    )
    .bind(snapshot.id)
    .bind(snapshot.portfolio_id)
    .bind(snapshot.snapshot_date)
    .bind(&snapshot.total_value)
    .bind(&snapshot.total_cost_basis)
    .bind(&snapshot.total_return)
    .bind(&snapshot.return_pct)
    .bind(&snapshot.day_change)
    .bind(snapshot.created_at)
    .execute(executor)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn latest_before<'e, E: PgExecutor<'e>>(
    executor: E,
    portfolio_id: Uuid,
    date: NaiveDate,
) -> Result<Option<PerformanceSnapshot>, sqlx::Error> {
    sqlx::query_as::<_, PerformanceSnapshot>(&format!(
        "SELECT {} FROM performance_snapshots
         WHERE portfolio_id = $1 AND snapshot_date < $2
         ORDER BY snapshot_date DESC
         LIMIT 1",
        SNAPSHOT_COLUMNS
    ))
    .bind(portfolio_id)
    .bind(date)
    .fetch_optional(executor)
    .await
}

pub async fn list<'e, E: PgExecutor<'e>>(
    executor: E,
    portfolio_id: Uuid,
    query: &SnapshotQuery,
) -> Result<Vec<PerformanceSnapshot>, sqlx::Error> {
    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
        "SELECT {} FROM performance_snapshots WHERE portfolio_id = ",
        SNAPSHOT_COLUMNS
    ));
    builder.push_bind(portfolio_id);
    if let Some(from) = query.from {
        builder.push(" AND snapshot_date >= ").push_bind(from);
    }
    if let Some(to) = query.to {
        builder.push(" AND snapshot_date <= ").push_bind(to);
    }
    builder.push(" ORDER BY snapshot_date");

    let rows = builder
        .build_query_as::<PerformanceSnapshot>()
        .fetch_all(executor)
        .await?;
    Ok(rows)
}
