use sqlx::PgExecutor;
use uuid::Uuid;

use crate::models::{CostBasisMethod, Portfolio};

const PORTFOLIO_COLUMNS: &str =
    "id, user_id, name, description, base_currency, cost_basis_method, created_at, updated_at";

pub async fn insert<'e, E: PgExecutor<'e>>(
    executor: E,
    portfolio: &Portfolio,
) -> Result<Portfolio, sqlx::Error> {
    sqlx::query_as::<_, Portfolio>(&format!(
        "INSERT INTO portfolios
            (id, user_id, name, description, base_currency, cost_basis_method, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
         RETURNING {}",
        PORTFOLIO_COLUMNS
    ))
    .bind(portfolio.id)
    .bind(portfolio.user_id)
    .bind(&portfolio.name)
    .bind(&portfolio.description)
    .bind(&portfolio.base_currency)
    .bind(portfolio.cost_basis_method)
    .bind(portfolio.created_at)
    .bind(portfolio.updated_at)
    .fetch_one(executor)
    .await
}

pub async fn fetch_for_user<'e, E: PgExecutor<'e>>(
    executor: E,
    user_id: Uuid,
) -> Result<Vec<Portfolio>, sqlx::Error> {
    sqlx::query_as::<_, Portfolio>(&format!(
        "SELECT {} FROM portfolios WHERE user_id = $1 ORDER BY created_at DESC",
        PORTFOLIO_COLUMNS
    ))
    .bind(user_id)
    .fetch_all(executor)
    .await
}

pub async fn fetch_one<'e, E: PgExecutor<'e>>(
    executor: E,
    id: Uuid,
) -> Result<Option<Portfolio>, sqlx::Error> {
    sqlx::query_as::<_, Portfolio>(&format!(
        "SELECT {} FROM portfolios WHERE id = $1",
        PORTFOLIO_COLUMNS
    ))
    .bind(id)
    .fetch_optional(executor)
    .await
}

pub async fn update<'e, E: PgExecutor<'e>>(
    executor: E,
    id: Uuid,
    name: &str,
    description: Option<&str>,
    cost_basis_method: CostBasisMethod,
) -> Result<Option<Portfolio>, sqlx::Error> {
    sqlx::query_as::<_, Portfolio>(&format!(
        "UPDATE portfolios
         SET name = $2, description = $3, cost_basis_method = $4, updated_at = NOW()
         WHERE id = $1
         RETURNING {}",
        PORTFOLIO_COLUMNS
    ))
    .bind(id)
    .bind(name)
    .bind(description)
    .bind(cost_basis_method)
    .fetch_optional(executor)
    .await
}

pub async fn delete<'e, E: PgExecutor<'e>>(executor: E, id: Uuid) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM portfolios WHERE id = $1")
        .bind(id)
        .execute(executor)
        .await?;
    Ok(result.rows_affected())
}

/// Serializes proposal detection per portfolio without blocking foreign
/// keys that reference the row.
pub async fn lock_for_detection<'e, E: PgExecutor<'e>>(
    executor: E,
    id: Uuid,
) -> Result<bool, sqlx::Error> {
    let row: Option<Uuid> =
        sqlx::query_scalar("SELECT id FROM portfolios WHERE id = $1 FOR NO KEY UPDATE")
            .bind(id)
            .fetch_optional(executor)
            .await?;
    Ok(row.is_some())
}

/// Portfolios holding at least one open position.
pub async fn fetch_ids_with_holdings<'e, E: PgExecutor<'e>>(
    executor: E,
) -> Result<Vec<Uuid>, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT DISTINCT portfolio_id FROM holdings WHERE quantity > 0 ORDER BY portfolio_id",
    )
    .fetch_all(executor)
    .await
}
