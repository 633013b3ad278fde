use sqlx::PgExecutor;
use uuid::Uuid;

use crate::ledger::HoldingTotals;
use crate::models::Holding;

const HOLDING_COLUMNS: &str =
    "id, portfolio_id, symbol, quantity, cost_basis, avg_cost_price, created_at, updated_at";

/// Creates an empty holding row if none exists, so it can be locked.
pub async fn ensure_exists<'e, E: PgExecutor<'e>>(
    executor: E,
    portfolio_id: Uuid,
    symbol: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO holdings (id, portfolio_id, symbol)
         VALUES ($1, $2, $3)
         ON CONFLICT (portfolio_id, symbol) DO NOTHING",
    )
    .bind(Uuid::now_v7())
    .bind(portfolio_id)
    .bind(symbol)
    .execute(executor)
    .await?;
    Ok(())
}

/// Row lock serializing every ledger mutation on (portfolio, symbol) until
/// the enclosing transaction ends.
pub async fn lock<'e, E: PgExecutor<'e>>(
    executor: E,
    portfolio_id: Uuid,
    symbol: &str,
) -> Result<Holding, sqlx::Error> {
    sqlx::query_as::<_, Holding>(&format!(
        "SELECT {} FROM holdings WHERE portfolio_id = $1 AND symbol = $2 FOR UPDATE",
        HOLDING_COLUMNS
    ))
    .bind(portfolio_id)
    .bind(symbol)
    .fetch_one(executor)
    .await
}

pub async fn update_totals<'e, E: PgExecutor<'e>>(
    executor: E,
    id: Uuid,
    totals: &HoldingTotals,
) -> Result<Holding, sqlx::Error> {
    sqlx::query_as::<_, Holding>(&format!(
        "UPDATE holdings
         SET quantity = $2, cost_basis = $3, avg_cost_price = $4, updated_at = NOW()
         WHERE id = $1
         RETURNING {}",
        HOLDING_COLUMNS
    ))
    .bind(id)
    .bind(&totals.quantity)
    .bind(&totals.cost_basis)
    .bind(&totals.avg_cost_price)
    .fetch_one(executor)
    .await
}

pub async fn list<'e, E: PgExecutor<'e>>(
    executor: E,
    portfolio_id: Uuid,
    include_closed: bool,
) -> Result<Vec<Holding>, sqlx::Error> {
    sqlx::query_as::<_, Holding>(&format!(
        "SELECT {} FROM holdings
         WHERE portfolio_id = $1 AND ($2 OR quantity > 0)
         ORDER BY symbol",
        HOLDING_COLUMNS
    ))
    .bind(portfolio_id)
    .bind(include_closed)
    .fetch_all(executor)
    .await
}

/// Open holdings of `symbol` across every portfolio.
pub async fn list_open_by_symbol<'e, E: PgExecutor<'e>>(
    executor: E,
    symbol: &str,
) -> Result<Vec<Holding>, sqlx::Error> {
    sqlx::query_as::<_, Holding>(&format!(
        "SELECT {} FROM holdings WHERE symbol = $1 AND quantity > 0 ORDER BY portfolio_id",
        HOLDING_COLUMNS
    ))
    .bind(symbol)
    .fetch_all(executor)
    .await
}

pub async fn find<'e, E: PgExecutor<'e>>(
    executor: E,
    portfolio_id: Uuid,
    symbol: &str,
) -> Result<Option<Holding>, sqlx::Error> {
    sqlx::query_as::<_, Holding>(&format!(
        "SELECT {} FROM holdings WHERE portfolio_id = $1 AND symbol = $2",
        HOLDING_COLUMNS
    ))
    .bind(portfolio_id)
    .bind(symbol)
    .fetch_optional(executor)
    .await
}
