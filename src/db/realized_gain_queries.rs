use sqlx::{PgExecutor, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::decimal::Decimal;
use crate::models::{RealizedGain, RealizedGainQuery};

const GAIN_COLUMNS: &str = "id, portfolio_id, symbol, sell_transaction_id, lot_id, quantity, \
     cost_basis, proceeds, gain, acquired_on, sold_on, holding_period, created_at";

pub async fn insert<'e, E: PgExecutor<'e>>(
    executor: E,
    gain: &RealizedGain,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO realized_gains
            (id, portfolio_id, symbol, sell_transaction_id, lot_id, quantity, cost_basis,
             proceeds, gain, acquired_on, sold_on, holding_period, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
    )
    .bind(gain.id)
    .bind(gain.portfolio_id)
    .bind(&gain.symbol)
    .bind(gain.sell_transaction_id)
    .bind(gain.lot_id)
    .bind(&gain.quantity)
    .bind(&gain.cost_basis)
    .bind(&gain.proceeds)
    .bind(&gain.gain)
    .bind(gain.acquired_on)
    .bind(gain.sold_on)
    .bind(gain.holding_period)
    .bind(gain.created_at)
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn list<'e, E: PgExecutor<'e>>(
    executor: E,
    portfolio_id: Uuid,
    query: &RealizedGainQuery,
) -> Result<Vec<RealizedGain>, sqlx::Error> {
    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
        "SELECT {} FROM realized_gains WHERE portfolio_id = ",
        GAIN_COLUMNS
    ));
    builder.push_bind(portfolio_id);
    if let Some(year) = query.year {
        builder
            .push(" AND EXTRACT(YEAR FROM sold_on)::INT = ")
            .push_bind(year);
    }
    if let Some(symbol) = &query.symbol {
        builder.push(" AND symbol = ").push_bind(symbol.to_uppercase());
    }
    builder.push(" ORDER BY sold_on DESC, created_at, id");

    let rows = builder
        .build_query_as::<RealizedGain>()
        .fetch_all(executor)
        .await?;
    Ok(rows)
}

pub async fn total_for_portfolio<'e, E: PgExecutor<'e>>(
    executor: E,
    portfolio_id: Uuid,
) -> Result<Decimal, sqlx::Error> {
    sqlx::query_scalar("SELECT COALESCE(SUM(gain), 0) FROM realized_gains WHERE portfolio_id = $1")
        .bind(portfolio_id)
        .fetch_one(executor)
        .await
}
