use sqlx::{PgConnection, PgExecutor};
use uuid::Uuid;

use crate::ledger::LotChanges;
use crate::models::TaxLot;

const LOT_COLUMNS: &str = "id, portfolio_id, symbol, purchase_date, quantity, original_quantity, \
     cost_basis, transaction_id, adjusted_by_action_id, created_at";

pub async fn open_lots<'e, E: PgExecutor<'e>>(
    executor: E,
    portfolio_id: Uuid,
    symbol: &str,
) -> Result<Vec<TaxLot>, sqlx::Error> {
    sqlx::query_as::<_, TaxLot>(&format!(
        "SELECT {} FROM tax_lots
         WHERE portfolio_id = $1 AND symbol = $2 AND quantity > 0
         ORDER BY purchase_date, id",
        LOT_COLUMNS
    ))
    .bind(portfolio_id)
    .bind(symbol)
    .fetch_all(executor)
    .await
}

pub async fn find_by_transaction<'e, E: PgExecutor<'e>>(
    executor: E,
    transaction_id: Uuid,
) -> Result<Vec<TaxLot>, sqlx::Error> {
    sqlx::query_as::<_, TaxLot>(&format!(
        "SELECT {} FROM tax_lots WHERE transaction_id = $1 ORDER BY id",
        LOT_COLUMNS
    ))
    .bind(transaction_id)
    .fetch_all(executor)
    .await
}

pub async fn insert<'e, E: PgExecutor<'e>>(executor: E, lot: &TaxLot) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO tax_lots
            (id, portfolio_id, symbol, purchase_date, quantity, original_quantity,
             cost_basis, transaction_id, adjusted_by_action_id, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
    )
    .bind(lot.id)
    .bind(lot.portfolio_id)
    .bind(&lot.symbol)
    .bind(lot.purchase_date)
    .bind(&lot.quantity)
    .bind(&lot.original_quantity)
    .bind(&lot.cost_basis)
    .bind(lot.transaction_id)
    .bind(lot.adjusted_by_action_id)
    .bind(lot.created_at)
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn update<'e, E: PgExecutor<'e>>(executor: E, lot: &TaxLot) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE tax_lots
         SET symbol = $2, quantity = $3, original_quantity = $4, cost_basis = $5,
             adjusted_by_action_id = $6
         WHERE id = $1",
    )
    .bind(lot.id)
    .bind(&lot.symbol)
    .bind(&lot.quantity)
    .bind(&lot.original_quantity)
    .bind(&lot.cost_basis)
    .bind(lot.adjusted_by_action_id)
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn delete<'e, E: PgExecutor<'e>>(executor: E, id: Uuid) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM tax_lots WHERE id = $1")
        .bind(id)
        .execute(executor)
        .await?;
    Ok(result.rows_affected())
}

/// Writes back everything a position book recorded.
pub async fn apply_changes(
    conn: &mut PgConnection,
    changes: &LotChanges<'_>,
) -> Result<(), sqlx::Error> {
    for lot_id in changes.deleted {
        delete(&mut *conn, *lot_id).await?;
    }
    for lot in &changes.updated {
        update(&mut *conn, lot).await?;
    }
    for lot in &changes.inserted {
        insert(&mut *conn, lot).await?;
    }
    Ok(())
}
