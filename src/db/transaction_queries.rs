use sqlx::{PgExecutor, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::models::{Transaction, TransactionQuery};

const TRANSACTION_COLUMNS: &str = "id, portfolio_id, transaction_type, symbol, transaction_date, \
     quantity, price, commission, amount, currency, import_batch_id, corporate_action_id, notes, created_at";

const DEFAULT_LIMIT: i64 = 100;
const MAX_LIMIT: i64 = 1000;

pub async fn insert<'e, E: PgExecutor<'e>>(
    executor: E,
    transaction: &Transaction,
) -> Result<Transaction, sqlx::Error> {
    sqlx::query_as::<_, Transaction>(&format!(
        "INSERT INTO transactions
            (id, portfolio_id, transaction_type, symbol, transaction_date, quantity, price,
             commission, amount, currency, import_batch_id, corporate_action_id, notes, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
         RETURNING {}",
        TRANSACTION_COLUMNS
    ))
    .bind(transaction.id)
    .bind(transaction.portfolio_id)
    .bind(transaction.transaction_type)
    .bind(&transaction.symbol)
    .bind(transaction.transaction_date)
    .bind(&transaction.quantity)
    .bind(&transaction.price)
    .bind(&transaction.commission)
    .bind(&transaction.amount)
    .bind(&transaction.currency)
    .bind(transaction.import_batch_id)
    .bind(transaction.corporate_action_id)
    .bind(&transaction.notes)
    .bind(transaction.created_at)
    .fetch_one(executor)
    .await
}

pub async fn find<'e, E: PgExecutor<'e>>(
    executor: E,
    portfolio_id: Uuid,
    id: Uuid,
) -> Result<Option<Transaction>, sqlx::Error> {
    sqlx::query_as::<_, Transaction>(&format!(
        "SELECT {} FROM transactions WHERE portfolio_id = $1 AND id = $2",
        TRANSACTION_COLUMNS
    ))
    .bind(portfolio_id)
    .bind(id)
    .fetch_optional(executor)
    .await
}

/// Newest first, filtered by symbol and inclusive date range.
pub async fn list<'e, E: PgExecutor<'e>>(
    executor: E,
    portfolio_id: Uuid,
    query: &TransactionQuery,
) -> Result<Vec<Transaction>, sqlx::Error> {
    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
        "SELECT {} FROM transactions WHERE portfolio_id = ",
        TRANSACTION_COLUMNS
    ));
    builder.push_bind(portfolio_id);
    if let Some(symbol) = &query.symbol {
        builder.push(" AND symbol = ").push_bind(symbol.to_uppercase());
    }
    if let Some(from) = query.from {
        builder.push(" AND transaction_date >= ").push_bind(from);
    }
    if let Some(to) = query.to {
        builder.push(" AND transaction_date <= ").push_bind(to);
    }
    builder.push(" ORDER BY transaction_date DESC, id DESC LIMIT ");
    builder.push_bind(query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT));
    builder.push(" OFFSET ");
    builder.push_bind(query.offset.unwrap_or(0).max(0));

    let rows = builder
        .build_query_as::<Transaction>()
        .fetch_all(executor)
        .await?;
    Ok(rows)
}

pub async fn list_by_batch<'e, E: PgExecutor<'e>>(
    executor: E,
    portfolio_id: Uuid,
    import_batch_id: Uuid,
) -> Result<Vec<Transaction>, sqlx::Error> {
    sqlx::query_as::<_, Transaction>(&format!(
        "SELECT {} FROM transactions
         WHERE portfolio_id = $1 AND import_batch_id = $2
         ORDER BY transaction_date, id",
        TRANSACTION_COLUMNS
    ))
    .bind(portfolio_id)
    .bind(import_batch_id)
    .fetch_all(executor)
    .await
}

pub async fn delete<'e, E: PgExecutor<'e>>(executor: E, id: Uuid) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM transactions WHERE id = $1")
        .bind(id)
        .execute(executor)
        .await?;
    Ok(result.rows_affected())
}
