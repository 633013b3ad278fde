use sqlx::{PgExecutor, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::models::{CorporateAction, CorporateActionQuery};

const ACTION_COLUMNS: &str =
    "id, symbol, action_type, action_date, ratio, amount, new_symbol, description, applied, created_at";

pub async fn insert<'e, E: PgExecutor<'e>>(
    executor: E,
    action: &CorporateAction,
) -> Result<CorporateAction, sqlx::Error> {
    sqlx::query_as::<_, CorporateAction>(&format!(
        "INSERT INTO corporate_actions
            (id, symbol, action_type, action_date, ratio, amount, new_symbol, description, applied, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
         RETURNING {}",
        ACTION_COLUMNS
    ))
    .bind(action.id)
    .bind(&action.symbol)
    .bind(action.action_type)
    .bind(action.action_date)
    .bind(&action.ratio)
    .bind(&action.amount)
    .bind(&action.new_symbol)
    .bind(&action.description)
    .bind(action.applied)
    .bind(action.created_at)
    .fetch_one(executor)
    .await
}

pub async fn find<'e, E: PgExecutor<'e>>(
    executor: E,
    id: Uuid,
) -> Result<Option<CorporateAction>, sqlx::Error> {
    sqlx::query_as::<_, CorporateAction>(&format!(
        "SELECT {} FROM corporate_actions WHERE id = $1",
        ACTION_COLUMNS
    ))
    .bind(id)
    .fetch_optional(executor)
    .await
}

pub async fn list<'e, E: PgExecutor<'e>>(
    executor: E,
    query: &CorporateActionQuery,
) -> Result<Vec<CorporateAction>, sqlx::Error> {
    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
        "SELECT {} FROM corporate_actions WHERE TRUE",
        ACTION_COLUMNS
    ));
    if let Some(symbol) = &query.symbol {
        builder.push(" AND symbol = ").push_bind(symbol.to_uppercase());
    }
    if let Some(applied) = query.applied {
        builder.push(" AND applied = ").push_bind(applied);
    }
    builder.push(" ORDER BY action_date DESC, created_at DESC");

    let rows = builder
        .build_query_as::<CorporateAction>()
        .fetch_all(executor)
        .await?;
    Ok(rows)
}

/// Oldest first so that chained actions (e.g. a split followed by a ticker
/// change) are proposed in the order they happened.
pub async fn list_unapplied<'e, E: PgExecutor<'e>>(
    executor: E,
) -> Result<Vec<CorporateAction>, sqlx::Error> {
    sqlx::query_as::<_, CorporateAction>(&format!(
        "SELECT {} FROM corporate_actions WHERE NOT applied ORDER BY action_date, created_at",
        ACTION_COLUMNS
    ))
    .fetch_all(executor)
    .await
}

/// Row lock serialising settlement of one action.
pub async fn lock<'e, E: PgExecutor<'e>>(
    executor: E,
    id: Uuid,
) -> Result<Option<CorporateAction>, sqlx::Error> {
    sqlx::query_as::<_, CorporateAction>(&format!(
        "SELECT {} FROM corporate_actions WHERE id = $1 FOR UPDATE",
        ACTION_COLUMNS
    ))
    .bind(id)
    .fetch_optional(executor)
    .await
}

pub async fn mark_applied<'e, E: PgExecutor<'e>>(
    executor: E,
    id: Uuid,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE corporate_actions SET applied = TRUE WHERE id = $1")
        .bind(id)
        .execute(executor)
        .await?;
    Ok(())
}
