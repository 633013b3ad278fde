use axum::extract::{Path, Query, State};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use http::StatusCode;
use tracing::{error, info};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::cancellation::run_cancellable;
use crate::errors::AppError;
use crate::models::{
    CreateTransaction, DeletedImport, ImportResult, ImportTransactions, RecordedTransaction,
    Transaction, TransactionQuery,
};
use crate::services::transaction_service;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/:id/transactions", get(list_transactions).post(create_transaction))
        .route("/:id/transactions/import", post(import_transactions))
        .route("/:id/transactions/:tx_id", delete(delete_transaction))
        .route("/:id/imports/:batch_id", delete(delete_import))
}

pub async fn list_transactions(
    State(state): State<AppState>,
    user: AuthUser,
    Path(portfolio_id): Path<Uuid>,
    Query(query): Query<TransactionQuery>,
) -> Result<Json<Vec<Transaction>>, AppError> {
    info!("GET /portfolios/{}/transactions - Listing transactions", portfolio_id);
    let transactions =
        transaction_service::list(&state.pool, user.user_id, portfolio_id, &query).await?;
    Ok(Json(transactions))
}

pub async fn create_transaction(
    State(state): State<AppState>,
    user: AuthUser,
    Path(portfolio_id): Path<Uuid>,
    Json(data): Json<CreateTransaction>,
) -> Result<(StatusCode, Json<RecordedTransaction>), AppError> {
    info!(
        "POST /portfolios/{}/transactions - Recording {:?} {}",
        portfolio_id, data.transaction_type, data.symbol
    );
    let recorded = run_cancellable(
        &state.shutdown,
        "record transaction",
        transaction_service::record(&state.pool, user.user_id, portfolio_id, data),
    )
    .await
    .map_err(|e| {
        error!("Failed to record transaction in {}: {}", portfolio_id, e);
        e
    })?;
    Ok((StatusCode::CREATED, Json(recorded)))
}

pub async fn import_transactions(
    State(state): State<AppState>,
    user: AuthUser,
    Path(portfolio_id): Path<Uuid>,
    Json(data): Json<ImportTransactions>,
) -> Result<(StatusCode, Json<ImportResult>), AppError> {
    info!(
        "POST /portfolios/{}/transactions/import - Importing {} transactions",
        portfolio_id,
        data.transactions.len()
    );
    let result = run_cancellable(
        &state.shutdown,
        "import transactions",
        transaction_service::import(&state.pool, user.user_id, portfolio_id, data.transactions),
    )
    .await
    .map_err(|e| {
        error!("Failed to import transactions into {}: {}", portfolio_id, e);
        e
    })?;
    Ok((StatusCode::CREATED, Json(result)))
}

pub async fn delete_transaction(
    State(state): State<AppState>,
    user: AuthUser,
    Path((portfolio_id, tx_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, AppError> {
    info!("DELETE /portfolios/{}/transactions/{} - Deleting transaction", portfolio_id, tx_id);
    run_cancellable(
        &state.shutdown,
        "delete transaction",
        transaction_service::delete(&state.pool, user.user_id, portfolio_id, tx_id),
    )
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_import(
    State(state): State<AppState>,
    user: AuthUser,
    Path((portfolio_id, batch_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<DeletedImport>, AppError> {
    info!("DELETE /portfolios/{}/imports/{} - Deleting import batch", portfolio_id, batch_id);
    let deleted = run_cancellable(
        &state.shutdown,
        "delete import",
        transaction_service::delete_import(&state.pool, user.user_id, portfolio_id, batch_id),
    )
    .await?;
    Ok(Json(deleted))
}
