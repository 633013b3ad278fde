use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use tracing::info;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::errors::AppError;
use crate::models::{PerformanceSnapshot, SnapshotQuery};
use crate::services::snapshot_service;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/:id/snapshots", get(list_snapshots))
}

pub async fn list_snapshots(
    State(state): State<AppState>,
    user: AuthUser,
    Path(portfolio_id): Path<Uuid>,
    Query(query): Query<SnapshotQuery>,
) -> Result<Json<Vec<PerformanceSnapshot>>, AppError> {
    info!("GET /portfolios/{}/snapshots - Listing snapshots", portfolio_id);
    let snapshots = snapshot_service::list(&state.pool, user.user_id, portfolio_id, &query).await?;
    Ok(Json(snapshots))
}
