use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use http::StatusCode;
use tracing::{error, info};

use crate::auth::AuthUser;
use crate::cancellation::run_cancellable;
use crate::errors::AppError;
use crate::models::{CorporateAction, CorporateActionQuery, CreateCorporateAction, DetectionReport};
use crate::services::corporate_action_service;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_actions).post(create_action))
        .route("/detect", post(detect))
}

pub async fn create_action(
    State(state): State<AppState>,
    user: AuthUser,
    Json(data): Json<CreateCorporateAction>,
) -> Result<(StatusCode, Json<CorporateAction>), AppError> {
    info!(
        "POST /corporate-actions - {:?} {} submitted by {}",
        data.action_type, data.symbol, user.user_id
    );
    let action = corporate_action_service::create(&state.pool, data)
        .await
        .map_err(|e| {
            error!("Failed to create corporate action: {}", e);
            e
        })?;
    Ok((StatusCode::CREATED, Json(action)))
}

pub async fn list_actions(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(query): Query<CorporateActionQuery>,
) -> Result<Json<Vec<CorporateAction>>, AppError> {
    info!("GET /corporate-actions - Listing corporate actions");
    let actions = corporate_action_service::list(&state.pool, &query).await?;
    Ok(Json(actions))
}

pub async fn detect(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<DetectionReport>, AppError> {
    info!("POST /corporate-actions/detect - Detection run requested by {}", user.user_id);
    let report = run_cancellable(
        &state.shutdown,
        "detect corporate actions",
        corporate_action_service::detect(&state.pool, &state.shutdown),
    )
    .await?;
    Ok(Json(report))
}
