use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use http::StatusCode;
use tracing::{error, info};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::cancellation::run_cancellable;
use crate::errors::AppError;
use crate::models::{CreatePortfolio, Portfolio, UpdatePortfolio};
use crate::services::portfolio_service;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(fetch_portfolios).post(create_portfolio))
        .route(
            "/:id",
            get(get_portfolio).put(update_portfolio).delete(delete_portfolio),
        )
}

pub async fn create_portfolio(
    State(state): State<AppState>,
    user: AuthUser,
    Json(data): Json<CreatePortfolio>,
) -> Result<(StatusCode, Json<Portfolio>), AppError> {
    info!("POST /portfolios - Creating new portfolio");
    let portfolio = portfolio_service::create(&state.pool, user.user_id, data)
        .await
        .map_err(|e| {
            error!("Failed to create portfolio: {}", e);
            e
        })?;
    Ok((StatusCode::CREATED, Json(portfolio)))
}

pub async fn fetch_portfolios(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<Portfolio>>, AppError> {
    info!("GET /portfolios - Fetching portfolios for {}", user.user_id);
    let portfolios = portfolio_service::list(&state.pool, user.user_id).await?;
    Ok(Json(portfolios))
}

pub async fn get_portfolio(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Portfolio>, AppError> {
    info!("GET /portfolios/{} - Fetching portfolio", id);
    let portfolio = portfolio_service::get(&state.pool, user.user_id, id).await?;
    Ok(Json(portfolio))
}

pub async fn update_portfolio(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(data): Json<UpdatePortfolio>,
) -> Result<Json<Portfolio>, AppError> {
    info!("PUT /portfolios/{} - Updating portfolio", id);
    let portfolio = portfolio_service::update(&state.pool, user.user_id, id, data)
        .await
        .map_err(|e| {
            error!("Failed to update portfolio {}: {}", id, e);
            e
        })?;
    Ok(Json(portfolio))
}

pub async fn delete_portfolio(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    info!("DELETE /portfolios/{} - Deleting portfolio", id);
    run_cancellable(
        &state.shutdown,
        "delete portfolio",
        portfolio_service::delete(&state.pool, user.user_id, id),
    )
    .await
    .map_err(|e| {
        error!("Failed to delete portfolio {}: {}", id, e);
        e
    })?;
    Ok(StatusCode::NO_CONTENT)
}
