use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::errors::AppError;
use crate::models::{
    Holding, HoldingQuery, LotView, PortfolioSummary, RealizedGain, RealizedGainQuery,
    RealizedGainSummary, UnrealizedPosition,
};
use crate::services::holding_service;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct LotQuery {
    pub as_of: Option<NaiveDate>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SummaryQuery {
    pub year: Option<i32>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/:id/holdings", get(list_holdings))
        .route("/:id/holdings/:symbol/lots", get(list_lots))
        .route("/:id/realized-gains", get(list_realized_gains))
        .route("/:id/realized-gains/summary", get(realized_gain_summary))
        .route("/:id/unrealized", get(unrealized))
        .route("/:id/summary", get(summary))
}

pub async fn list_holdings(
    State(state): State<AppState>,
    user: AuthUser,
    Path(portfolio_id): Path<Uuid>,
    Query(query): Query<HoldingQuery>,
) -> Result<Json<Vec<Holding>>, AppError> {
    info!("GET /portfolios/{}/holdings - Listing holdings", portfolio_id);
    let holdings =
        holding_service::list_holdings(&state.pool, user.user_id, portfolio_id, query.include_closed)
            .await?;
    Ok(Json(holdings))
}

pub async fn list_lots(
    State(state): State<AppState>,
    user: AuthUser,
    Path((portfolio_id, symbol)): Path<(Uuid, String)>,
    Query(query): Query<LotQuery>,
) -> Result<Json<Vec<LotView>>, AppError> {
    info!("GET /portfolios/{}/holdings/{}/lots - Listing open lots", portfolio_id, symbol);
    let as_of = query.as_of.unwrap_or_else(|| Utc::now().date_naive());
    let lots =
        holding_service::list_lots(&state.pool, user.user_id, portfolio_id, &symbol, as_of).await?;
    Ok(Json(lots))
}

pub async fn list_realized_gains(
    State(state): State<AppState>,
    user: AuthUser,
    Path(portfolio_id): Path<Uuid>,
    Query(query): Query<RealizedGainQuery>,
) -> Result<Json<Vec<RealizedGain>>, AppError> {
    info!("GET /portfolios/{}/realized-gains - Listing realized gains", portfolio_id);
    let gains =
        holding_service::list_realized_gains(&state.pool, user.user_id, portfolio_id, &query)
            .await?;
    Ok(Json(gains))
}

pub async fn realized_gain_summary(
    State(state): State<AppState>,
    user: AuthUser,
    Path(portfolio_id): Path<Uuid>,
    Query(query): Query<SummaryQuery>,
) -> Result<Json<RealizedGainSummary>, AppError> {
    info!("GET /portfolios/{}/realized-gains/summary - Summarizing gains", portfolio_id);
    let summary =
        holding_service::realized_gain_summary(&state.pool, user.user_id, portfolio_id, query.year)
            .await?;
    Ok(Json(summary))
}

pub async fn unrealized(
    State(state): State<AppState>,
    user: AuthUser,
    Path(portfolio_id): Path<Uuid>,
) -> Result<Json<Vec<UnrealizedPosition>>, AppError> {
    info!("GET /portfolios/{}/unrealized - Valuing positions", portfolio_id);
    let positions =
        holding_service::unrealized(&state.pool, &state.prices, user.user_id, portfolio_id).await?;
    Ok(Json(positions))
}

pub async fn summary(
    State(state): State<AppState>,
    user: AuthUser,
    Path(portfolio_id): Path<Uuid>,
) -> Result<Json<PortfolioSummary>, AppError> {
    info!("GET /portfolios/{}/summary - Summarizing portfolio", portfolio_id);
    let summary =
        holding_service::summary(&state.pool, &state.prices, user.user_id, portfolio_id).await?;
    Ok(Json(summary))
}
