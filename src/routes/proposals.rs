use axum::extract::{Path, Query, State};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use http::StatusCode;
use serde::Deserialize;
use tracing::{error, info};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::cancellation::run_cancellable;
use crate::errors::AppError;
use crate::models::{ProposalDetails, ProposalQuery, ReviewProposal};
use crate::services::corporate_action_service;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RequestProposal {
    pub corporate_action_id: Uuid,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/:id/proposals", get(list_proposals).post(request_proposal))
        .route("/:id/proposals/:proposal_id", delete(delete_proposal))
        .route("/:id/proposals/:proposal_id/approve", post(approve_proposal))
        .route("/:id/proposals/:proposal_id/reject", post(reject_proposal))
}

pub async fn list_proposals(
    State(state): State<AppState>,
    user: AuthUser,
    Path(portfolio_id): Path<Uuid>,
    Query(query): Query<ProposalQuery>,
) -> Result<Json<Vec<ProposalDetails>>, AppError> {
    info!("GET /portfolios/{}/proposals - Listing proposals", portfolio_id);
    let proposals =
        corporate_action_service::list_proposals(&state.pool, user.user_id, portfolio_id, query.status)
            .await?;
    Ok(Json(proposals))
}

pub async fn request_proposal(
    State(state): State<AppState>,
    user: AuthUser,
    Path(portfolio_id): Path<Uuid>,
    Json(data): Json<RequestProposal>,
) -> Result<(StatusCode, Json<ProposalDetails>), AppError> {
    info!(
        "POST /portfolios/{}/proposals - Requesting proposal for action {}",
        portfolio_id, data.corporate_action_id
    );
    let proposal = corporate_action_service::request_proposal(
        &state.pool,
        user.user_id,
        portfolio_id,
        data.corporate_action_id,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(proposal)))
}

pub async fn approve_proposal(
    State(state): State<AppState>,
    user: AuthUser,
    Path((portfolio_id, proposal_id)): Path<(Uuid, Uuid)>,
    review: Option<Json<ReviewProposal>>,
) -> Result<Json<ProposalDetails>, AppError> {
    info!("POST /portfolios/{}/proposals/{}/approve - Approving proposal", portfolio_id, proposal_id);
    let review = review.map(|Json(review)| review).unwrap_or_default();
    let proposal = run_cancellable(
        &state.shutdown,
        "approve proposal",
        corporate_action_service::approve(&state.pool, user.user_id, portfolio_id, proposal_id, review),
    )
    .await
    .map_err(|e| {
        error!("Failed to approve proposal {}: {}", proposal_id, e);
        e
    })?;
    Ok(Json(proposal))
}

pub async fn reject_proposal(
    State(state): State<AppState>,
    user: AuthUser,
    Path((portfolio_id, proposal_id)): Path<(Uuid, Uuid)>,
    review: Option<Json<ReviewProposal>>,
) -> Result<Json<ProposalDetails>, AppError> {
    info!("POST /portfolios/{}/proposals/{}/reject - Rejecting proposal", portfolio_id, proposal_id);
    let review = review.map(|Json(review)| review).unwrap_or_default();
    let proposal =
        corporate_action_service::reject(&state.pool, user.user_id, portfolio_id, proposal_id, review)
            .await?;
    Ok(Json(proposal))
}

pub async fn delete_proposal(
    State(state): State<AppState>,
    user: AuthUser,
    Path((portfolio_id, proposal_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, AppError> {
    info!("DELETE /portfolios/{}/proposals/{} - Deleting proposal", portfolio_id, proposal_id);
    corporate_action_service::delete_pending(&state.pool, user.user_id, portfolio_id, proposal_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
