use axum::extract::State;
use axum::routing::{get, post};
use axum::{middleware, Json, Router};
use http::StatusCode;
use serde::Serialize;
use tracing::{error, info};

use crate::auth::AuthUser;
use crate::cancellation::run_cancellable;
use crate::errors::AppError;
use crate::models::{
    AccessToken, AuthSession, CompletePasswordResetRequest, LoginRequest, LogoutRequest,
    PasswordResetRequest, RefreshRequest, RegisterRequest, User,
};
use crate::services::auth_service::{self, SessionIssuer};
use crate::services::rate_limiter::limit_by_ip;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct RevokedSessions {
    pub revoked: u64,
}

pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/refresh", post(refresh))
        .route("/logout", post(logout))
        .route("/logout-all", post(logout_all))
        .route("/password-reset", post(initiate_password_reset))
        .route("/password-reset/complete", post(complete_password_reset))
        .route("/me", get(me))
        .route_layer(middleware::from_fn_with_state(state, limit_by_ip))
}

fn issuer(state: &AppState) -> SessionIssuer<'_> {
    SessionIssuer {
        keys: &state.jwt,
        settings: &state.config.auth,
    }
}

pub async fn register(
    State(state): State<AppState>,
    Json(data): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthSession>), AppError> {
    info!("POST /auth/register - Registering new user");
    let session = run_cancellable(
        &state.shutdown,
        "register",
        auth_service::register(&state.pool, issuer(&state), data),
    )
    .await
    .map_err(|e| {
        error!("Failed to register user: {}", e);
        e
    })?;
    Ok((StatusCode::CREATED, Json(session)))
}

pub async fn login(
    State(state): State<AppState>,
    Json(data): Json<LoginRequest>,
) -> Result<Json<AuthSession>, AppError> {
    info!("POST /auth/login - Logging in");
    let session = run_cancellable(
        &state.shutdown,
        "login",
        auth_service::login(&state.pool, issuer(&state), data),
    )
    .await?;
    Ok(Json(session))
}

pub async fn refresh(
    State(state): State<AppState>,
    Json(data): Json<RefreshRequest>,
) -> Result<Json<AccessToken>, AppError> {
    info!("POST /auth/refresh - Refreshing access token");
    let token = auth_service::refresh(&state.pool, issuer(&state), &data.refresh_token).await?;
    Ok(Json(token))
}

pub async fn logout(
    State(state): State<AppState>,
    Json(data): Json<LogoutRequest>,
) -> Result<StatusCode, AppError> {
    info!("POST /auth/logout - Revoking refresh token");
    auth_service::logout(&state.pool, &data.refresh_token).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn logout_all(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<RevokedSessions>, AppError> {
    info!("POST /auth/logout-all - Revoking all sessions for {}", user.user_id);
    let revoked = auth_service::logout_all(&state.pool, user.user_id).await?;
    Ok(Json(RevokedSessions { revoked }))
}

pub async fn initiate_password_reset(
    State(state): State<AppState>,
    Json(data): Json<PasswordResetRequest>,
) -> Result<StatusCode, AppError> {
    info!("POST /auth/password-reset - Password reset requested");
    auth_service::initiate_password_reset(
        &state.pool,
        state.mailer.as_ref(),
        &state.config.auth,
        &data.email,
    )
    .await?;
    Ok(StatusCode::ACCEPTED)
}

pub async fn complete_password_reset(
    State(state): State<AppState>,
    Json(data): Json<CompletePasswordResetRequest>,
) -> Result<StatusCode, AppError> {
    info!("POST /auth/password-reset/complete - Completing password reset");
    run_cancellable(
        &state.shutdown,
        "complete password reset",
        auth_service::complete_password_reset(&state.pool, &data.token, data.new_password),
    )
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn me(State(state): State<AppState>, user: AuthUser) -> Result<Json<User>, AppError> {
    info!("GET /auth/me - Fetching user {}", user.user_id);
    let user = auth_service::current_user(&state.pool, user.user_id).await?;
    Ok(Json(user))
}
