use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tracing::{info, warn};

use crate::state::AppState;

#[derive(Debug, Serialize)]
struct HealthStatus {
    status: &'static str,
    database: &'static str,
    price_provider: &'static str,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(health))
}

async fn health(State(state): State<AppState>) -> Json<HealthStatus> {
    info!("GET /health - Health check");
    let database = match sqlx::query("SELECT 1").execute(&state.pool).await {
        Ok(_) => "ok",
        Err(e) => {
            warn!("⚠️  Database health check failed: {}", e);
            "unavailable"
        }
    };
    Json(HealthStatus {
        status: if database == "ok" { "OK" } else { "DEGRADED" },
        database,
        price_provider: state.prices.provider_name(),
    })
}
