use axum::Router;
use tower_http::cors::{Any, CorsLayer};

use crate::routes::{
    auth, corporate_actions, health, holdings, portfolios, proposals, snapshots, transactions,
};
use crate::state::AppState;

pub fn create_app(state: AppState) -> Router {
    let portfolio_routes = portfolios::router()
        .merge(transactions::router())
        .merge(holdings::router())
        .merge(snapshots::router())
        .merge(proposals::router());

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::<AppState>::new()
        .nest("/health", health::router())
        .nest("/api/auth", auth::router(state.clone()))
        .nest("/api/portfolios", portfolio_routes)
        .nest("/api/corporate-actions", corporate_actions::router())
        .layer(cors)
        .with_state(state)
}
