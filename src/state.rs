use std::sync::Arc;

use sqlx::PgPool;
use tokio_util::sync::CancellationToken;

use crate::auth::JwtKeys;
use crate::config::AppConfig;
use crate::services::notification_service::Mailer;
use crate::services::price_service::CachedPriceProvider;
use crate::services::rate_limiter::RateLimiter;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<AppConfig>,
    pub jwt: Arc<JwtKeys>,
    pub mailer: Arc<dyn Mailer>,
    pub prices: Arc<CachedPriceProvider>,
    pub rate_limiter: Arc<RateLimiter>,
    /// Cancelled on shutdown; in-flight requests observe it.
    pub shutdown: CancellationToken,
}
