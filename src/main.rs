use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use lotfolio::app;
use lotfolio::auth::JwtKeys;
use lotfolio::config::{AppConfig, MarketDataConfig};
use lotfolio::external::alphavantage::AlphaVantageProvider;
use lotfolio::external::price_provider::{NoPriceProvider, PriceProvider};
use lotfolio::external::twelvedata::TwelveDataProvider;
use lotfolio::jobs;
use lotfolio::logging::{init_logging, LoggingConfig};
use lotfolio::services::job_scheduler_service::JobSchedulerService;
use lotfolio::services::notification_service::build_mailer;
use lotfolio::services::price_service::CachedPriceProvider;
use lotfolio::services::rate_limiter::RateLimiter;
use lotfolio::state::AppState;

fn build_price_provider(config: &MarketDataConfig) -> Arc<dyn PriceProvider> {
    let api_key = config.api_key.clone().unwrap_or_default();
    match config.provider.to_lowercase().as_str() {
        "twelvedata" => {
            info!("📊 Using price provider: Twelve Data");
            Arc::new(TwelveDataProvider::new(api_key))
        }
        "alphavantage" => {
            info!("📊 Using price provider: Alpha Vantage");
            Arc::new(AlphaVantageProvider::new(api_key))
        }
        _ => {
            info!("📊 No price provider configured, positions are valued at cost");
            Arc::new(NoPriceProvider)
        }
    }
}

async fn shutdown_signal(token: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("⚠️  Failed to listen for shutdown signal: {}", e);
        return;
    }
    info!("🛑 Shutdown signal received");
    token.cancel();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("Failed to load configuration")?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

    // Initialize logging FIRST
    init_logging(LoggingConfig::from_settings(&config.logging))
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    let pool = PgPoolOptions::new()
        .max_connections(config.server.max_connections)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    sqlx::migrate!()
        .run(&pool)
        .await
        .context("Failed to run migrations")?;
    info!("✅ Database migrations applied");

    let shutdown = CancellationToken::new();
    let prices = Arc::new(CachedPriceProvider::new(
        build_price_provider(&config.market_data),
        config.market_data.cache_ttl_secs,
    ));
    let mailer = build_mailer(&config.email).context("Failed to configure email")?;
    let rate_limiter = Arc::new(RateLimiter::from_config(&config.rate_limit));

    let state = AppState {
        pool: pool.clone(),
        jwt: Arc::new(JwtKeys::new(&config.auth.jwt_secret)),
        config: Arc::new(config.clone()),
        mailer,
        prices: prices.clone(),
        rate_limiter: rate_limiter.clone(),
        shutdown: shutdown.clone(),
    };

    let scheduler = JobSchedulerService::new(pool, prices, shutdown.clone());
    jobs::register_jobs(&scheduler, &config.jobs)?;
    if config.jobs.enabled {
        scheduler.start().await?;
    } else {
        info!("Job scheduler disabled");
    }

    // Forget idle rate-limit windows once a minute.
    let cleanup_token = shutdown.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(60));
        loop {
            tokio::select! {
                _ = cleanup_token.cancelled() => break,
                _ = interval.tick() => rate_limiter.cleanup_expired(),
            }
        }
    });

    let app = app::create_app(state);
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;
    let listener = TcpListener::bind(&addr).await?;
    info!("🚀 Lotfolio backend running at http://{}/", addr);

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    scheduler.stop().await?;
    info!("👋 Lotfolio backend stopped");
    Ok(())
}
