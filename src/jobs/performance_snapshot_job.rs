use chrono::Utc;
use tracing::info;

use crate::errors::AppError;
use crate::services::job_scheduler_service::{JobContext, JobResult};
use crate::services::snapshot_service;

/// Records today's valuation for every portfolio with open holdings.
/// Re-running on the same day only fills in portfolios that were missed.
pub async fn run_performance_snapshots(ctx: JobContext) -> Result<JobResult, AppError> {
    let today = Utc::now().date_naive();
    info!("📊 Creating performance snapshots for {}", today);

    let run = snapshot_service::take_snapshots(&ctx.pool, &ctx.prices, today, &ctx.cancel).await?;
    info!(
        "📊 Snapshots: {} created, {} already present, {} failed",
        run.created, run.skipped, run.failed
    );

    Ok(JobResult::new(run.created, run.failed))
}
