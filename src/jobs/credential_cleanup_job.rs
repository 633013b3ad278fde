use tracing::info;

use crate::errors::AppError;
use crate::services::auth_service;
use crate::services::job_scheduler_service::{JobContext, JobResult};

/// Deletes expired refresh credentials and password-reset tickets, then
/// drops the in-memory market-data cache so the next valuation refetches.
pub async fn run_credential_cleanup(ctx: JobContext) -> Result<JobResult, AppError> {
    info!("🧹 Cleaning up expired credentials...");

    let report = auth_service::cleanup_expired_credentials(&ctx.pool).await?;
    info!(
        "🗑️ Deleted {} refresh credentials and {} reset tickets",
        report.refresh_credentials, report.reset_tickets
    );

    let cleared = ctx.prices.clear_cache();
    info!("🗑️ Cleared {} cached prices", cleared);

    let removed = report.refresh_credentials + report.reset_tickets;
    Ok(JobResult::new(usize::try_from(removed).unwrap_or(usize::MAX), 0))
}
