use tracing::info;

use crate::errors::AppError;
use crate::services::corporate_action_service;
use crate::services::job_scheduler_service::{JobContext, JobResult};

pub async fn run_corporate_action_detection(ctx: JobContext) -> Result<JobResult, AppError> {
    info!("🔎 Detecting corporate actions...");

    let report = corporate_action_service::detect(&ctx.pool, &ctx.cancel).await?;
    info!(
        "📬 Scanned {} actions: {} proposals created, {} already proposed",
        report.actions_scanned, report.proposals_created, report.proposals_skipped
    );

    Ok(JobResult::new(report.proposals_created, 0))
}
