//! Background jobs run by the job scheduler service.
//!
//! - `credential_cleanup_job` - removes expired refresh credentials and reset tickets
//! - `corporate_action_detection_job` - proposes unapplied corporate actions to holders
//! - `performance_snapshot_job` - records one daily valuation per portfolio
//!
//! Each job is safe to re-run: cleanup deletes only expired rows, detection
//! skips portfolios that already have a proposal, snapshots are insert-only.

use crate::config::JobsConfig;
use crate::errors::AppError;
use crate::services::job_scheduler_service::JobSchedulerService;

pub mod corporate_action_detection_job;
pub mod credential_cleanup_job;
pub mod performance_snapshot_job;

pub const CREDENTIAL_CLEANUP: &str = "credential_cleanup";
pub const CORPORATE_ACTION_DETECTION: &str = "corporate_action_detection";
pub const PERFORMANCE_SNAPSHOTS: &str = "performance_snapshots";

pub fn register_jobs(scheduler: &JobSchedulerService, config: &JobsConfig) -> Result<(), AppError> {
    scheduler.register(
        CREDENTIAL_CLEANUP,
        &config.credential_cleanup,
        credential_cleanup_job::run_credential_cleanup,
    )?;
    scheduler.register(
        CORPORATE_ACTION_DETECTION,
        &config.corporate_action_detection,
        corporate_action_detection_job::run_corporate_action_detection,
    )?;
    scheduler.register(
        PERFORMANCE_SNAPSHOTS,
        &config.performance_snapshots,
        performance_snapshot_job::run_performance_snapshots,
    )?;
    Ok(())
}
