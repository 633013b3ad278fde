use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use sqlx::PgPool;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

use crate::db::job_run_queries;
use crate::errors::AppError;
use crate::services::price_service::CachedPriceProvider;

// Context passed to job functions
#[derive(Clone)]
pub struct JobContext {
    pub pool: PgPool,
    pub prices: Arc<CachedPriceProvider>,
    /// Child of the scheduler token; cancelled by `stop`.
    pub cancel: CancellationToken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobResult {
    pub items_processed: i32,
    pub items_failed: i32,
}

impl JobResult {
    pub fn new(items_processed: usize, items_failed: usize) -> Self {
        Self {
            items_processed: i32::try_from(items_processed).unwrap_or(i32::MAX),
            items_failed: i32::try_from(items_failed).unwrap_or(i32::MAX),
        }
    }
}

pub type JobFuture = Pin<Box<dyn Future<Output = Result<JobResult, AppError>> + Send>>;
type JobFn = Arc<dyn Fn(JobContext) -> JobFuture + Send + Sync>;

struct RegisteredJob {
    name: &'static str,
    schedule: String,
    cron: String,
    run: JobFn,
}

/// Translates a schedule into a six-field cron expression
/// (sec min hour day month weekday).
pub fn cron_expression(schedule: &str) -> Result<&'static str, AppError> {
    match schedule.trim() {
        "@daily" => Ok("0 0 0 * * *"),
        "@hourly" | "@every 1h" => Ok("0 0 * * * *"),
        "@every 30m" => Ok("0 */30 * * * *"),
        "@every 6h" => Ok("0 0 */6 * * *"),
        "@every 12h" => Ok("0 0 */12 * * *"),
        other => Err(AppError::Validation(format!(
            "Unsupported schedule '{}'. Use @daily, @hourly or @every 30m|1h|6h|12h",
            other
        ))),
    }
}

pub struct JobSchedulerService {
    pool: PgPool,
    prices: Arc<CachedPriceProvider>,
    jobs: RwLock<Vec<RegisteredJob>>,
    scheduler: Mutex<Option<JobScheduler>>,
    tracker: TaskTracker,
    /// Parent of every job token; `stop` cancels only the current run's.
    shutdown: CancellationToken,
    run_token: parking_lot::Mutex<CancellationToken>,
}

impl JobSchedulerService {
    pub fn new(pool: PgPool, prices: Arc<CachedPriceProvider>, shutdown: CancellationToken) -> Self {
        Self {
            pool,
            prices,
            jobs: RwLock::new(Vec::new()),
            scheduler: Mutex::new(None),
            tracker: TaskTracker::new(),
            run_token: parking_lot::Mutex::new(shutdown.child_token()),
            shutdown,
        }
    }

    /// Adds a job. Jobs registered while running are scheduled from the
    /// next `start` after a `stop`.
    pub fn register<F, Fut>(
        &self,
        name: &'static str,
        schedule: &str,
        job_fn: F,
    ) -> Result<(), AppError>
    where
        F: Fn(JobContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<JobResult, AppError>> + Send + 'static,
    {
        let cron = cron_expression(schedule)?;
        let run: JobFn = Arc::new(move |context| -> JobFuture { Box::pin(job_fn(context)) });
        self.jobs.write().push(RegisteredJob {
            name,
            schedule: schedule.to_string(),
            cron: cron.to_string(),
            run,
        });
        Ok(())
    }

    pub fn job_names(&self) -> Vec<&'static str> {
        self.jobs.read().iter().map(|job| job.name).collect()
    }

    fn context(&self) -> JobContext {
        JobContext {
            pool: self.pool.clone(),
            prices: self.prices.clone(),
            cancel: self.run_token.lock().child_token(),
        }
    }

    /// Start all registered jobs
    pub async fn start(&self) -> Result<(), AppError> {
        info!("🚀 Starting job scheduler...");
        let mut running = self.scheduler.lock().await;
        if running.is_some() {
            warn!("⚠️  Job scheduler already running");
            return Ok(());
        }

        let run_token = self.shutdown.child_token();
        *self.run_token.lock() = run_token.clone();

        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to create scheduler: {}", e)))?;

        // Snapshot so the registry lock is not held across awaits.
        let jobs: Vec<(&'static str, String, String, JobFn)> = self
            .jobs
            .read()
            .iter()
            .map(|job| (job.name, job.schedule.clone(), job.cron.clone(), job.run.clone()))
            .collect();

        for (name, schedule, cron, run) in &jobs {
            let name = *name;
            let run = run.clone();
            let tracker = self.tracker.clone();
            let pool = self.pool.clone();
            let prices = self.prices.clone();
            let run_token = run_token.clone();

            let job = Job::new_async(cron.as_str(), move |_uuid, _l| {
                let context = JobContext {
                    pool: pool.clone(),
                    prices: prices.clone(),
                    cancel: run_token.child_token(),
                };
                let run = run.clone();
                Box::pin(tracker.track_future(async move {
                    if context.cancel.is_cancelled() {
                        return;
                    }
                    execute_job_with_tracking(name, context, run).await;
                }))
            })
            .map_err(|e| AppError::Internal(format!("Failed to create job {}: {}", name, e)))?;

            scheduler
                .add(job)
                .await
                .map_err(|e| AppError::Internal(format!("Failed to add job {}: {}", name, e)))?;
            info!("📅 Scheduled: {} - {} [cron: {}]", name, schedule, cron);
        }

        scheduler
            .start()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to start scheduler: {}", e)))?;
        *running = Some(scheduler);

        info!("✅ Job scheduler started successfully with {} jobs", jobs.len());
        Ok(())
    }

    /// Runs one registered job immediately, with the same run tracking as a
    /// scheduled invocation.
    pub async fn run_now(&self, name: &str) -> Result<(), AppError> {
        let job = self
            .jobs
            .read()
            .iter()
            .find(|job| job.name == name)
            .map(|job| (job.name, job.run.clone()));
        let (name, run) = job.ok_or_else(|| AppError::NotFound(format!("job {}", name)))?;
        self.tracker
            .track_future(execute_job_with_tracking(name, self.context(), run))
            .await;
        Ok(())
    }

    /// Cancels running jobs, stops the cron scheduler and waits for
    /// in-flight invocations to finish.
    pub async fn stop(&self) -> Result<(), AppError> {
        info!("🛑 Stopping job scheduler...");
        self.run_token.lock().cancel();
        if let Some(mut scheduler) = self.scheduler.lock().await.take() {
            scheduler
                .shutdown()
                .await
                .map_err(|e| AppError::Internal(format!("Failed to stop scheduler: {}", e)))?;
        }
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
        info!("✅ Job scheduler stopped");
        Ok(())
    }
}

// Job tracking wrapper
async fn execute_job_with_tracking(job_name: &'static str, context: JobContext, job_fn: JobFn) {
    info!("🏃 Starting job: {}", job_name);
    let started_at = Utc::now();
    let pool = context.pool.clone();

    let job_id = match job_run_queries::record_start(&pool, job_name).await {
        Ok(id) => id,
        Err(e) => {
            error!("Failed to record job start: {}", e);
            return;
        }
    };

    let result = job_fn(context).await;
    let duration_ms = (Utc::now() - started_at).num_milliseconds();

    match result {
        Ok(job_result) => {
            info!(
                "✅ Job completed: {} (processed: {}, failed: {}, duration: {}ms)",
                job_name, job_result.items_processed, job_result.items_failed, duration_ms
            );
            if let Err(e) = job_run_queries::record_success(
                &pool,
                job_id,
                job_result.items_processed,
                job_result.items_failed,
                duration_ms,
            )
            .await
            {
                error!("Failed to record job success: {}", e);
            }
        }
        Err(e) => {
            error!("❌ Job failed: {} - {}", job_name, e);
            if let Err(e) =
                job_run_queries::record_failure(&pool, job_id, &e.to_string(), duration_ms).await
            {
                error!("Failed to record job failure: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::price_provider::NoPriceProvider;
    use sqlx::postgres::PgPoolOptions;

    #[test]
    fn test_schedule_translation() {
        assert_eq!(cron_expression("@daily").unwrap(), "0 0 0 * * *");
        assert_eq!(cron_expression("@hourly").unwrap(), "0 0 * * * *");
        assert_eq!(cron_expression("@every 1h").unwrap(), "0 0 * * * *");
        assert_eq!(cron_expression("@every 30m").unwrap(), "0 */30 * * * *");
        assert_eq!(cron_expression("@every 6h").unwrap(), "0 0 */6 * * *");
        assert_eq!(cron_expression("@every 12h").unwrap(), "0 0 */12 * * *");
    }

    #[test]
    fn test_unknown_schedules_are_rejected() {
        for schedule in ["@weekly", "@every 5m", "0 0 * * * *", ""] {
            assert!(cron_expression(schedule).is_err(), "{} accepted", schedule);
        }
    }

    fn service() -> JobSchedulerService {
        // Lazy pool: no connection is made until a query runs.
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://localhost/lotfolio_test")
            .unwrap();
        let prices = Arc::new(CachedPriceProvider::new(Arc::new(NoPriceProvider), 60));
        JobSchedulerService::new(pool, prices, CancellationToken::new())
    }

    #[tokio::test]
    async fn test_register_keeps_jobs_in_order() {
        let scheduler = service();
        scheduler
            .register("first", "@daily", |_| async { Ok(JobResult::new(0, 0)) })
            .unwrap();
        scheduler
            .register("second", "@every 30m", |_| async { Ok(JobResult::new(1, 0)) })
            .unwrap();
        assert!(scheduler
            .register("bad", "@weekly", |_| async { Ok(JobResult::new(0, 0)) })
            .is_err());
        assert_eq!(scheduler.job_names(), vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_run_now_unknown_job() {
        let scheduler = service();
        assert!(matches!(
            scheduler.run_now("missing").await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_stop_cancels_job_contexts() {
        let scheduler = service();
        let context = scheduler.context();
        scheduler.stop().await.unwrap();
        assert!(context.cancel.is_cancelled());
    }

    #[test]
    fn test_job_result_saturates() {
        let result = JobResult::new(usize::MAX, 3);
        assert_eq!(result.items_processed, i32::MAX);
        assert_eq!(result.items_failed, 3);
    }
}
