pub mod corporate_action_queries;
pub mod credential_queries;
pub mod holding_queries;
pub mod job_run_queries;
pub mod portfolio_queries;
pub mod proposal_queries;
pub mod realized_gain_queries;
pub mod snapshot_queries;
pub mod tax_lot_queries;
pub mod transaction_queries;
pub mod user_queries;

use std::future::Future;

use tokio::time::{sleep, Duration};
use tracing::warn;

const MAX_RETRIES: u32 = 2;
const BASE_BACKOFF_MS: u64 = 100;

/// Connection loss, pool exhaustion, serialization failure and deadlock are
/// worth another attempt; everything else is final.
pub fn is_transient(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut => true,
        sqlx::Error::Database(db) => matches!(db.code().as_deref(), Some("40001") | Some("40P01")),
        _ => false,
    }
}

/// Runs an idempotent database operation, retrying transient failures at
/// most twice with exponential backoff (100 ms, then 200 ms).
pub async fn with_retry<T, F, Fut>(operation: &str, mut f: F) -> Result<T, sqlx::Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, sqlx::Error>>,
{
    let mut attempt = 0;
    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < MAX_RETRIES && is_transient(&e) => {
                let delay = Duration::from_millis(BASE_BACKOFF_MS * 2u64.pow(attempt));
                attempt += 1;
                warn!(
                    "⚠️  {} failed with transient error (attempt {}/{}), retrying in {:?}: {}",
                    operation,
                    attempt,
                    MAX_RETRIES + 1,
                    delay,
                    e
                );
                sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}
