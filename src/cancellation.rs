use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use sqlx::{Postgres, Transaction};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::errors::AppError;

tokio::task_local! {
    static COMMIT_GATE: CommitGate;
}

#[derive(Clone)]
struct CommitGate {
    token: CancellationToken,
    committing: Arc<AtomicBool>,
}

/// Races `operation` against `token`.
///
/// Before the operation reaches its commit point, cancellation drops the
/// future at its current await; an open `sqlx::Transaction` inside it is
/// rolled back on drop. Once [`commit`] has started, the operation always
/// runs to completion and its own result is returned.
pub async fn run_cancellable<T, F>(
    token: &CancellationToken,
    operation: &str,
    future: F,
) -> Result<T, AppError>
where
    F: Future<Output = Result<T, AppError>>,
{
    if token.is_cancelled() {
        return Err(AppError::OperationCancelled);
    }
    let gate = CommitGate {
        token: token.clone(),
        committing: Arc::new(AtomicBool::new(false)),
    };
    let committing = gate.committing.clone();
    let future = COMMIT_GATE.scope(gate, future);
    tokio::pin!(future);

    tokio::select! {
        biased;
        _ = token.cancelled() => {
            if committing.load(Ordering::SeqCst) {
                info!("🛑 {} is committing, letting it finish", operation);
                return future.as_mut().await;
            }
            warn!("🛑 {} cancelled", operation);
            Err(AppError::OperationCancelled)
        }
        result = &mut future => result,
    }
}

/// Marks the commit point of the current cancellable operation. Fails
/// when the operation was cancelled before its first commit; outside
/// `run_cancellable` it always succeeds.
fn begin_commit() -> Result<(), AppError> {
    let gate = COMMIT_GATE.try_with(|gate| gate.clone()).ok();
    if let Some(gate) = gate {
        if gate.token.is_cancelled() && !gate.committing.load(Ordering::SeqCst) {
            return Err(AppError::OperationCancelled);
        }
        gate.committing.store(true, Ordering::SeqCst);
    }
    Ok(())
}

/// Commits `tx` unless the surrounding request was cancelled, in which case
/// `tx` is dropped and rolled back.
pub async fn commit(tx: Transaction<'_, Postgres>) -> Result<(), AppError> {
    begin_commit()?;
    tx.commit().await?;
    Ok(())
}
