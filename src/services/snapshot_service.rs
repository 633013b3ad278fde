use chrono::{NaiveDate, Utc};
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::{self, holding_queries, portfolio_queries, snapshot_queries};
use crate::decimal::Decimal;
use crate::errors::AppError;
use crate::models::{PerformanceSnapshot, SnapshotQuery, UnrealizedPosition};
use crate::services::access_service::authorize_portfolio;
use crate::services::holding_service::value_position;
use crate::services::price_service::CachedPriceProvider;

/// Values `positions` into the snapshot for `date`. The day change is
/// measured against the most recent earlier snapshot, when there is one.
pub fn build_snapshot(
    portfolio_id: Uuid,
    date: NaiveDate,
    positions: &[UnrealizedPosition],
    previous: Option<&PerformanceSnapshot>,
) -> PerformanceSnapshot {
    let total_value: Decimal = positions.iter().map(|p| &p.market_value).sum();
    let total_cost_basis: Decimal = positions.iter().map(|p| &p.cost_basis).sum();
    let total_return = &total_value - &total_cost_basis;
    let return_pct = (&total_return * &Decimal::from_i64(100))
        .div_or_zero(&total_cost_basis)
        .round_dp(4);
    let day_change = previous.map(|p| &total_value - &p.total_value);

    PerformanceSnapshot {
        id: Uuid::now_v7(),
        portfolio_id,
        snapshot_date: date,
        total_value,
        total_cost_basis,
        total_return,
        return_pct,
        day_change,
        created_at: Utc::now(),
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotRun {
    pub created: usize,
    pub skipped: usize,
    pub failed: usize,
}

async fn snapshot_portfolio(
    pool: &PgPool,
    prices: &CachedPriceProvider,
    portfolio_id: Uuid,
    date: NaiveDate,
) -> Result<bool, AppError> {
    let holdings = db::with_retry("list holdings", || {
        holding_queries::list(pool, portfolio_id, false)
    })
    .await?;
    let symbols: Vec<String> = holdings.iter().map(|h| h.symbol.clone()).collect();
    let mut latest = prices.latest_prices(&symbols).await;
    let positions: Vec<UnrealizedPosition> = holdings
        .iter()
        .map(|holding| value_position(holding, latest.remove(&holding.symbol)))
        .collect();

    let previous = db::with_retry("latest snapshot", || {
        snapshot_queries::latest_before(pool, portfolio_id, date)
    })
    .await?;
    let snapshot = build_snapshot(portfolio_id, date, &positions, previous.as_ref());
    let created = snapshot_queries::insert_if_absent(pool, &snapshot).await?;
    Ok(created)
}

/// Records one snapshot per portfolio with open holdings for `date`.
/// Portfolios already snapshotted that day are skipped; one portfolio
/// failing does not stop the rest.
pub async fn take_snapshots(
    pool: &PgPool,
    prices: &CachedPriceProvider,
    date: NaiveDate,
    cancel: &CancellationToken,
) -> Result<SnapshotRun, AppError> {
    let portfolio_ids = db::with_retry("list portfolios with holdings", || {
        portfolio_queries::fetch_ids_with_holdings(pool)
    })
    .await?;
    info!("📊 Taking {} snapshots for {} portfolios", date, portfolio_ids.len());

    let mut run = SnapshotRun::default();
    for portfolio_id in portfolio_ids {
        if cancel.is_cancelled() {
            warn!("🛑 Snapshot run cancelled after {} portfolios", run.created + run.skipped + run.failed);
            return Err(AppError::OperationCancelled);
        }
        match snapshot_portfolio(pool, prices, portfolio_id, date).await {
            Ok(true) => run.created += 1,
            Ok(false) => run.skipped += 1,
            Err(e) => {
                run.failed += 1;
                warn!("❌ Snapshot failed for portfolio {}: {}", portfolio_id, e);
            }
        }
    }
    Ok(run)
}

pub async fn list(
    pool: &PgPool,
    user_id: Uuid,
    portfolio_id: Uuid,
    query: &SnapshotQuery,
) -> Result<Vec<PerformanceSnapshot>, AppError> {
    if let (Some(from), Some(to)) = (query.from, query.to) {
        if from > to {
            return Err(AppError::Validation("from must not be after to".into()));
        }
    }
    authorize_portfolio(pool, user_id, portfolio_id).await?;
    let snapshots =
        db::with_retry("list snapshots", || snapshot_queries::list(pool, portfolio_id, query))
            .await?;
    Ok(snapshots)
}
