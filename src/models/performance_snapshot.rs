use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::decimal::Decimal;

// Daily valuation record, insert-only, one per portfolio per date.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PerformanceSnapshot {
    pub id: uuid::Uuid,
    pub portfolio_id: uuid::Uuid,
    pub snapshot_date: NaiveDate,
    pub total_value: Decimal,
    pub total_cost_basis: Decimal,
    pub total_return: Decimal,
    pub return_pct: Decimal,
    pub day_change: Option<Decimal>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SnapshotQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}
