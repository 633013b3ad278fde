use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::decimal::Decimal;

// Aggregated position per (portfolio, symbol), derived from the open tax lots.
// Rows are kept with zeroed values once fully sold.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Holding {
    pub id: uuid::Uuid,
    pub portfolio_id: uuid::Uuid,
    pub symbol: String,
    pub quantity: Decimal,
    pub cost_basis: Decimal,
    pub avg_cost_price: Decimal,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl Holding {
    pub fn is_open(&self) -> bool {
        self.quantity.is_positive()
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct HoldingQuery {
    #[serde(default)]
    pub include_closed: bool,
}

// Holding valued at the latest known market price.
#[derive(Debug, Clone, Serialize)]
pub struct UnrealizedPosition {
    pub symbol: String,
    pub quantity: Decimal,
    pub cost_basis: Decimal,
    pub avg_cost_price: Decimal,
    pub market_price: Option<Decimal>,
    pub market_value: Decimal,
    pub unrealized_gain: Decimal,
    pub unrealized_gain_pct: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct PortfolioSummary {
    pub portfolio_id: uuid::Uuid,
    pub holdings_count: usize,
    pub market_value: Decimal,
    pub cost_basis: Decimal,
    pub unrealized_gain: Decimal,
    pub realized_gain: Decimal,
    pub priced_at: chrono::DateTime<chrono::Utc>,
}
