use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::decimal::Decimal;
use crate::models::HoldingPeriod;

// Unit of cost-basis tracking. `transaction_id` is a lookup key to the
// originating transaction, not an ownership edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct TaxLot {
    pub id: uuid::Uuid,
    pub portfolio_id: uuid::Uuid,
    pub symbol: String,
    pub purchase_date: NaiveDate,
    pub quantity: Decimal,
    /// Quantity at acquisition, scaled by splits and mergers. A lot with
    /// `quantity < original_quantity` has been partially sold.
    pub original_quantity: Decimal,
    pub cost_basis: Decimal,
    pub transaction_id: uuid::Uuid,
    /// Last corporate action that rewrote this lot or spun a child off it.
    pub adjusted_by_action_id: Option<uuid::Uuid>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl TaxLot {
    pub fn new(
        portfolio_id: uuid::Uuid,
        symbol: String,
        purchase_date: NaiveDate,
        quantity: Decimal,
        cost_basis: Decimal,
        transaction_id: uuid::Uuid,
    ) -> Self {
        Self {
            id: uuid::Uuid::now_v7(),
            portfolio_id,
            symbol,
            purchase_date,
            original_quantity: quantity.clone(),
            quantity,
            cost_basis,
            transaction_id,
            adjusted_by_action_id: None,
            created_at: chrono::Utc::now(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.quantity.is_positive()
    }

    pub fn cost_per_share(&self) -> Decimal {
        self.cost_basis.div_or_zero(&self.quantity)
    }

    pub fn is_consumed(&self) -> bool {
        self.quantity < self.original_quantity
    }

    pub fn is_adjusted(&self) -> bool {
        self.adjusted_by_action_id.is_some()
    }
}

// Open lot as presented to callers.
#[derive(Debug, Clone, Serialize)]
pub struct LotView {
    #[serde(flatten)]
    pub lot: TaxLot,
    pub cost_per_share: Decimal,
    pub days_held: i64,
    pub holding_period: HoldingPeriod,
}
