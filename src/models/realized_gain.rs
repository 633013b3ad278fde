use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::decimal::Decimal;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "holding_period", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HoldingPeriod {
    Short,
    Long,
}

// One consumed slice of a tax lot produced by a SELL.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RealizedGain {
    pub id: uuid::Uuid,
    pub portfolio_id: uuid::Uuid,
    pub symbol: String,
    pub sell_transaction_id: uuid::Uuid,
    pub lot_id: uuid::Uuid,
    pub quantity: Decimal,
    pub cost_basis: Decimal,
    pub proceeds: Decimal,
    pub gain: Decimal,
    pub acquired_on: NaiveDate,
    pub sold_on: NaiveDate,
    pub holding_period: HoldingPeriod,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RealizedGainQuery {
    pub year: Option<i32>,
    pub symbol: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RealizedGainSummary {
    pub year: Option<i32>,
    pub short_term_gain: Decimal,
    pub long_term_gain: Decimal,
    pub total_gain: Decimal,
    pub total_proceeds: Decimal,
    pub total_cost_basis: Decimal,
    pub lots_sold: usize,
}

impl RealizedGainSummary {
    pub fn from_gains(year: Option<i32>, gains: &[RealizedGain]) -> Self {
        let mut summary = Self {
            year,
            short_term_gain: Decimal::zero(),
            long_term_gain: Decimal::zero(),
            total_gain: Decimal::zero(),
            total_proceeds: Decimal::zero(),
            total_cost_basis: Decimal::zero(),
            lots_sold: gains.len(),
        };
        for gain in gains {
            match gain.holding_period {
                HoldingPeriod::Short => summary.short_term_gain += &gain.gain,
                HoldingPeriod::Long => summary.long_term_gain += &gain.gain,
            }
            summary.total_gain += &gain.gain;
            summary.total_proceeds += &gain.proceeds;
            summary.total_cost_basis += &gain.cost_basis;
        }
        summary
    }
}
