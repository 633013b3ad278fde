use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::decimal::Decimal;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "corporate_action_type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CorporateActionType {
    Split,
    Dividend,
    Merger,
    Spinoff,
    TickerChange,
}

// Externally sourced event affecting every holder of `symbol`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CorporateAction {
    pub id: uuid::Uuid,
    pub symbol: String,
    pub action_type: CorporateActionType,
    pub action_date: NaiveDate,
    pub ratio: Option<Decimal>,
    pub amount: Option<Decimal>,
    pub new_symbol: Option<String>,
    pub description: Option<String>,
    pub applied: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCorporateAction {
    pub symbol: String,
    pub action_type: CorporateActionType,
    pub action_date: NaiveDate,
    pub ratio: Option<Decimal>,
    pub amount: Option<Decimal>,
    pub new_symbol: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CorporateActionQuery {
    pub symbol: Option<String>,
    pub applied: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct DetectionReport {
    pub actions_scanned: usize,
    pub proposals_created: usize,
    pub proposals_skipped: usize,
}
