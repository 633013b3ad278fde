use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::decimal::Decimal;
use crate::models::RealizedGain;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "transaction_type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    Buy,
    Sell,
    Dividend,
    DividendReinvest,
    Split,
    Merger,
    Spinoff,
    TickerChange,
}

impl TransactionType {
    /// BUY and DIVIDEND_REINVEST both open a new tax lot.
    pub fn is_acquisition(self) -> bool {
        matches!(self, TransactionType::Buy | TransactionType::DividendReinvest)
    }

    /// Types that touch holdings and lots when ingested.
    pub fn affects_ledger(self) -> bool {
        self.is_acquisition() || self == TransactionType::Sell
    }

    /// SPLIT, MERGER, SPINOFF and TICKER_CHANGE are written only by the
    /// corporate-action pipeline.
    pub fn is_corporate_action(self) -> bool {
        matches!(
            self,
            TransactionType::Split
                | TransactionType::Merger
                | TransactionType::Spinoff
                | TransactionType::TickerChange
        )
    }

    pub fn requires_price(self) -> bool {
        matches!(
            self,
            TransactionType::Buy | TransactionType::Sell | TransactionType::DividendReinvest
        )
    }
}

// Append-only ledger event.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Transaction {
    pub id: Uuid,
    pub portfolio_id: Uuid,
    pub transaction_type: TransactionType,
    pub symbol: String,
    pub transaction_date: NaiveDate,
    pub quantity: Decimal,
    pub price: Option<Decimal>,
    pub commission: Decimal,
    pub amount: Option<Decimal>,
    pub currency: String,
    pub import_batch_id: Option<Uuid>,
    pub corporate_action_id: Option<Uuid>,
    pub notes: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTransaction {
    pub transaction_type: TransactionType,
    pub symbol: String,
    pub date: NaiveDate,
    pub quantity: Decimal,
    pub price: Option<Decimal>,
    pub commission: Option<Decimal>,
    pub currency: Option<String>,
    pub notes: Option<String>,
    /// Lots to sell from; only for SELL in SPECIFIC_LOT portfolios.
    pub lot_ids: Option<Vec<Uuid>>,
}

#[derive(Debug, Deserialize)]
pub struct ImportTransactions {
    pub transactions: Vec<CreateTransaction>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TransactionQuery {
    pub symbol: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Result of committing one transaction.
#[derive(Debug, Serialize)]
pub struct RecordedTransaction {
    pub transaction: Transaction,
    pub realized_gains: Vec<RealizedGain>,
}

#[derive(Debug, Serialize)]
pub struct ImportResult {
    pub import_batch_id: Uuid,
    pub transactions: Vec<RecordedTransaction>,
}

#[derive(Debug, Serialize)]
pub struct DeletedImport {
    pub import_batch_id: Uuid,
    pub transactions_deleted: u64,
    pub lots_deleted: u64,
}

/// Transaction amount as stored alongside the row.
pub fn transaction_amount(
    transaction_type: TransactionType,
    quantity: &Decimal,
    price: Option<&Decimal>,
    commission: &Decimal,
) -> Option<Decimal> {
    let gross = price.map(|p| p * quantity)?;
    match transaction_type {
        TransactionType::Buy | TransactionType::DividendReinvest => Some(gross + commission),
        TransactionType::Sell => Some(gross - commission),
        TransactionType::Dividend => Some(gross),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decimal::dec;

    #[test]
    fn test_type_classification() {
        assert!(TransactionType::Buy.is_acquisition());
        assert!(TransactionType::DividendReinvest.is_acquisition());
        assert!(!TransactionType::Sell.is_acquisition());
        assert!(TransactionType::Sell.affects_ledger());
        assert!(!TransactionType::Dividend.affects_ledger());
        assert!(TransactionType::TickerChange.is_corporate_action());
        assert!(!TransactionType::Dividend.is_corporate_action());
    }

    #[test]
    fn test_amounts() {
        let qty = dec("10");
        let price = dec("100");
        let fee = dec("5");
        assert_eq!(
            transaction_amount(TransactionType::Buy, &qty, Some(&price), &fee),
            Some(dec("1005"))
        );
        assert_eq!(
            transaction_amount(TransactionType::Sell, &qty, Some(&price), &fee),
            Some(dec("995"))
        );
        assert_eq!(
            transaction_amount(TransactionType::Dividend, &qty, None, &fee),
            None
        );
    }

    #[test]
    fn test_type_serialization() {
        let json = serde_json::to_string(&TransactionType::DividendReinvest).unwrap();
        assert_eq!(json, "\"DIVIDEND_REINVEST\"");
        let parsed: TransactionType = serde_json::from_str("\"TICKER_CHANGE\"").unwrap();
        assert_eq!(parsed, TransactionType::TickerChange);
    }
}
