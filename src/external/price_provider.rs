use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

use crate::decimal::Decimal;

/// Most recent close for a symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalPricePoint {
    pub date: NaiveDate,
    pub close: Decimal,
}

#[derive(Debug, Error)]
pub enum PriceProviderError {
    #[error("network error: {0}")]
    Network(String),

    #[error("bad response: {0}")]
    BadResponse(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("rate limited")]
    RateLimited,

    #[error("unknown symbol: {0}")]
    NotFound(String),
}

#[async_trait]
pub trait PriceProvider: Send + Sync {
    /// Short provider name used in logs.
    fn name(&self) -> &'static str;

    async fn latest_price(&self, symbol: &str) -> Result<ExternalPricePoint, PriceProviderError>;
}

/// Used when no market-data provider is configured; every lookup misses and
/// callers fall back to cost.
pub struct NoPriceProvider;

#[async_trait]
impl PriceProvider for NoPriceProvider {
    fn name(&self) -> &'static str {
        "none"
    }

    async fn latest_price(&self, symbol: &str) -> Result<ExternalPricePoint, PriceProviderError> {
        Err(PriceProviderError::NotFound(symbol.to_string()))
    }
}

pub(crate) fn parse_close(raw: &str) -> Result<Decimal, PriceProviderError> {
    let close = raw
        .parse::<Decimal>()
        .map_err(|e| PriceProviderError::Parse(e.to_string()))?;
    if !close.is_positive() {
        return Err(PriceProviderError::Parse(format!("non-positive close {}", raw)));
    }
    Ok(close)
}

/// Providers return either `YYYY-MM-DD` or `YYYY-MM-DD HH:MM:SS`.
pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, PriceProviderError> {
    let date_part = raw.split(' ').next().unwrap_or(raw);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .map_err(|e| PriceProviderError::Parse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_date_accepts_both_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
        assert_eq!(parse_date("2024-02-01").unwrap(), expected);
        assert_eq!(parse_date("2024-02-01 16:00:00").unwrap(), expected);
        assert!(parse_date("02/01/2024").is_err());
    }

    #[test]
    fn test_parse_close_rejects_garbage() {
        assert_eq!(parse_close("187.4400").unwrap(), "187.44".parse().unwrap());
        assert!(parse_close("n/a").is_err());
        assert!(parse_close("0").is_err());
    }

    #[tokio::test]
    async fn test_no_provider_always_misses() {
        let result = NoPriceProvider.latest_price("AAPL").await;
        assert!(matches!(result, Err(PriceProviderError::NotFound(_))));
    }
}
