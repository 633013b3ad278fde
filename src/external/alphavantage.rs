use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;

use crate::external::price_provider::{
    parse_close, parse_date, ExternalPricePoint, PriceProvider, PriceProviderError,
};

const QUERY_URL: &str = "https://www.alphavantage.co/query";

pub struct AlphaVantageProvider {
    client: reqwest::Client,
    api_key: String,
}

impl AlphaVantageProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct AvDailyResponse {
    #[serde(rename = "Time Series (Daily)")]
    time_series: Option<BTreeMap<String, AvDailyBar>>,

    // When rate-limited Alpha Vantage returns:
    // { "Note": "Thank you for using Alpha Vantage! ... 5 calls per minute ..." }
    #[serde(rename = "Note")]
    note: Option<String>,

    #[serde(rename = "Information")]
    information: Option<String>,

    // When invalid:
    // { "Error Message": "Invalid API call. ..." }
    #[serde(rename = "Error Message")]
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AvDailyBar {
    #[serde(rename = "4. close")]
    close: String,
}

fn latest_from_response(
    symbol: &str,
    body: AvDailyResponse,
) -> Result<ExternalPricePoint, PriceProviderError> {
    if body.note.is_some() || body.information.is_some() {
        return Err(PriceProviderError::RateLimited);
    }
    if body.error_message.is_some() {
        return Err(PriceProviderError::NotFound(symbol.to_string()));
    }

    // keyed by "YYYY-MM-DD"; BTreeMap sorts ascending so the last bar is newest
    let (date, bar) = body
        .time_series
        .and_then(|series| series.into_iter().next_back())
        .ok_or_else(|| PriceProviderError::BadResponse("missing time series".into()))?;

    Ok(ExternalPricePoint {
        date: parse_date(&date)?,
        close: parse_close(&bar.close)?,
    })
}

#[async_trait]
impl PriceProvider for AlphaVantageProvider {
    fn name(&self) -> &'static str {
        "alphavantage"
    }

    async fn latest_price(&self, symbol: &str) -> Result<ExternalPricePoint, PriceProviderError> {
        let resp = self
            .client
            .get(QUERY_URL)
            .query(&[
                ("function", "TIME_SERIES_DAILY"),
                ("symbol", symbol),
                ("outputsize", "compact"),
                ("apikey", self.api_key.as_str()),
            ])
            .send()
            .await
            .map_err(|e| PriceProviderError::Network(e.to_string()))?;

        let body = resp
            .json::<AvDailyResponse>()
            .await
            .map_err(|e| PriceProviderError::Parse(e.to_string()))?;

        latest_from_response(symbol, body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Result<ExternalPricePoint, PriceProviderError> {
        let body: AvDailyResponse = serde_json::from_str(json).unwrap();
        latest_from_response("IBM", body)
    }

    #[test]
    fn test_takes_latest_date() {
        let point = parse(
            r#"{"Time Series (Daily)": {
                "2024-01-31": {"1. open": "1", "4. close": "183.66"},
                "2024-02-01": {"1. open": "1", "4. close": "186.90"}}}"#,
        )
        .unwrap();
        assert_eq!(point.date.to_string(), "2024-02-01");
        assert_eq!(point.close, "186.9".parse().unwrap());
    }

    #[test]
    fn test_throttle_note() {
        let result = parse(r#"{"Note": "Thank you for using Alpha Vantage! 5 calls per minute"}"#);
        assert!(matches!(result, Err(PriceProviderError::RateLimited)));
    }

    #[test]
    fn test_invalid_symbol() {
        let result = parse(r#"{"Error Message": "Invalid API call."}"#);
        assert!(matches!(result, Err(PriceProviderError::NotFound(_))));
    }
}
