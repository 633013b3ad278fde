use async_trait::async_trait;
use serde::Deserialize;

use crate::external::price_provider::{
    parse_close, parse_date, ExternalPricePoint, PriceProvider, PriceProviderError,
};

const TIME_SERIES_URL: &str = "https://api.twelvedata.com/time_series";

pub struct TwelveDataProvider {
    client: reqwest::Client,
    api_key: String,
}

impl TwelveDataProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TwelveDataTimeSeriesResponse {
    values: Option<Vec<TwelveDataValue>>,
    status: String,

    // Error handling
    message: Option<String>,
    code: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct TwelveDataValue {
    datetime: String,
    close: String,
}

fn latest_from_response(
    symbol: &str,
    body: TwelveDataTimeSeriesResponse,
) -> Result<ExternalPricePoint, PriceProviderError> {
    if body.status != "ok" {
        if let Some(msg) = body.message {
            // Check for rate limit messages
            if msg.contains("API rate limit") || msg.contains("credits") || body.code == Some(429) {
                return Err(PriceProviderError::RateLimited);
            }
            if body.code == Some(404) || msg.contains("symbol") {
                return Err(PriceProviderError::NotFound(symbol.to_string()));
            }
            return Err(PriceProviderError::BadResponse(msg));
        }
        return Err(PriceProviderError::BadResponse(format!(
            "API returned status: {}",
            body.status
        )));
    }

    // Twelve Data returns newest first
    let value = body
        .values
        .and_then(|values| values.into_iter().next())
        .ok_or_else(|| PriceProviderError::BadResponse("missing values in response".into()))?;

    Ok(ExternalPricePoint {
        date: parse_date(&value.datetime)?,
        close: parse_close(&value.close)?,
    })
}

#[async_trait]
impl PriceProvider for TwelveDataProvider {
    fn name(&self) -> &'static str {
        "twelvedata"
    }

    async fn latest_price(&self, symbol: &str) -> Result<ExternalPricePoint, PriceProviderError> {
        let resp = self
            .client
            .get(TIME_SERIES_URL)
            .query(&[
                ("symbol", symbol),
                ("interval", "1day"),
                ("outputsize", "1"),
                ("apikey", self.api_key.as_str()),
            ])
            .send()
            .await
            .map_err(|e| PriceProviderError::Network(e.to_string()))?;

        let body: TwelveDataTimeSeriesResponse = resp
            .json()
            .await
            .map_err(|e| PriceProviderError::Parse(e.to_string()))?;

        latest_from_response(symbol, body)
    }
}
