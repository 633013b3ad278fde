use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use futures::future;
use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use crate::decimal::Decimal;
use crate::external::price_provider::{ExternalPricePoint, PriceProvider};
use crate::services::failure_cache::{FailureCache, FailureType};

// One year.
const MAX_TTL_SECS: u64 = 365 * 24 * 3600;
const MAX_CONCURRENT_LOOKUPS: usize = 4;

#[derive(Debug, Clone)]
struct CachedPrice {
    point: ExternalPricePoint,
    fetched_at: DateTime<Utc>,
}

/// Latest-price lookups through a provider, cached per symbol for a TTL.
///
/// Failed lookups are remembered in a [`FailureCache`] so a bad symbol is
/// not retried on every valuation. Lookups never fail: a missing price is
/// `None` and callers value the position at cost instead.
pub struct CachedPriceProvider {
    inner: Arc<dyn PriceProvider>,
    prices: DashMap<String, CachedPrice>,
    failures: FailureCache,
    ttl: Duration,
}

impl CachedPriceProvider {
    pub fn new(inner: Arc<dyn PriceProvider>, ttl_secs: u64) -> Self {
        Self {
            inner,
            prices: DashMap::new(),
            failures: FailureCache::new(),
            ttl: Duration::seconds(ttl_secs.min(MAX_TTL_SECS) as i64),
        }
    }

    pub fn provider_name(&self) -> &'static str {
        self.inner.name()
    }

    pub async fn latest_price(&self, symbol: &str) -> Option<Decimal> {
        let now = Utc::now();
        if let Some(entry) = self.prices.get(symbol) {
            if now < entry.fetched_at + self.ttl {
                return Some(entry.point.close.clone());
            }
        }

        if let Some(failure) = self.failures.is_failed(symbol) {
            debug!(
                "⚠️ Skipping price lookup for {} - failed {:?} at {}",
                symbol, failure.error_type, failure.failed_at
            );
            return None;
        }

        match self.inner.latest_price(symbol).await {
            Ok(point) => {
                let close = point.close.clone();
                self.failures.clear(symbol);
                self.prices.insert(
                    symbol.to_string(),
                    CachedPrice {
                        point,
                        fetched_at: now,
                    },
                );
                Some(close)
            }
            Err(e) => {
                warn!("Price lookup for {} via {} failed: {}", symbol, self.inner.name(), e);
                self.failures.record_failure(symbol, FailureType::from(&e));
                None
            }
        }
    }

    /// Looks up each symbol once, a few at a time; symbols without a price
    /// are absent.
    pub async fn latest_prices(&self, symbols: &[String]) -> HashMap<String, Decimal> {
        let unique: HashSet<String> = symbols.iter().cloned().collect();
        stream::iter(unique)
            .map(move |symbol: String| async move {
                let price = self.latest_price(&symbol).await;
                (symbol, price)
            })
            .buffer_unordered(MAX_CONCURRENT_LOOKUPS)
            .filter_map(|(symbol, price)| future::ready(price.map(|price| (symbol, price))))
            .collect::<HashMap<_, _>>()
            .await
    }

    /// Drops every cached price and remembered failure. Returns how many
    /// prices were evicted.
    pub fn clear_cache(&self) -> usize {
        let evicted = self.prices.len();
        self.prices.clear();
        self.failures.clear_all();
        info!("🧹 Cleared {} cached prices", evicted);
        evicted
    }

    pub fn cached_len(&self) -> usize {
        self.prices.len()
    }
}
