use std::sync::Arc;
use chrono::{DateTime, Utc, Duration};
use dashmap::DashMap;

use crate::external::price_provider::PriceProviderError;

/// Information about a failed price lookup for a symbol
#[derive(Debug, Clone)]
pub struct FailureInfo {
    pub failed_at: DateTime<Utc>,
    pub error_type: FailureType,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FailureType {
    NotFound,       // Symbol doesn't exist at the provider
    RateLimited,    // Temporary rate limit
    ApiError,       // Network, parse and other API errors
}

impl FailureType {
    pub fn ttl(self) -> Duration {
        match self {
            FailureType::NotFound => Duration::hours(24),
            FailureType::RateLimited => Duration::minutes(1),
            FailureType::ApiError => Duration::minutes(15),
        }
    }
}

impl From<&PriceProviderError> for FailureType {
    fn from(err: &PriceProviderError) -> Self {
        match err {
            PriceProviderError::NotFound(_) => FailureType::NotFound,
            PriceProviderError::RateLimited => FailureType::RateLimited,
            _ => FailureType::ApiError,
        }
    }
}

/// Thread-safe cache of failed symbol lookups, so the snapshot job does not
/// hit the provider again for a symbol it just failed on.
#[derive(Clone, Default)]
pub struct FailureCache {
    cache: Arc<DashMap<String, FailureInfo>>,
}

impl FailureCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the failure if it is still within its TTL
    pub fn is_failed(&self, symbol: &str) -> Option<FailureInfo> {
        self.is_failed_at(symbol, Utc::now())
    }

    fn is_failed_at(&self, symbol: &str, now: DateTime<Utc>) -> Option<FailureInfo> {
        if let Some(entry) = self.cache.get(symbol) {
            let info = entry.value().clone();
            if now < info.failed_at + info.error_type.ttl() {
                return Some(info);
            }
            drop(entry); // Release the read lock
            self.cache.remove(symbol);
        }
        None
    }

    pub fn record_failure(&self, symbol: &str, error_type: FailureType) {
        self.record_failure_at(symbol, error_type, Utc::now());
    }

    fn record_failure_at(&self, symbol: &str, error_type: FailureType, failed_at: DateTime<Utc>) {
        self.cache.insert(
            symbol.to_string(),
            FailureInfo {
                failed_at,
                error_type,
            },
        );
    }

    /// Clear a symbol after a successful fetch
    pub fn clear(&self, symbol: &str) {
        self.cache.remove(symbol);
    }

    pub fn clear_all(&self) {
        self.cache.clear();
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_records_and_retrieves_failures() {
        let cache = FailureCache::new();

        cache.record_failure("INVALID", FailureType::NotFound);

        let result = cache.is_failed("INVALID");
        assert!(result.is_some());
        assert_eq!(result.unwrap().error_type, FailureType::NotFound);
    }

    #[test]
    fn test_cache_clears_symbol() {
        let cache = FailureCache::new();

        cache.record_failure("TEST", FailureType::ApiError);
        assert!(cache.is_failed("TEST").is_some());

        cache.clear("TEST");
        assert!(cache.is_failed("TEST").is_none());
    }

    #[test]
    fn test_expired_failures_are_evicted() {
        let cache = FailureCache::new();
        let now = Utc::now();

        cache.record_failure_at("AAPL", FailureType::RateLimited, now - Duration::minutes(2));
        cache.record_failure_at("MSFT", FailureType::NotFound, now - Duration::minutes(2));

        assert!(cache.is_failed_at("AAPL", now).is_none());
        assert!(cache.is_failed_at("MSFT", now).is_some());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_provider_errors_map_to_failure_types() {
        assert_eq!(
            FailureType::from(&PriceProviderError::NotFound("X".into())),
            FailureType::NotFound
        );
        assert_eq!(
            FailureType::from(&PriceProviderError::RateLimited),
            FailureType::RateLimited
        );
        assert_eq!(
            FailureType::from(&PriceProviderError::Network("timeout".into())),
            FailureType::ApiError
        );
    }
}
