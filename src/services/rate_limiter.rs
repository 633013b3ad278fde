use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::Response;
use parking_lot::Mutex;
use tokio::time::{Duration, Instant};
use tracing::warn;

use crate::config::RateLimitConfig;
use crate::errors::AppError;
use crate::state::AppState;

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

/// Fixed-window request limiter keyed by client IP.
///
/// Each client gets `max_requests` per window; the window starts with the
/// client's first request and resets once it has elapsed.
pub struct RateLimiter {
    windows: Mutex<HashMap<IpAddr, Window>>,
    max_requests: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            max_requests,
            window,
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.requests_per_window, Duration::from_secs(config.window_secs))
    }

    /// Counts one request for `client`; false when it is over the limit.
    pub fn check(&self, client: IpAddr) -> bool {
        let now = Instant::now();
        let mut windows = self.windows.lock();
        let window = windows.entry(client).or_insert(Window {
            started: now,
            count: 0,
        });
        if now.duration_since(window.started) >= self.window {
            *window = Window {
                started: now,
                count: 0,
            };
        }
        if window.count >= self.max_requests {
            return false;
        }
        window.count += 1;
        true
    }

    /// Forgets clients whose window has elapsed.
    pub fn cleanup_expired(&self) {
        let now = Instant::now();
        self.windows
            .lock()
            .retain(|_, window| now.duration_since(window.started) < self.window);
    }

    pub fn tracked_clients(&self) -> usize {
        self.windows.lock().len()
    }
}

/// Axum middleware applying the shared limiter to the wrapped routes.
pub async fn limit_by_ip(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let client = connect_info
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));

    if !state.rate_limiter.check(client) {
        warn!("Rate limit exceeded for {} on {}", client, request.uri().path());
        return Err(AppError::RateLimited);
    }
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv6Addr;
    use tokio::time::advance;

    fn ip(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, last))
    }

    #[tokio::test(start_paused = true)]
    async fn test_limit_applies_per_window() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        assert!(limiter.check(ip(1)));
        assert!(limiter.check(ip(1)));
        assert!(limiter.check(ip(1)));
        assert!(!limiter.check(ip(1)));

        advance(Duration::from_secs(60)).await;
        assert!(limiter.check(ip(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_clients_are_independent() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        assert!(limiter.check(ip(1)));
        assert!(!limiter.check(ip(1)));
        assert!(limiter.check(ip(2)));
        assert!(limiter.check(IpAddr::V6(Ipv6Addr::LOCALHOST)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_drops_elapsed_windows() {
        let limiter = RateLimiter::new(5, Duration::from_secs(10));
        limiter.check(ip(1));
        advance(Duration::from_secs(5)).await;
        limiter.check(ip(2));
        advance(Duration::from_secs(6)).await;

        limiter.cleanup_expired();
        assert_eq!(limiter.tracked_clients(), 1);
    }
}
