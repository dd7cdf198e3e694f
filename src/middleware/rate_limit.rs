//! In-memory sliding-window rate limiter keyed by client identifier.
use axum::http::HeaderMap;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

#[derive(Clone)]
pub struct RateLimiter {
    requests: Arc<RwLock<HashMap<String, Vec<Instant>>>>,
    max_requests: usize,
    window: Duration,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window_secs: u64) -> Self {
        Self {
            requests: Arc::new(RwLock::new(HashMap::new())),
            max_requests,
            window: Duration::from_secs(window_secs),
        }
    }

    /// Records an attempt for `identifier` and reports whether it is allowed.
    pub async fn check(&self, identifier: &str) -> bool {
        let now = Instant::now();
        let mut requests = self.requests.write().await;

        let history = requests.entry(identifier.to_string()).or_default();
        history.retain(|&timestamp| now.duration_since(timestamp) < self.window);

        if history.len() < self.max_requests {
            history.push(now);
            true
        } else {
            false
        }
    }

    /// Drops identifiers with no attempts left inside the window.
    pub async fn cleanup(&self) {
        let now = Instant::now();
        let mut requests = self.requests.write().await;

        requests.retain(|_, history| {
            history.retain(|&timestamp| now.duration_since(timestamp) < self.window);
            !history.is_empty()
        });

        tracing::debug!(
            "Rate limiter cleanup: {} active identifiers",
            requests.len()
        );
    }
}

/// Rate-limit key for a request: the first `X-Forwarded-For` hop when the
/// service sits behind a trusted proxy, the peer address otherwise.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>, trust_proxy: bool) -> String {
    let forwarded = trust_proxy
        .then(|| headers.get("x-forwarded-for"))
        .flatten()
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(str::trim)
        .filter(|s| !s.is_empty());

    match (forwarded, peer) {
        (Some(ip), _) => ip.to_string(),
        (None, Some(addr)) => addr.ip().to_string(),
        (None, None) => "unknown".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn blocks_after_limit_per_identifier() {
        let limiter = RateLimiter::new(3, 60);

        assert!(limiter.check("10.0.0.1").await);
        assert!(limiter.check("10.0.0.1").await);
        assert!(limiter.check("10.0.0.1").await);
        assert!(!limiter.check("10.0.0.1").await);

        assert!(limiter.check("10.0.0.2").await);
    }

    #[tokio::test]
    async fn cleanup_forgets_expired_identifiers() {
        let limiter = RateLimiter::new(5, 1);

        limiter.check("ip1").await;
        limiter.check("ip2").await;

        tokio::time::sleep(Duration::from_millis(1100)).await;
        limiter.cleanup().await;

        let requests = limiter.requests.read().await;
        assert_eq!(requests.len(), 0);
    }

    fn peer(last_octet: u8) -> Option<SocketAddr> {
        Some(SocketAddr::from(([198, 51, 100, last_octet], 40000)))
    }

    #[test]
    fn client_ip_uses_first_forwarded_hop_behind_trusted_proxy() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "203.0.113.7, 10.0.0.1".parse().unwrap());
        assert_eq!(client_ip(&headers, peer(1), true), "203.0.113.7");
        assert_eq!(client_ip(&HeaderMap::new(), peer(1), true), "198.51.100.1");
    }

    #[test]
    fn forwarded_header_is_ignored_without_trusted_proxy() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "203.0.113.7".parse().unwrap());
        assert_eq!(client_ip(&headers, peer(9), false), "198.51.100.9");
    }

    #[tokio::test]
    async fn unproxied_clients_get_separate_buckets() {
        let limiter = RateLimiter::new(5, 60);
        let headers = HeaderMap::new();

        for client in 1..=6u8 {
            let key = client_ip(&headers, peer(client), false);
            assert!(limiter.check(&key).await, "client {client}");
        }
    }

    #[tokio::test]
    async fn rotating_forwarded_header_does_not_escape_the_limit() {
        let limiter = RateLimiter::new(5, 60);
        let mut allowed = 0;

        for attempt in 0..6u8 {
            let mut headers = HeaderMap::new();
            headers.insert(
                "x-forwarded-for",
                format!("203.0.113.{attempt}").parse().unwrap(),
            );
            if limiter.check(&client_ip(&headers, peer(1), false)).await {
                allowed += 1;
            }
        }
        assert_eq!(allowed, 5);
    }
}
