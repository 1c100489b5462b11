//! Permission and rate-limit hook points, with the stock implementations.

use crate::connection::Connection;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Decides whether a connection holds the permission tags a route requires.
#[async_trait]
pub trait PermissionChecker: Send + Sync {
    async fn check(
        &self,
        connection: &dyn Connection,
        operation: &str,
        required: &[String],
    ) -> bool;
}

/// Grants fixed permission tags per server id.
#[derive(Debug, Default)]
pub struct StaticPermissions {
    grants: HashMap<String, HashSet<String>>,
}

impl StaticPermissions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(
        mut self,
        server_id: impl Into<String>,
        tags: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.grants
            .entry(server_id.into())
            .or_default()
            .extend(tags.into_iter().map(Into::into));
        self
    }
}

#[async_trait]
impl PermissionChecker for StaticPermissions {
    async fn check(
        &self,
        connection: &dyn Connection,
        _operation: &str,
        required: &[String],
    ) -> bool {
        match self.grants.get(connection.server_id()) {
            Some(granted) => required.iter().all(|tag| granted.contains(tag)),
            None => required.is_empty(),
        }
    }
}

/// Per-route rate limit: at most `max_requests` per `window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimit {
    pub max_requests: u32,
    pub window: Duration,
}

impl RateLimit {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self { max_requests, window }
    }

    /// Time to earn back one token.
    fn refill_interval(&self) -> Duration {
        (self.window / self.max_requests.max(1)).max(Duration::from_nanos(1))
    }
}

/// Decides whether a connection may invoke a rate-limited route right now.
#[async_trait]
pub trait RateLimitHook: Send + Sync {
    async fn check(&self, connection: &dyn Connection, operation: &str, limit: &RateLimit) -> bool;
}

/// Token bucket rate limiter keyed by (server id, operation).
#[derive(Debug, Default)]
pub struct TokenBucketLimiter {
    buckets: Arc<RwLock<HashMap<(String, String), TokenBucket>>>,
    blocked_count: Arc<AtomicU64>,
}

#[derive(Debug, Clone)]
struct TokenBucket {
    tokens: u32,
    last_refill: Instant,
}

impl TokenBucketLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes a token for `(server_id, operation)`, returning false when none is left.
    pub async fn check_rate_limit(
        &self,
        server_id: &str,
        operation: &str,
        limit: &RateLimit,
    ) -> bool {
        let mut buckets = self.buckets.write().await;
        let now = Instant::now();

        let bucket = buckets
            .entry((server_id.to_string(), operation.to_string()))
            .or_insert(TokenBucket {
                tokens: limit.max_requests,
                last_refill: now,
            });

        // Refill tokens based on elapsed time
        let refill_interval = limit.refill_interval();
        let elapsed = now.duration_since(bucket.last_refill);
        if elapsed >= refill_interval {
            let intervals_passed = elapsed.as_nanos() / refill_interval.as_nanos();
            let missing = limit.max_requests.saturating_sub(bucket.tokens);
            let tokens_to_add = intervals_passed.min(missing as u128) as u32;
            bucket.tokens = (bucket.tokens + tokens_to_add).min(limit.max_requests);
            bucket.last_refill = now;
        }

        if bucket.tokens > 0 {
            bucket.tokens -= 1;
            true
        } else {
            self.blocked_count.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Total number of refused calls
    pub fn blocked_count(&self) -> u64 {
        self.blocked_count.load(Ordering::Relaxed)
    }

    /// Drops buckets that have not refilled within `max_idle`.
    pub async fn cleanup_old_entries(&self, max_idle: Duration) {
        let mut buckets = self.buckets.write().await;
        let now = Instant::now();
        buckets.retain(|_, bucket| now.duration_since(bucket.last_refill) < max_idle);
    }

    pub async fn bucket_count(&self) -> usize {
        self.buckets.read().await.len()
    }
}

#[async_trait]
impl RateLimitHook for TokenBucketLimiter {
    async fn check(&self, connection: &dyn Connection, operation: &str, limit: &RateLimit) -> bool {
        self.check_rate_limit(connection.server_id(), operation, limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ChannelConnection;

    #[tokio::test]
    async fn test_rate_limiter_allows_within_limit() {
        let limiter = TokenBucketLimiter::new();
        let limit = RateLimit::new(5, Duration::from_secs(60));

        for _ in 0..5 {
            assert!(limiter.check_rate_limit("lobby", "player.kick", &limit).await);
        }
        assert!(!limiter.check_rate_limit("lobby", "player.kick", &limit).await);
        assert_eq!(limiter.blocked_count(), 1);

        // Buckets are per server and per operation
        assert!(limiter.check_rate_limit("survival", "player.kick", &limit).await);
        assert!(limiter.check_rate_limit("lobby", "player.ban", &limit).await);
    }

    #[tokio::test]
    async fn test_rate_limiter_refill() {
        let limiter = TokenBucketLimiter::new();
        let limit = RateLimit::new(2, Duration::from_millis(200));

        assert!(limiter.check_rate_limit("lobby", "world.save", &limit).await);
        assert!(limiter.check_rate_limit("lobby", "world.save", &limit).await);
        assert!(!limiter.check_rate_limit("lobby", "world.save", &limit).await);

        // Wait for refill (extra time for test reliability)
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert!(limiter.check_rate_limit("lobby", "world.save", &limit).await);
    }

    #[tokio::test]
    async fn test_cleanup_old_entries() {
        let limiter = TokenBucketLimiter::new();
        let limit = RateLimit::new(1, Duration::from_secs(1));
        limiter.check_rate_limit("lobby", "server.info", &limit).await;
        assert_eq!(limiter.bucket_count().await, 1);

        tokio::time::sleep(Duration::from_millis(20)).await;
        limiter.cleanup_old_entries(Duration::from_millis(10)).await;
        assert_eq!(limiter.bucket_count().await, 0);
    }

    #[tokio::test]
    async fn test_static_permissions() {
        let checker = StaticPermissions::new().grant("lobby", ["players.moderate"]);
        let (lobby, _rx1) = ChannelConnection::new("lobby");
        let (other, _rx2) = ChannelConnection::new("other");
        let required = vec!["players.moderate".to_string()];

        assert!(checker.check(&lobby, "player.kick", &required).await);
        assert!(!checker.check(&other, "player.kick", &required).await);
        assert!(checker.check(&other, "server.info", &[]).await);
    }
}
