//! Token-bucket rate limiting
//!
//! One bucket per remote host, created on first use with the default rate,
//! plus a separate bucket for text-generation calls.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::{
    DEFAULT_GENERATION_BURST, DEFAULT_GENERATION_RATE, DEFAULT_HOST_BURST, DEFAULT_HOST_RATE,
};
use crate::transport::error::RateLimitError;

/// Refill rate (tokens per second) and capacity of a bucket
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BucketConfig {
    pub rate: f64,
    pub burst: u32,
}

impl BucketConfig {
    pub fn new(rate: f64, burst: u32) -> Self {
        Self { rate, burst }
    }
}

/// Rate limiter configuration
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitConfig {
    /// Applied to hosts without an explicit override
    pub default_host: BucketConfig,
    /// Applied to text-generation calls
    pub generation: BucketConfig,
    /// Per-host overrides
    pub hosts: HashMap<String, BucketConfig>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            default_host: BucketConfig::new(DEFAULT_HOST_RATE, DEFAULT_HOST_BURST),
            generation: BucketConfig::new(DEFAULT_GENERATION_RATE, DEFAULT_GENERATION_BURST),
            hosts: HashMap::new(),
        }
    }
}

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

struct TokenBucket {
    config: BucketConfig,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    fn new(config: BucketConfig) -> Self {
        let config = BucketConfig {
            rate: config.rate,
            burst: config.burst.max(1),
        };
        Self {
            config,
            state: Mutex::new(BucketState {
                tokens: config.burst as f64,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Take a token, or return how long until one is available.
    async fn try_take(&self) -> Result<(), Duration> {
        // A non-positive or non-finite rate means the bucket never throttles
        if !(self.config.rate.is_finite() && self.config.rate > 0.0) {
            return Ok(());
        }

        let mut state = self.state.lock().await;
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        let capacity = self.config.burst as f64;
        state.tokens = (state.tokens + elapsed * self.config.rate).min(capacity);
        state.last_refill = now;

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            Ok(())
        } else {
            Err(Duration::from_secs_f64(
                (1.0 - state.tokens) / self.config.rate,
            ))
        }
    }

    async fn wait(&self, cancel: &CancellationToken) -> Result<(), RateLimitError> {
        loop {
            if cancel.is_cancelled() {
                return Err(RateLimitError::Cancelled);
            }

            let wait = match self.try_take().await {
                Ok(()) => return Ok(()),
                Err(wait) => wait,
            };

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(RateLimitError::Cancelled),
                _ = sleep(wait) => {}
            }
        }
    }
}

/// Shared rate limiter for upstream fetches and text generation
pub struct RateLimiter {
    default_host: BucketConfig,
    hosts: Mutex<HashMap<String, Arc<TokenBucket>>>,
    generation: TokenBucket,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        let hosts = config
            .hosts
            .into_iter()
            .map(|(host, bucket)| (host.to_ascii_lowercase(), Arc::new(TokenBucket::new(bucket))))
            .collect();
        Self {
            default_host: config.default_host,
            hosts: Mutex::new(hosts),
            generation: TokenBucket::new(config.generation),
        }
    }

    /// Replace the bucket for `host` with a fresh one at the given rate.
    pub async fn set_host_limit(&self, host: &str, rate: f64, burst: u32) {
        let bucket = Arc::new(TokenBucket::new(BucketConfig::new(rate, burst)));
        self.hosts
            .lock()
            .await
            .insert(host.to_ascii_lowercase(), bucket);
        debug!("Rate limit for {} set to {}/s (burst {})", host, rate, burst);
    }

    async fn host_bucket(&self, host: &str) -> Arc<TokenBucket> {
        let mut hosts = self.hosts.lock().await;
        hosts
            .entry(host.to_ascii_lowercase())
            .or_insert_with(|| Arc::new(TokenBucket::new(self.default_host)))
            .clone()
    }

    /// Wait for a token in the bucket for `host`.
    pub async fn wait_for_host(
        &self,
        cancel: &CancellationToken,
        host: &str,
    ) -> Result<(), RateLimitError> {
        if cancel.is_cancelled() {
            return Err(RateLimitError::Cancelled);
        }
        let bucket = self.host_bucket(host).await;
        bucket.wait(cancel).await
    }

    /// Wait for a token in the text-generation bucket.
    pub async fn wait_for_generation(
        &self,
        cancel: &CancellationToken,
    ) -> Result<(), RateLimitError> {
        self.generation.wait(cancel).await
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(rate: f64, burst: u32) -> RateLimiter {
        RateLimiter::new(RateLimitConfig {
            default_host: BucketConfig::new(rate, burst),
            generation: BucketConfig::new(rate, burst),
            hosts: HashMap::new(),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_host_allows_burst_without_waiting() {
        let limiter = limiter(1.0, 3);
        let cancel = CancellationToken::new();
        let start = Instant::now();

        for _ in 0..3 {
            limiter.wait_for_host(&cancel, "example.com").await.unwrap();
        }

        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_host_blocks_until_token_refills() {
        let limiter = limiter(2.0, 1);
        let cancel = CancellationToken::new();
        let start = Instant::now();

        limiter.wait_for_host(&cancel, "example.com").await.unwrap();
        limiter.wait_for_host(&cancel, "example.com").await.unwrap();

        assert!(start.elapsed() >= Duration::from_millis(500));
        assert!(start.elapsed() < Duration::from_millis(600));
    }

    #[tokio::test(start_paused = true)]
    async fn hosts_have_independent_buckets() {
        let limiter = limiter(0.1, 1);
        let cancel = CancellationToken::new();
        let start = Instant::now();

        limiter.wait_for_host(&cancel, "a.example").await.unwrap();
        limiter.wait_for_host(&cancel, "b.example").await.unwrap();
        limiter.wait_for_generation(&cancel).await.unwrap();

        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn set_host_limit_overrides_default() {
        let limiter = limiter(0.1, 1);
        limiter.set_host_limit("fast.example", 100.0, 5).await;
        let cancel = CancellationToken::new();
        let start = Instant::now();

        for _ in 0..5 {
            limiter.wait_for_host(&cancel, "fast.example").await.unwrap();
        }

        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_wait_does_not_consume_token() {
        let limiter = limiter(0.1, 1);
        let cancelled = CancellationToken::new();
        cancelled.cancel();

        let result = limiter.wait_for_host(&cancelled, "example.com").await;
        assert_eq!(result, Err(RateLimitError::Cancelled));

        let start = Instant::now();
        limiter
            .wait_for_host(&CancellationToken::new(), "example.com")
            .await
            .unwrap();
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_pending_wait() {
        let limiter = limiter(0.1, 1);
        let cancel = CancellationToken::new();
        limiter.wait_for_generation(&cancel).await.unwrap();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let start = Instant::now();
        let result = limiter.wait_for_generation(&cancel).await;

        assert_eq!(result, Err(RateLimitError::Cancelled));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_rate_never_throttles() {
        let limiter = limiter(0.0, 1);
        let cancel = CancellationToken::new();
        let start = Instant::now();

        for _ in 0..10 {
            limiter.wait_for_host(&cancel, "example.com").await.unwrap();
        }

        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
