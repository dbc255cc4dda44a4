//! Upstream HTTP access
//!
//! - [`client`]: retrying HTTP client with injectable backoff delays
//! - [`headers`]: header merging, `${ENV}` templates, GitHub token injection
//! - [`rate_limit`]: per-host and text-generation token buckets
//! - [`error`]: transport and rate limiter errors

pub mod client;
pub mod error;
pub mod headers;
pub mod rate_limit;

pub use client::{DelayFn, HttpClient, HttpClientConfig, RetryConfig};
pub use error::{LastFailure, RateLimitError, TransportError};
pub use rate_limit::{BucketConfig, RateLimitConfig, RateLimiter};
