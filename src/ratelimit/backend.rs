//! Rate limiter trait exposed to callers.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::wait::WaitScope;
use crate::error::Result;

/// Trait for admission-control clients.
///
/// Every `allow_n` call performs exactly one transition on the shared
/// bucket, including denials, which still persist the refill. Calls are
/// therefore not idempotent.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Take one token now.
    async fn allow(&self) -> Result<bool>;

    /// Take `n` tokens if the bucket holds at least `n` at `now`.
    ///
    /// Returns `Ok(false)` when denied; a request for more than `burst`
    /// tokens is always denied. Never blocks.
    async fn allow_n(&self, now: DateTime<Utc>, n: u32) -> Result<bool>;

    /// Block until one token is taken or `scope` ends.
    async fn wait(&self, scope: &WaitScope) -> Result<()> {
        self.wait_n(scope, 1).await
    }

    /// Block until `n` tokens are taken or `scope` ends.
    async fn wait_n(&self, scope: &WaitScope, n: u32) -> Result<()>;

    /// Replace the refill rate (tokens per second).
    fn set_limit(&self, rate: f64) -> Result<()>;

    /// Replace the bucket capacity.
    fn set_burst(&self, burst: u32) -> Result<()>;

    /// Get the current refill rate.
    fn limit(&self) -> f64;

    /// Get the current bucket capacity.
    fn burst(&self) -> u32;
}
