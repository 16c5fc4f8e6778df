//! Distributed token bucket client.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{debug, info, instrument, trace, warn};

use super::backend::RateLimiter;
use super::bucket::TransitionRequest;
use super::clock::{Clock, SystemClock};
use super::key::BucketKey;
use super::wait::{self, WaitScope};
use crate::error::{Result, TollgateError};
use crate::store::BucketStore;

/// Convert "`n` events per `interval`" into a per-second rate.
///
/// A zero interval means no limit and yields an infinite rate.
pub fn every(n: u32, interval: Duration) -> f64 {
    if interval.is_zero() {
        return f64::INFINITY;
    }
    n as f64 / interval.as_secs_f64()
}

/// Snapshot of a limiter's mutable settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LimiterSettings {
    /// Tokens added per second
    pub rate: f64,
    /// Maximum bucket capacity
    pub burst: u32,
}

impl LimiterSettings {
    /// Check that the settings can drive a transition.
    pub fn validate(&self) -> Result<()> {
        validate_rate(self.rate)?;
        validate_burst(self.burst)
    }
}

fn validate_rate(rate: f64) -> Result<()> {
    // `!(rate > 0.0)` also rejects NaN.
    if !(rate > 0.0) {
        return Err(TollgateError::InvalidLimit(format!(
            "rate must be positive, got {}",
            rate
        )));
    }
    Ok(())
}

fn validate_burst(burst: u32) -> Result<()> {
    if burst == 0 {
        return Err(TollgateError::InvalidLimit(
            "burst must be positive".to_string(),
        ));
    }
    Ok(())
}

/// A rate limiter whose bucket lives in a shared store.
///
/// Any number of limiters, in this process or others, that use the same
/// identity against the same store draw from one bucket. The store
/// serializes their transitions; the local lock only guards the settings
/// and is never held across a store call.
pub struct DistributedLimiter {
    /// Store keys of the bucket
    key: BucketKey,
    /// Rate and burst, replaceable at runtime
    settings: Mutex<LimiterSettings>,
    /// The injected shared store
    store: Arc<dyn BucketStore>,
    /// Time source for `allow` and `wait`
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for DistributedLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DistributedLimiter")
            .field("key", &self.key)
            .field("settings", &*self.settings.lock())
            .finish()
    }
}

impl DistributedLimiter {
    /// Create a limiter for the bucket named `identity`.
    ///
    /// Nothing is written to the store until the first transition.
    pub fn new(
        identity: &str,
        store: Arc<dyn BucketStore>,
        rate: f64,
        burst: u32,
    ) -> Result<Self> {
        let settings = LimiterSettings { rate, burst };
        settings.validate()?;

        info!(
            identity = %identity,
            rate = rate,
            burst = burst,
            "Created distributed rate limiter"
        );

        Ok(Self {
            key: BucketKey::new(identity),
            settings: Mutex::new(settings),
            store,
            clock: Arc::new(SystemClock),
        })
    }

    /// Replace the time source used by `allow` and `wait`.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Get the store keys of this limiter's bucket.
    pub fn key(&self) -> &BucketKey {
        &self.key
    }

    /// Get a snapshot of the current settings.
    pub fn settings(&self) -> LimiterSettings {
        *self.settings.lock()
    }
}

#[async_trait]
impl RateLimiter for DistributedLimiter {
    async fn allow(&self) -> Result<bool> {
        self.allow_n(self.clock.now(), 1).await
    }

    async fn allow_n(&self, now: DateTime<Utc>, n: u32) -> Result<bool> {
        let settings = self.settings();
        let request = TransitionRequest {
            rate: settings.rate,
            burst: settings.burst,
            now: now.timestamp(),
            n,
        };

        trace!(
            bucket = %self.key,
            n = n,
            now = request.now,
            "Requesting tokens"
        );

        let transition = self
            .store
            .transition(&self.key, request)
            .await
            .inspect_err(|e| {
                warn!(bucket = %self.key, error = %e, "Bucket transition failed");
            })?;

        if !transition.admitted {
            debug!(
                bucket = %self.key,
                n = n,
                remaining = transition.remaining(),
                burst = settings.burst,
                "Rate limit exceeded"
            );
        }

        Ok(transition.admitted)
    }

    #[instrument(skip(self, scope), fields(bucket = %self.key))]
    async fn wait_n(&self, scope: &WaitScope, n: u32) -> Result<()> {
        wait::wait_until_admitted(self, self.clock.as_ref(), scope, n).await
    }

    fn set_limit(&self, rate: f64) -> Result<()> {
        validate_rate(rate)?;
        self.settings.lock().rate = rate;
        debug!(bucket = %self.key, rate = rate, "Updated rate");
        Ok(())
    }

    fn set_burst(&self, burst: u32) -> Result<()> {
        validate_burst(burst)?;
        self.settings.lock().burst = burst;
        debug!(bucket = %self.key, burst = burst, "Updated burst");
        Ok(())
    }

    fn limit(&self) -> f64 {
        self.settings.lock().rate
    }

    fn burst(&self) -> u32 {
        self.settings.lock().burst
    }
}
