//! Blocking admission: retry a denied request until it is admitted or the
//! caller gives up.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::backend::RateLimiter;
use super::clock::Clock;
use crate::error::{Result, TollgateError};

/// Shortest pause between attempts. Timestamps have one-second resolution,
/// so retrying sooner cannot observe any refill.
const MIN_BACKOFF: Duration = Duration::from_secs(1);

/// Why a wait stopped before admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelCause {
    /// The scope's cancellation token was triggered
    Cancelled,
    /// The scope's deadline passed
    DeadlineExceeded,
}

impl std::fmt::Display for CancelCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CancelCause::Cancelled => write!(f, "cancelled"),
            CancelCause::DeadlineExceeded => write!(f, "deadline exceeded"),
        }
    }
}

/// Bounds a blocking wait with a cancellation token and an optional deadline.
///
/// Waits have no retry limit; a scope is the only way to stop one early.
#[derive(Debug, Clone, Default)]
pub struct WaitScope {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl WaitScope {
    /// A scope that is only cancelled explicitly.
    pub fn new() -> Self {
        Self::default()
    }

    /// A scope that expires `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::new().deadline(Instant::now() + timeout)
    }

    /// Set the instant after which the wait gives up.
    pub fn deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Tie this scope to an existing cancellation token.
    pub fn cancel_token(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    /// Get the token that cancels this scope.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Cancel every wait running under this scope.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Returns the cancellation cause if the scope is already done.
    ///
    /// An explicit cancellation wins over an expired deadline.
    pub fn cause(&self) -> Option<CancelCause> {
        if self.token.is_cancelled() {
            return Some(CancelCause::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(CancelCause::DeadlineExceeded),
            _ => None,
        }
    }

    /// Resolve once the scope is cancelled or its deadline passes.
    pub async fn done(&self) -> CancelCause {
        let expired = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.token.cancelled() => CancelCause::Cancelled,
            _ = expired => CancelCause::DeadlineExceeded,
        }
    }
}

/// Pause after a denied request for `n` tokens at `rate` tokens per second.
///
/// This is `ceil(n / rate)` seconds, the time an empty bucket needs to
/// gather `n` tokens. Tokens already in the bucket are not taken into account.
pub fn backoff_delay(n: u32, rate: f64) -> Duration {
    let secs = (n as f64 / rate).ceil();
    if secs.is_nan() || secs < MIN_BACKOFF.as_secs_f64() {
        return MIN_BACKOFF;
    }
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}

/// Attempt `n` tokens on `limiter` until admitted, failed, or cancelled.
///
/// The first attempt runs immediately. Store errors end the wait at once
/// and are never retried here. The scope bounds in-flight transitions as
/// well as the backoff: an abandoned transition may still be applied by the
/// store, consuming tokens the caller never receives.
pub(crate) async fn wait_until_admitted<L>(
    limiter: &L,
    clock: &dyn Clock,
    scope: &WaitScope,
    n: u32,
) -> Result<()>
where
    L: RateLimiter + ?Sized,
{
    let mut attempts: u64 = 0;

    loop {
        if let Some(cause) = scope.cause() {
            debug!(attempts, cause = %cause, "Wait cancelled");
            return Err(TollgateError::Cancelled(cause));
        }

        attempts += 1;
        let admitted = tokio::select! {
            biased;
            cause = scope.done() => {
                debug!(attempts, cause = %cause, "Wait cancelled during transition");
                return Err(TollgateError::Cancelled(cause));
            }
            result = limiter.allow_n(clock.now(), n) => result?,
        };
        if admitted {
            debug!(attempts, n, "Wait admitted");
            return Ok(());
        }

        let delay = backoff_delay(n, limiter.limit());
        debug!(attempts, n, delay = ?delay, "Wait denied, backing off");

        if let Some(cause) = scope.cause() {
            debug!(attempts, cause = %cause, "Wait cancelled");
            return Err(TollgateError::Cancelled(cause));
        }

        tokio::select! {
            biased;
            cause = scope.done() => {
                debug!(attempts, cause = %cause, "Wait cancelled during backoff");
                return Err(TollgateError::Cancelled(cause));
            }
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
