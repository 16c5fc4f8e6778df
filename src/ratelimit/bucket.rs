//! Token bucket state transition.
//!
//! This is the refill/consume step that a store evaluates atomically for a
//! bucket identity. It is kept free of I/O so every store backend, and the
//! tests, share one definition of the algorithm.

/// Persisted state of a single bucket.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BucketState {
    /// Tokens currently available, always within `0..=burst`
    pub tokens: f64,
    /// Unix time (seconds) of the last refill
    pub last_refill: i64,
}

impl BucketState {
    /// State of a bucket on first use: full, refilled at `now`.
    pub fn full(burst: u32, now: i64) -> Self {
        Self {
            tokens: burst as f64,
            last_refill: now,
        }
    }
}

/// Parameters of one admission request against a bucket.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransitionRequest {
    /// Tokens added per second
    pub rate: f64,
    /// Maximum bucket capacity
    pub burst: u32,
    /// Caller-supplied current time in Unix seconds
    pub now: i64,
    /// Tokens requested
    pub n: u32,
}

/// Outcome of applying a [`TransitionRequest`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transition {
    /// Whether the request was admitted
    pub admitted: bool,
    /// State to persist, written on denial as well
    pub state: BucketState,
}

impl Transition {
    /// Tokens left in the bucket after this transition.
    pub fn remaining(&self) -> f64 {
        self.state.tokens
    }
}

impl TransitionRequest {
    /// Compute the next bucket state and the admission decision.
    ///
    /// `prior` is `None` for a bucket that has never been written, in which
    /// case it starts full at `now`. Time moving backwards (clock skew, or a
    /// concurrent writer with a later clock) counts as zero elapsed seconds.
    pub fn apply(&self, prior: Option<BucketState>) -> Transition {
        let prior = prior.unwrap_or_else(|| BucketState::full(self.burst, self.now));
        let burst = self.burst as f64;

        let elapsed = (self.now - prior.last_refill).max(0);
        // Guard against 0 * inf when the rate is unbounded.
        let refill = if elapsed > 0 {
            elapsed as f64 * self.rate
        } else {
            0.0
        };
        let candidate = (prior.tokens + refill).min(burst);

        let requested = self.n as f64;
        let (admitted, tokens) = if candidate >= requested {
            (true, candidate - requested)
        } else {
            (false, candidate)
        };

        Transition {
            admitted,
            state: BucketState {
                tokens,
                last_refill: self.now,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_704_067_200;

    fn request(rate: f64, burst: u32, now: i64, n: u32) -> TransitionRequest {
        TransitionRequest {
            rate,
            burst,
            now,
            n,
        }
    }

    #[test]
    fn test_fresh_bucket_starts_full() {
        let t = request(5.0, 12, NOW, 10).apply(None);

        assert!(t.admitted);
        assert_eq!(t.state.tokens, 2.0);
        assert_eq!(t.state.last_refill, NOW);
    }

    #[test]
    fn test_request_above_burst_denied() {
        let first = request(5.0, 12, NOW, 10).apply(None);
        let second = request(5.0, 12, NOW, 60).apply(Some(first.state));

        assert!(!second.admitted);
        assert_eq!(second.state.tokens, 2.0);
    }

    #[test]
    fn test_denial_on_fresh_bucket_keeps_capacity() {
        let t = request(5.0, 10, NOW, 11).apply(None);

        assert!(!t.admitted);
        assert_eq!(t.state.tokens, 10.0);
    }

    #[test]
    fn test_refill_is_persisted_on_denial() {
        let prior = BucketState {
            tokens: 1.0,
            last_refill: NOW,
        };
        let t = request(2.0, 10, NOW + 2, 8).apply(Some(prior));

        assert!(!t.admitted);
        assert_eq!(t.state.tokens, 5.0);
        assert_eq!(t.state.last_refill, NOW + 2);
    }

    #[test]
    fn test_refill_capped_at_burst() {
        let prior = BucketState {
            tokens: 3.0,
            last_refill: NOW,
        };
        let t = request(5.0, 12, NOW + 3600, 1).apply(Some(prior));

        assert!(t.admitted);
        assert_eq!(t.state.tokens, 11.0);
    }

    #[test]
    fn test_fractional_rate_accumulates() {
        let prior = BucketState {
            tokens: 0.0,
            last_refill: NOW,
        };
        let t = request(0.5, 60, NOW + 3, 1).apply(Some(prior));

        assert!(t.admitted);
        assert_eq!(t.state.tokens, 0.5);
    }

    #[test]
    fn test_clock_skew_clamped_to_zero() {
        let prior = BucketState {
            tokens: 4.0,
            last_refill: NOW,
        };
        let t = request(5.0, 12, NOW - 30, 5).apply(Some(prior));

        assert!(!t.admitted);
        assert_eq!(t.state.tokens, 4.0);
        assert_eq!(t.state.last_refill, NOW - 30);
    }

    #[test]
    fn test_lowered_burst_caps_existing_tokens() {
        let prior = BucketState {
            tokens: 12.0,
            last_refill: NOW,
        };
        let t = request(5.0, 4, NOW, 1).apply(Some(prior));

        assert!(t.admitted);
        assert_eq!(t.state.tokens, 3.0);
    }

    #[test]
    fn test_infinite_rate_without_elapsed_time() {
        let prior = BucketState {
            tokens: 0.0,
            last_refill: NOW,
        };

        let same_second = request(f64::INFINITY, 5, NOW, 1).apply(Some(prior));
        assert!(!same_second.admitted);
        assert_eq!(same_second.state.tokens, 0.0);

        let next_second = request(f64::INFINITY, 5, NOW + 1, 5).apply(Some(prior));
        assert!(next_second.admitted);
        assert_eq!(next_second.state.tokens, 0.0);
    }

    #[test]
    fn test_zero_tokens_always_admitted() {
        let prior = BucketState {
            tokens: 0.0,
            last_refill: NOW,
        };
        let t = request(1.0, 1, NOW, 0).apply(Some(prior));

        assert!(t.admitted);
        assert_eq!(t.remaining(), 0.0);
    }

    #[test]
    fn test_tokens_stay_within_bounds() {
        let (rate, burst) = (3.0, 7);
        let mut state = None;
        let mut now = NOW;

        for step in 0..200u32 {
            now += i64::from(step % 3);
            let t = request(rate, burst, now, step % 9).apply(state);
            assert!(t.state.tokens >= 0.0);
            assert!(t.state.tokens <= burst as f64);
            state = Some(t.state);
        }
    }
}
