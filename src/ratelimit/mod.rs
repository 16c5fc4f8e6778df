//! Distributed token bucket admission control.

mod backend;
mod bucket;
mod clock;
mod key;
mod limiter;
mod wait;

pub use backend::RateLimiter;
pub use bucket::{BucketState, Transition, TransitionRequest};
pub use clock::{Clock, SystemClock};
pub use key::BucketKey;
pub use limiter::{every, DistributedLimiter, LimiterSettings};
pub use wait::{backoff_delay, CancelCause, WaitScope};
