//! Shared bucket state stores.
//!
//! A store owns the persisted [`BucketState`](crate::ratelimit::BucketState)
//! of every identity and exposes a single atomic operation: evaluate one
//! [`TransitionRequest`] against the two keys of a bucket. Limiter clients
//! never read or write bucket state any other way.

use async_trait::async_trait;

use crate::error::Result;
use crate::ratelimit::{BucketKey, Transition, TransitionRequest};

mod memory;
#[cfg(feature = "redis")]
mod redis;

pub use memory::MemoryStore;
#[cfg(feature = "redis")]
pub use self::redis::RedisStore;

/// Trait for shared bucket stores.
///
/// Implementations must make the read-refill-consume-write sequence
/// serializable per bucket across every caller, local or remote. A bucket
/// with no persisted keys is initialized full, never reported as an error.
#[async_trait]
pub trait BucketStore: Send + Sync {
    /// Atomically apply `request` to the bucket behind `key`.
    ///
    /// Errors with `StoreUnavailable` when the transaction could not be run.
    async fn transition(&self, key: &BucketKey, request: TransitionRequest) -> Result<Transition>;
}
