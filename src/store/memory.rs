//! In-process bucket store.
//!
//! Keeps bucket state as string values under the same two keys a remote
//! store would use. A single lock around the key space makes every
//! transition serializable, so clients in one process can share buckets
//! exactly as separate processes share a remote store.

use std::collections::HashMap;
use std::str::FromStr;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::trace;

use super::BucketStore;
use crate::error::{Result, TollgateError};
use crate::ratelimit::{BucketKey, BucketState, Transition, TransitionRequest};

/// A bucket store held in local memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    /// Raw key space, keyed like the remote store
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the raw value stored under `key`.
    pub fn get(&self, key: &str) -> Option<String> {
        self.values.lock().get(key).cloned()
    }

    /// Get the persisted token count for a bucket.
    ///
    /// Returns `None` if the bucket has never been written.
    pub fn tokens(&self, key: &BucketKey) -> Option<f64> {
        self.get(key.token_key()).and_then(|v| v.parse().ok())
    }

    /// Get the persisted last refill time (Unix seconds) for a bucket.
    pub fn last_refill(&self, key: &BucketKey) -> Option<i64> {
        self.get(key.timestamp_key()).and_then(|v| v.parse().ok())
    }

    /// Remove every key.
    pub fn flush(&self) {
        self.values.lock().clear();
    }

    /// Get the number of stored keys.
    pub fn len(&self) -> usize {
        self.values.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.lock().is_empty()
    }
}

/// Parse a stored value, treating garbage as a store fault.
fn parse_value<T: FromStr>(key: &str, raw: Option<&String>) -> Result<Option<T>> {
    raw.map(|v| {
        v.parse().map_err(|_| {
            TollgateError::StoreUnavailable(format!("corrupt value {:?} under key {}", v, key))
        })
    })
    .transpose()
}

#[async_trait]
impl BucketStore for MemoryStore {
    async fn transition(&self, key: &BucketKey, request: TransitionRequest) -> Result<Transition> {
        let mut values = self.values.lock();

        let tokens: Option<f64> = parse_value(key.token_key(), values.get(key.token_key()))?;
        let last_refill: Option<i64> =
            parse_value(key.timestamp_key(), values.get(key.timestamp_key()))?;

        // Either key missing means the bucket starts over.
        let prior = match (tokens, last_refill) {
            (Some(tokens), Some(last_refill)) => Some(BucketState {
                tokens,
                last_refill,
            }),
            _ => None,
        };

        let transition = request.apply(prior);

        values.insert(key.token_key().to_string(), transition.state.tokens.to_string());
        values.insert(
            key.timestamp_key().to_string(),
            transition.state.last_refill.to_string(),
        );

        trace!(
            bucket = %key,
            admitted = transition.admitted,
            tokens = transition.state.tokens,
            "Applied bucket transition"
        );

        Ok(transition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const NOW: i64 = 1_704_067_200;

    fn request(n: u32) -> TransitionRequest {
        TransitionRequest {
            rate: 5.0,
            burst: 11,
            now: NOW,
            n,
        }
    }

    #[tokio::test]
    async fn test_first_transition_creates_both_keys() {
        let store = MemoryStore::new();
        let key = BucketKey::new("fresh");
        assert!(store.is_empty());

        let t = store.transition(&key, request(3)).await.unwrap();

        assert!(t.admitted);
        assert_eq!(store.len(), 2);
        assert_eq!(store.tokens(&key), Some(8.0));
        assert_eq!(store.last_refill(&key), Some(NOW));
        assert_eq!(store.get("fresh_token").as_deref(), Some("8"));
        assert_eq!(store.get("fresh_ts").as_deref(), Some("1704067200"));
    }

    #[tokio::test]
    async fn test_identities_are_independent() {
        let store = MemoryStore::new();
        let a = BucketKey::new("a");
        let b = BucketKey::new("b");

        store.transition(&a, request(10)).await.unwrap();
        store.transition(&b, request(1)).await.unwrap();

        assert_eq!(store.tokens(&a), Some(1.0));
        assert_eq!(store.tokens(&b), Some(10.0));
    }

    #[tokio::test]
    async fn test_corrupt_value_is_store_fault() {
        let store = MemoryStore::new();
        let key = BucketKey::new("broken");
        store
            .values
            .lock()
            .insert("broken_token".to_string(), "not-a-number".to_string());

        let err = store.transition(&key, request(1)).await.unwrap_err();
        assert!(matches!(err, TollgateError::StoreUnavailable(_)));
    }

    #[tokio::test]
    async fn test_flush_resets_bucket() {
        let store = MemoryStore::new();
        let key = BucketKey::new("flush");

        store.transition(&key, request(11)).await.unwrap();
        assert_eq!(store.tokens(&key), Some(0.0));

        store.flush();
        assert_eq!(store.tokens(&key), None);

        let t = store.transition(&key, request(11)).await.unwrap();
        assert!(t.admitted);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_transitions_do_not_double_spend() {
        let store = Arc::new(MemoryStore::new());
        let key = BucketKey::new("shared");

        let handles: Vec<_> = (0..20)
            .map(|_| {
                let store = store.clone();
                let key = key.clone();
                tokio::spawn(async move { store.transition(&key, request(1)).await.unwrap() })
            })
            .collect();

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap().admitted {
                admitted += 1;
            }
        }

        assert_eq!(admitted, 11);
        assert_eq!(store.tokens(&key), Some(0.0));
    }
}
