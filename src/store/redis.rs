//! Redis-backed bucket store.
//!
//! The transition runs as a server-side Lua script, so Redis executes the
//! whole read-refill-consume-write sequence without interleaving other
//! commands. The connection is owned by the caller and injected here.

use ::redis::aio::ConnectionManager;
use ::redis::Script;
use async_trait::async_trait;
use tracing::{trace, warn};

use super::BucketStore;
use crate::error::{Result, TollgateError};
use crate::ratelimit::{BucketKey, BucketState, Transition, TransitionRequest};

/// Token bucket transition, mirroring `TransitionRequest::apply`.
///
/// KEYS: token key, timestamp key.
/// ARGV: rate, burst, now (Unix seconds), requested tokens.
/// Returns `{admitted (0|1), tokens as string}`. Tokens are written with
/// 17 significant digits so the stored value round-trips to the same `f64`.
const TRANSITION_SCRIPT: &str = r#"
local token_key = KEYS[1]
local timestamp_key = KEYS[2]

local rate = tonumber(ARGV[1])
local burst = tonumber(ARGV[2])
local now = tonumber(ARGV[3])
local requested = tonumber(ARGV[4])

local tokens = tonumber(redis.call("GET", token_key))
local last_refill = tonumber(redis.call("GET", timestamp_key))
if tokens == nil or last_refill == nil then
  tokens = burst
  last_refill = now
end

local elapsed = math.max(0, now - last_refill)
if elapsed > 0 then
  tokens = math.min(burst, tokens + elapsed * rate)
else
  tokens = math.min(burst, tokens)
end

local admitted = 0
if tokens >= requested then
  admitted = 1
  tokens = tokens - requested
end

local encoded = string.format("%.17g", tokens)
redis.call("SET", token_key, encoded)
redis.call("SET", timestamp_key, now)

return {admitted, encoded}
"#;

/// A bucket store evaluating transitions inside Redis.
#[derive(Clone)]
pub struct RedisStore {
    /// Multiplexed connection supplied by the caller
    connection: ConnectionManager,
    /// The loaded transition script
    script: Script,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("script", &self.script.get_hash())
            .finish()
    }
}

impl RedisStore {
    /// Create a store over an established connection.
    pub fn new(connection: ConnectionManager) -> Self {
        Self {
            connection,
            script: Script::new(TRANSITION_SCRIPT),
        }
    }
}

#[async_trait]
impl BucketStore for RedisStore {
    async fn transition(&self, key: &BucketKey, request: TransitionRequest) -> Result<Transition> {
        // Lua cannot take an infinite rate; one second at `burst` per second
        // already refills the bucket completely.
        let rate = if request.rate.is_finite() {
            request.rate
        } else {
            request.burst as f64
        };

        let mut invocation = self.script.prepare_invoke();
        invocation
            .key(key.token_key())
            .key(key.timestamp_key())
            .arg(rate)
            .arg(request.burst)
            .arg(request.now)
            .arg(request.n);

        let mut connection = self.connection.clone();
        let (admitted, tokens): (i64, String) = invocation
            .invoke_async(&mut connection)
            .await
            .map_err(|e| {
                warn!(bucket = %key, error = %e, "Bucket transition script failed");
                TollgateError::from(e)
            })?;

        let tokens: f64 = tokens.parse().map_err(|_| {
            TollgateError::StoreUnavailable(format!(
                "unexpected token count {:?} for bucket {}",
                tokens, key
            ))
        })?;

        trace!(
            bucket = %key,
            admitted = admitted == 1,
            tokens = tokens,
            "Applied bucket transition in Redis"
        );

        Ok(Transition {
            admitted: admitted == 1,
            state: BucketState {
                tokens,
                last_refill: request.now,
            },
        })
    }
}
