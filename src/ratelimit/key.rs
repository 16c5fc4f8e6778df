//! Store key derivation for bucket identities.

/// Suffix of the key holding the current token count.
const TOKEN_SUFFIX: &str = "_token";
/// Suffix of the key holding the last refill time.
const TIMESTAMP_SUFFIX: &str = "_ts";

/// The pair of store keys backing one named bucket.
///
/// Every client sharing an identity derives the same keys, which is what
/// makes the bucket shared across processes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BucketKey {
    /// The bucket identity
    identity: String,
    /// Key of the persisted token count
    token_key: String,
    /// Key of the persisted last refill time (Unix seconds)
    timestamp_key: String,
}

impl BucketKey {
    /// Derive the store keys for a bucket identity.
    pub fn new(identity: &str) -> Self {
        Self {
            identity: identity.to_string(),
            token_key: format!("{}{}", identity, TOKEN_SUFFIX),
            timestamp_key: format!("{}{}", identity, TIMESTAMP_SUFFIX),
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn token_key(&self) -> &str {
        &self.token_key
    }

    pub fn timestamp_key(&self) -> &str {
        &self.timestamp_key
    }
}

impl std::fmt::Display for BucketKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.identity)
    }
}
