//! Error types for Tollgate.

use thiserror::Error;

use crate::ratelimit::CancelCause;

/// Main error type for Tollgate operations.
///
/// A denied admission is not an error: `allow_n` reports it as `Ok(false)`.
#[derive(Error, Debug)]
pub enum TollgateError {
    /// The bucket transition could not be executed against the store
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// A blocking wait was interrupted before capacity became available
    #[error("Wait cancelled: {0}")]
    Cancelled(CancelCause),

    /// Rate or burst outside the accepted range
    #[error("Invalid limit: {0}")]
    InvalidLimit(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TollgateError {
    /// Returns `true` if this error came from a cancelled or expired wait.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TollgateError::Cancelled(_))
    }
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for TollgateError {
    fn from(err: redis::RedisError) -> Self {
        TollgateError::StoreUnavailable(err.to_string())
    }
}

/// Result type alias for Tollgate operations.
pub type Result<T> = std::result::Result<T, TollgateError>;
