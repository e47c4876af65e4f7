use crate::types::QuotaWindow;
use thiserror::Error;

pub type ComplyResult<T> = Result<T, ComplyError>;

#[derive(Error, Debug)]
pub enum ComplyError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Identity provider error: {0}")]
    Upstream(String),

    #[error("Token verification failed: {0}")]
    Verification(String),

    #[error("Quota exceeded for feature '{feature}' ({window} window, limit {limit})")]
    QuotaExceeded {
        feature: String,
        window: QuotaWindow,
        limit: u64,
    },

    #[error("Shared store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<redis::RedisError> for ComplyError {
    fn from(err: redis::RedisError) -> Self {
        ComplyError::StoreUnavailable(err.to_string())
    }
}
