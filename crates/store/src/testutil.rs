//! Test support: a fast store whose every operation fails, for
//! exercising outage behavior in the components that depend on one.

use crate::FastStore;
use comply_core::{ComplyError, ComplyResult};

/// Store double that reports an outage on every call. Components under
/// test decide whether that propagates or degrades.
#[derive(Default)]
pub struct FailingStore;

impl FailingStore {
    pub fn new() -> Self {
        Self
    }

    fn outage<T>() -> ComplyResult<T> {
        Err(ComplyError::StoreUnavailable(
            "injected store outage".to_string(),
        ))
    }
}

#[async_trait::async_trait]
impl FastStore for FailingStore {
    async fn get(&self, _key: &str) -> ComplyResult<Option<String>> {
        Self::outage()
    }

    async fn set(&self, _key: &str, _value: &str, _ttl_secs: Option<u64>) -> ComplyResult<()> {
        Self::outage()
    }

    async fn set_nx(&self, _key: &str, _value: &str, _ttl_secs: u64) -> ComplyResult<bool> {
        Self::outage()
    }

    async fn incr(&self, _key: &str) -> ComplyResult<i64> {
        Self::outage()
    }

    async fn expire(&self, _key: &str, _ttl_secs: u64) -> ComplyResult<bool> {
        Self::outage()
    }

    async fn del(&self, _key: &str) -> ComplyResult<()> {
        Self::outage()
    }
}
