//! Shared fast store abstraction: the only coordination point between
//! request-handling processes in the trust layer.

#![warn(clippy::unwrap_used)]

pub mod client;
pub mod memory;
pub mod testutil;

pub use client::RedisStore;
pub use memory::MemoryStore;

use comply_core::ComplyResult;

/// Client interface over the shared low-latency store. Only atomic
/// primitives are exposed; components are handed an `Arc<dyn FastStore>`
/// so tests can substitute [`MemoryStore`].
#[async_trait::async_trait]
pub trait FastStore: Send + Sync + 'static {
    /// Read a value. `None` when the key is absent or expired.
    async fn get(&self, key: &str) -> ComplyResult<Option<String>>;

    /// Write a value, optionally with a time-to-live in seconds.
    async fn set(&self, key: &str, value: &str, ttl_secs: Option<u64>) -> ComplyResult<()>;

    /// Conditional set: write only if the key is absent, with a TTL.
    /// Returns `true` when this caller won the write.
    async fn set_nx(&self, key: &str, value: &str, ttl_secs: u64) -> ComplyResult<bool>;

    /// Atomically increment an integer counter, creating it at 1.
    async fn incr(&self, key: &str) -> ComplyResult<i64>;

    /// Set a TTL on an existing key. Returns `false` if the key is absent.
    async fn expire(&self, key: &str, ttl_secs: u64) -> ComplyResult<bool>;

    /// Delete a key. Deleting an absent key is not an error.
    async fn del(&self, key: &str) -> ComplyResult<()>;
}
