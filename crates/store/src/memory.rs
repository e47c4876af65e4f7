//! In-memory fast store backed by DashMap. Behaves like a single-node
//! Redis for the subset of operations the trust layer uses; every unit
//! test injects this in place of [`crate::RedisStore`].

use crate::FastStore;
use comply_core::{ComplyError, ComplyResult};
use dashmap::DashMap;
use std::time::{Duration, Instant};

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

/// Process-local stand-in for the shared store. Atomicity comes from the
/// DashMap shard locks, which serialize all mutations of a key.
#[derive(Default)]
pub struct MemoryStore {
    entries: DashMap<String, Entry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn deadline(ttl_secs: u64) -> Option<Instant> {
        Some(Instant::now() + Duration::from_secs(ttl_secs))
    }

    /// Remove expired entries. Reads already honor expiry; this just
    /// reclaims memory in long-lived test harnesses.
    pub fn evict_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, e| !e.expired());
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Force-expire a key immediately. Test hook for exercising bucket
    /// rollover and cache-expiry paths without sleeping.
    pub fn expire_now(&self, key: &str) {
        self.entries.remove(key);
    }
}

#[async_trait::async_trait]
impl FastStore for MemoryStore {
    async fn get(&self, key: &str) -> ComplyResult<Option<String>> {
        if let Some(entry) = self.entries.get(key) {
            if entry.expired() {
                drop(entry);
                self.entries.remove(key);
                return Ok(None);
            }
            return Ok(Some(entry.value.clone()));
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str, ttl_secs: Option<u64>) -> ComplyResult<()> {
        self.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: ttl_secs.and_then(Self::deadline),
            },
        );
        Ok(())
    }

    async fn set_nx(&self, key: &str, value: &str, ttl_secs: u64) -> ComplyResult<bool> {
        let mut won = false;
        let mut entry = self.entries.entry(key.to_string()).or_insert_with(|| {
            won = true;
            Entry {
                value: value.to_string(),
                expires_at: Self::deadline(ttl_secs),
            }
        });
        // An expired holdover counts as absent.
        if !won && entry.expired() {
            entry.value = value.to_string();
            entry.expires_at = Self::deadline(ttl_secs);
            won = true;
        }
        Ok(won)
    }

    async fn incr(&self, key: &str) -> ComplyResult<i64> {
        let mut entry = self.entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: "0".to_string(),
            expires_at: None,
        });
        if entry.expired() {
            entry.value = "0".to_string();
            entry.expires_at = None;
        }
        let count: i64 = entry
            .value
            .parse()
            .map_err(|_| ComplyError::StoreUnavailable(format!("non-integer value at {key}")))?;
        let count = count + 1;
        entry.value = count.to_string();
        Ok(count)
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> ComplyResult<bool> {
        match self.entries.get_mut(key) {
            Some(mut entry) if !entry.expired() => {
                entry.expires_at = Self::deadline(ttl_secs);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn del(&self, key: &str) -> ComplyResult<()> {
        self.entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_del() {
        let store = MemoryStore::new();
        assert_eq!(store.get("k").await.unwrap(), None);

        store.set("k", "v", None).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));

        store.del("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_nx_only_one_winner() {
        let store = MemoryStore::new();
        assert!(store.set_nx("lock", "a", 60).await.unwrap());
        assert!(!store.set_nx("lock", "b", 60).await.unwrap());
        // Value is the first writer's.
        assert_eq!(store.get("lock").await.unwrap().as_deref(), Some("a"));

        store.del("lock").await.unwrap();
        assert!(store.set_nx("lock", "b", 60).await.unwrap());
    }

    #[tokio::test]
    async fn test_incr_counts_from_one() {
        let store = MemoryStore::new();
        assert_eq!(store.incr("counter").await.unwrap(), 1);
        assert_eq!(store.incr("counter").await.unwrap(), 2);
        assert_eq!(store.incr("counter").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_expire_and_eviction() {
        let store = MemoryStore::new();
        store.set("k", "v", Some(600)).await.unwrap();
        assert!(store.expire("k", 600).await.unwrap());
        assert!(!store.expire("missing", 600).await.unwrap());

        store.expire_now("k");
        assert_eq!(store.get("k").await.unwrap(), None);

        store.set("stays", "v", None).await.unwrap();
        assert_eq!(store.evict_expired(), 0);
        assert_eq!(store.len(), 1);
    }
}
