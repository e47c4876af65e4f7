//! Cluster-wide single-flight: concurrent duplicate invocations of an
//! expensive idempotent task collapse into one execution, with every
//! caller observing the same published result.
//!
//! The lock is a conditional set in the shared store, so "at most one
//! owner per key" holds across all processes, not just this one. Waiters
//! poll for the published result; if the TTL elapses without one (owner
//! crashed, or its task failed), they fall back to executing the task
//! themselves rather than blocking forever.

use comply_core::ComplyResult;
use comply_store::FastStore;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use uuid::Uuid;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Deduplicates concurrent executions of a keyed task.
pub struct SingleFlight {
    store: Arc<dyn FastStore>,
    poll_interval: Duration,
}

impl SingleFlight {
    pub fn new(store: Arc<dyn FastStore>) -> Self {
        Self {
            store,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Override the waiter poll interval. Tests use a tight interval.
    pub fn with_poll_interval(store: Arc<dyn FastStore>, poll_interval: Duration) -> Self {
        Self {
            store,
            poll_interval,
        }
    }

    /// Run `task` under single-flight semantics for `key`.
    ///
    /// The caller that wins the lock executes the task, publishes its
    /// result for `ttl_secs`, and releases the lock whether the task
    /// succeeded or not. Everyone else waits for the published result, up
    /// to `ttl_secs`, then degrades to running the task locally.
    ///
    /// A call arriving while a previously published result is still live
    /// (within `ttl_secs` of the owner finishing) is served that result
    /// without executing the task at all, even when no lock is held.
    pub async fn run<T, F, Fut>(&self, key: &str, ttl_secs: u64, task: F) -> ComplyResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = ComplyResult<T>>,
    {
        let lock_key = format!("sf:lock:{key}");
        let result_key = format!("sf:res:{key}");
        let owner_id = Uuid::new_v4().simple().to_string();

        // Fast path: a still-live result from a just-finished owner.
        if let Some(json) = self.store.get(&result_key).await? {
            metrics::counter!("sf.result.awaited").increment(1);
            return Ok(serde_json::from_str(&json)?);
        }

        if self.store.set_nx(&lock_key, &owner_id, ttl_secs).await? {
            metrics::counter!("sf.lock.acquired").increment(1);
            debug!(key = key, "Single-flight lock acquired");

            let outcome = task().await;

            if let Ok(value) = &outcome {
                match serde_json::to_string(value) {
                    Ok(json) => {
                        if let Err(err) = self.store.set(&result_key, &json, Some(ttl_secs)).await {
                            warn!(key = key, error = %err, "Single-flight result publish failed");
                        }
                    }
                    Err(err) => {
                        warn!(key = key, error = %err, "Single-flight result not serializable")
                    }
                }
            }

            // Release unconditionally; a failed task must not leave the
            // key locked until TTL expiry.
            if let Err(err) = self.store.del(&lock_key).await {
                warn!(key = key, error = %err, "Single-flight lock release failed");
            }

            return outcome;
        }

        // Waiter path.
        let deadline = Instant::now() + Duration::from_secs(ttl_secs);
        while Instant::now() < deadline {
            if let Some(json) = self.store.get(&result_key).await? {
                metrics::counter!("sf.result.awaited").increment(1);
                return Ok(serde_json::from_str(&json)?);
            }
            tokio::time::sleep(self.poll_interval).await;
        }

        metrics::counter!("sf.fallback").increment(1);
        warn!(key = key, "Single-flight wait timed out, executing locally");
        task().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use comply_store::MemoryStore;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_owner_runs_and_publishes() {
        let store = Arc::new(MemoryStore::new());
        let sf = SingleFlight::new(store.clone());

        let value: u32 = sf.run("job-1", 30, || async { Ok(7) }).await.unwrap();
        assert_eq!(value, 7);

        // Lock released, result published.
        assert_eq!(store.get("sf:lock:job-1").await.unwrap(), None);
        assert_eq!(store.get("sf:res:job-1").await.unwrap().as_deref(), Some("7"));
    }

    #[tokio::test]
    async fn test_live_result_served_without_reexecution() {
        let store = Arc::new(MemoryStore::new());
        let sf = SingleFlight::new(store.clone());
        let executions = Arc::new(AtomicU32::new(0));

        for _ in 0..3 {
            let executions = executions.clone();
            let value: u32 = sf
                .run("memoized", 30, move || async move {
                    executions.fetch_add(1, Ordering::SeqCst);
                    Ok(11)
                })
                .await
                .unwrap();
            assert_eq!(value, 11);
        }

        // Sequential calls inside the result TTL reuse the published
        // value; the task ran for the first caller only.
        assert_eq!(executions.load(Ordering::SeqCst), 1);

        // Once the result expires the task executes again.
        store.expire_now("sf:res:memoized");
        let executions_again = executions.clone();
        let value: u32 = sf
            .run("memoized", 30, move || async move {
                executions_again.fetch_add(1, Ordering::SeqCst);
                Ok(12)
            })
            .await
            .unwrap();
        assert_eq!(value, 12);
        assert_eq!(executions.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failed_task_releases_lock_and_publishes_nothing() {
        let store = Arc::new(MemoryStore::new());
        let sf = SingleFlight::new(store.clone());

        let result: ComplyResult<u32> = sf
            .run("job-err", 30, || async {
                Err(comply_core::ComplyError::Upstream("boom".to_string()))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(store.get("sf:lock:job-err").await.unwrap(), None);
        assert_eq!(store.get("sf:res:job-err").await.unwrap(), None);

        // Key is immediately reusable.
        let value: u32 = sf.run("job-err", 30, || async { Ok(1) }).await.unwrap();
        assert_eq!(value, 1);
    }

    #[tokio::test]
    async fn test_waiter_returns_published_result() {
        let store = Arc::new(MemoryStore::new());
        let sf = SingleFlight::with_poll_interval(store.clone(), Duration::from_millis(5));

        // Someone else holds the lock and publishes while we wait.
        assert!(store.set_nx("sf:lock:shared", "other", 30).await.unwrap());
        let publisher = {
            let store = store.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(30)).await;
                store.set("sf:res:shared", "\"ready\"", Some(30)).await.unwrap();
            })
        };

        let ran = Arc::new(AtomicU32::new(0));
        let ran_in_task = ran.clone();
        let value: String = sf
            .run("shared", 30, move || async move {
                ran_in_task.fetch_add(1, Ordering::SeqCst);
                Ok("local".to_string())
            })
            .await
            .unwrap();

        publisher.await.unwrap();
        assert_eq!(value, "ready");
        assert_eq!(ran.load(Ordering::SeqCst), 0, "waiter must not run the task");
    }

    #[tokio::test]
    async fn test_ttl_elapsed_falls_back_to_local_execution() {
        let store = Arc::new(MemoryStore::new());
        let sf = SingleFlight::with_poll_interval(store.clone(), Duration::from_millis(5));

        // Phantom owner that never publishes a result.
        assert!(store.set_nx("sf:lock:stuck", "ghost", 60).await.unwrap());

        let ran = Arc::new(AtomicU32::new(0));
        let ran_in_task = ran.clone();
        let value: u32 = sf
            .run("stuck", 1, move || async move {
                ran_in_task.fetch_add(1, Ordering::SeqCst);
                Ok(99)
            })
            .await
            .unwrap();

        assert_eq!(value, 99);
        assert_eq!(ran.load(Ordering::SeqCst), 1, "degraded path runs locally");
    }
}
