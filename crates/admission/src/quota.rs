//! Per-organization usage quotas over rolling hourly/daily buckets.
//!
//! Counters live in the shared fast store so every process in the fleet
//! charges against the same numbers. A call is charged even when it ends
//! up denied; a denied request never becomes a free retry.

use chrono::Utc;
use comply_core::types::{QuotaLimit, QuotaWindow};
use comply_core::{ComplyError, ComplyResult};
use comply_store::FastStore;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::warn;

/// Atomically tracks and limits feature usage per organization.
pub struct QuotaEnforcer {
    store: Arc<dyn FastStore>,
    limits: DashMap<(String, String), Vec<QuotaLimit>>,
}

impl QuotaEnforcer {
    pub fn new(store: Arc<dyn FastStore>) -> Self {
        Self {
            store,
            limits: DashMap::new(),
        }
    }

    /// Register the configured caps for an (organization, feature) pair.
    /// Quota configuration is owned by an external store; this registry is
    /// the injection seam it feeds.
    pub fn set_limits(&self, org_id: &str, feature: &str, limits: Vec<QuotaLimit>) {
        self.limits
            .insert((org_id.to_string(), feature.to_string()), limits);
    }

    pub fn clear_limits(&self, org_id: &str, feature: &str) {
        self.limits
            .remove(&(org_id.to_string(), feature.to_string()));
    }

    fn counter_key(org_id: &str, feature: &str, window: QuotaWindow, bucket: &str) -> String {
        format!("quota:{org_id}:{feature}:{window}:{bucket}")
    }

    /// Charge one call against every configured window and report the
    /// first window whose limit it pushed past, if any. All windows are
    /// incremented regardless of the outcome.
    async fn consume(
        &self,
        org_id: &str,
        feature: &str,
    ) -> ComplyResult<Option<(QuotaWindow, u64)>> {
        let Some(limits) = self
            .limits
            .get(&(org_id.to_string(), feature.to_string()))
            .map(|l| l.clone())
        else {
            // No configuration means the feature is unmetered.
            return Ok(None);
        };

        let now = Utc::now();
        let mut exceeded = None;

        for cap in &limits {
            let bucket = cap.window.bucket_label(now);
            let key = Self::counter_key(org_id, feature, cap.window, &bucket);

            let count = self.store.incr(&key).await?;
            if count == 1 {
                // First increment in this bucket: align expiry with the
                // window's natural end. A crash between incr and expire
                // leaves the counter without a TTL; accepted risk.
                self.store.expire(&key, cap.window.secs()).await?;
            }

            if count as u64 > cap.limit && exceeded.is_none() {
                exceeded = Some((cap.window, cap.limit));
            }
        }

        Ok(exceeded)
    }

    /// Check and consume one unit of usage. `Ok(true)` admits the call;
    /// `Ok(false)` denies it (a normal outcome, already charged). A store
    /// failure propagates: this never silently fails open or closed.
    pub async fn check_and_consume(&self, org_id: &str, feature: &str) -> ComplyResult<bool> {
        match self.consume(org_id, feature).await? {
            None => {
                metrics::counter!("quota.allowed").increment(1);
                Ok(true)
            }
            Some((window, limit)) => {
                metrics::counter!("quota.denied").increment(1);
                warn!(
                    org_id = org_id,
                    feature = feature,
                    window = %window,
                    limit = limit,
                    "Quota exceeded"
                );
                Ok(false)
            }
        }
    }

    /// Error-returning variant for call sites that want denial as a
    /// `QuotaExceeded` carrying the offending window.
    pub async fn enforce(&self, org_id: &str, feature: &str) -> ComplyResult<()> {
        match self.consume(org_id, feature).await? {
            None => Ok(()),
            Some((window, limit)) => Err(ComplyError::QuotaExceeded {
                feature: feature.to_string(),
                window,
                limit,
            }),
        }
    }

    /// Current usage in the active bucket for one window. Read-only.
    pub async fn usage(
        &self,
        org_id: &str,
        feature: &str,
        window: QuotaWindow,
    ) -> ComplyResult<u64> {
        let bucket = window.bucket_label(Utc::now());
        let key = Self::counter_key(org_id, feature, window, &bucket);
        Ok(self
            .store
            .get(&key)
            .await?
            .and_then(|v| v.parse().ok())
            .unwrap_or(0))
    }
}
