//! Shared types for the trust and admission-control layer.

use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Administrative window over which a metered feature is capped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaWindow {
    Hourly,
    Daily,
}

impl QuotaWindow {
    /// Natural duration of the window in seconds. Counters created in a
    /// bucket expire after this long.
    pub fn secs(self) -> u64 {
        match self {
            Self::Hourly => 3_600,
            Self::Daily => 86_400,
        }
    }

    /// Deterministic bucket label for the given instant, UTC-based and
    /// unpadded. Pure function: concurrent callers always agree.
    pub fn bucket_label(self, at: DateTime<Utc>) -> String {
        match self {
            Self::Hourly => format!("{}-{}-{}-{}", at.year(), at.month(), at.day(), at.hour()),
            Self::Daily => format!("{}-{}-{}", at.year(), at.month(), at.day()),
        }
    }
}

impl std::fmt::Display for QuotaWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Hourly => write!(f, "hourly"),
            Self::Daily => write!(f, "daily"),
        }
    }
}

/// A single configured cap for an (organization, feature) pair. One pair may
/// carry several of these (e.g. both an hourly and a daily cap).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaLimit {
    pub window: QuotaWindow,
    pub limit: u64,
}

/// Claims carried by an application session token, minted after a verified
/// SSO login. Stateless: lifetime is bounded by `exp` alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Subject (user) identifier.
    pub sub: String,
    /// Organization the session is scoped to.
    pub org_id: String,
    /// Role within the organization.
    pub role: String,
    /// Issued-at, Unix seconds. Filled by the signer.
    #[serde(default)]
    pub iat: u64,
    /// Expiry, Unix seconds. Filled by the signer.
    #[serde(default)]
    pub exp: u64,
    /// Any additional claims the caller attached at sign time.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Verified claims decoded from an identity provider's ID token. The
/// verifier reads this, never mutates it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityClaims {
    pub iss: String,
    pub sub: String,
    /// Audience; providers emit either a string or an array.
    #[serde(default)]
    pub aud: serde_json::Value,
    pub exp: u64,
    pub iat: u64,
    #[serde(default)]
    pub nonce: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_bucket_labels_are_deterministic() {
        let at = Utc.with_ymd_and_hms(2026, 3, 7, 14, 59, 59).unwrap();
        assert_eq!(QuotaWindow::Hourly.bucket_label(at), "2026-3-7-14");
        assert_eq!(QuotaWindow::Daily.bucket_label(at), "2026-3-7");

        // Same instant computed twice agrees.
        assert_eq!(
            QuotaWindow::Hourly.bucket_label(at),
            QuotaWindow::Hourly.bucket_label(at)
        );
    }

    #[test]
    fn test_bucket_rolls_over_on_the_hour() {
        let before = Utc.with_ymd_and_hms(2026, 3, 7, 14, 59, 59).unwrap();
        let after = Utc.with_ymd_and_hms(2026, 3, 7, 15, 0, 0).unwrap();
        assert_ne!(
            QuotaWindow::Hourly.bucket_label(before),
            QuotaWindow::Hourly.bucket_label(after)
        );
        // Daily bucket is unchanged across an hour boundary.
        assert_eq!(
            QuotaWindow::Daily.bucket_label(before),
            QuotaWindow::Daily.bucket_label(after)
        );
    }

    #[test]
    fn test_window_durations() {
        assert_eq!(QuotaWindow::Hourly.secs(), 3_600);
        assert_eq!(QuotaWindow::Daily.secs(), 86_400);
    }

    #[test]
    fn test_session_claims_roundtrip_preserves_extra() {
        let mut extra = BTreeMap::new();
        extra.insert("plan".to_string(), serde_json::json!("enterprise"));
        let claims = SessionClaims {
            sub: "user-1".into(),
            org_id: "org-1".into(),
            role: "admin".into(),
            iat: 1_700_000_000,
            exp: 1_700_003_600,
            extra,
        };

        let json = serde_json::to_string(&claims).unwrap();
        // Flattened extra claims sit at the top level of the payload.
        assert!(json.contains("\"plan\":\"enterprise\""));

        let back: SessionClaims = serde_json::from_str(&json).unwrap();
        assert_eq!(back.org_id, "org-1");
        assert_eq!(back.extra["plan"], serde_json::json!("enterprise"));
    }
}
