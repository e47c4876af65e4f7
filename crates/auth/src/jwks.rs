//! JWKS key cache shared through the fast store.
//!
//! All verifier instances in a fleet read the same cached key set, so the
//! identity provider sees at most one fetch per TTL window instead of a
//! thundering herd, and a rotated key becomes visible everywhere within
//! one TTL.

use comply_core::config::OidcConfig;
use comply_core::{ComplyError, ComplyResult};
use comply_store::FastStore;
use jsonwebtoken::jwk::{AlgorithmParameters, Jwk, JwkSet};
use jsonwebtoken::DecodingKey;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, warn};

/// Fetches and caches the identity provider's public signing keys.
pub struct JwksCache {
    jwks_url: String,
    ttl_secs: u64,
    store: Arc<dyn FastStore>,
    http: reqwest::Client,
}

impl JwksCache {
    pub fn new(cfg: &OidcConfig, store: Arc<dyn FastStore>, http: reqwest::Client) -> Self {
        Self {
            jwks_url: cfg.jwks_url.clone(),
            ttl_secs: cfg.jwks_cache_ttl_secs,
            store,
            http,
        }
    }

    /// Stable cache key derived from the JWKS URL, one entry per endpoint.
    fn cache_key(&self) -> String {
        let digest = Sha256::digest(self.jwks_url.as_bytes());
        format!("jwks:{}", hex::encode(digest))
    }

    /// Resolve a signing key by key id.
    ///
    /// Serves from the shared cache when possible. A missing or expired
    /// cache entry, or a cached set that does not contain `kid` (rotation),
    /// triggers one fresh fetch. A kid that is still unknown after that
    /// fetch is treated as a verification failure, not retried.
    pub async fn get_key(&self, kid: &str) -> ComplyResult<Jwk> {
        let cache_key = self.cache_key();

        match self.store.get(&cache_key).await {
            Ok(Some(raw)) => {
                if let Ok(set) = serde_json::from_str::<JwkSet>(&raw) {
                    if let Some(jwk) = set.find(kid) {
                        metrics::counter!("jwks.cache.hit").increment(1);
                        return Ok(jwk.clone());
                    }
                    debug!(kid = kid, "Key id not in cached JWKS, refetching");
                }
            }
            Ok(None) => {}
            // The cache is an optimization; a flaky store falls back to a
            // direct fetch rather than failing the login.
            Err(err) => warn!(error = %err, "JWKS cache read failed, fetching directly"),
        }
        metrics::counter!("jwks.cache.miss").increment(1);

        let raw = self.fetch().await?;
        let set: JwkSet = serde_json::from_str(&raw)
            .map_err(|e| ComplyError::Upstream(format!("JWKS endpoint returned invalid JSON: {e}")))?;

        if let Err(err) = self.store.set(&cache_key, &raw, Some(self.ttl_secs)).await {
            warn!(error = %err, "JWKS cache write failed");
        }

        set.find(kid).cloned().ok_or_else(|| {
            ComplyError::Verification(format!("unknown key id '{kid}' (rotated out or forged)"))
        })
    }

    async fn fetch(&self) -> ComplyResult<String> {
        debug!(url = %self.jwks_url, "Fetching JWKS");
        let resp = self
            .http
            .get(&self.jwks_url)
            .send()
            .await
            .map_err(|e| ComplyError::Upstream(format!("JWKS fetch failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ComplyError::Upstream(format!(
                "JWKS endpoint returned {status}"
            )));
        }
        resp.text()
            .await
            .map_err(|e| ComplyError::Upstream(format!("JWKS body read failed: {e}")))
    }
}

/// Convert a JWK into a verification key for its declared key type.
pub fn decoding_key(jwk: &Jwk) -> ComplyResult<DecodingKey> {
    match &jwk.algorithm {
        AlgorithmParameters::RSA(rsa) => DecodingKey::from_rsa_components(&rsa.n, &rsa.e)
            .map_err(|e| ComplyError::Verification(format!("unusable RSA key: {e}"))),
        AlgorithmParameters::EllipticCurve(ec) => DecodingKey::from_ec_components(&ec.x, &ec.y)
            .map_err(|e| ComplyError::Verification(format!("unusable EC key: {e}"))),
        AlgorithmParameters::OctetKey(oct) => {
            use base64::Engine;
            let secret = base64::engine::general_purpose::URL_SAFE_NO_PAD
                .decode(&oct.value)
                .map_err(|e| ComplyError::Verification(format!("unusable octet key: {e}")))?;
            Ok(DecodingKey::from_secret(&secret))
        }
        AlgorithmParameters::OctetKeyPair(_) => Err(ComplyError::Verification(
            "unsupported JWKS key type".to_string(),
        )),
    }
}
