//! OIDC single sign-on verifier: drives the authorization-code flow and
//! validates the identity token the provider returns.
//!
//! # Verification flow
//!
//! 1. Build the authorization URL with a per-attempt state and nonce.
//! 2. Exchange the callback code for tokens at the provider's token
//!    endpoint (server-to-server).
//! 3. Decode the ID token header untrusted, resolve the signing key by
//!    `kid` through the shared [`JwksCache`], and verify the signature
//!    under the header's declared algorithm.
//! 4. Compare the token nonce against the one recorded for this flow
//!    (replay / token-substitution defense).

use crate::jwks::{decoding_key, JwksCache};
use comply_core::config::OidcConfig;
use comply_core::types::IdentityClaims;
use comply_core::{ComplyError, ComplyResult};
use comply_store::FastStore;
use jsonwebtoken::Validation;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// Successful token-endpoint response.
#[derive(Debug, Clone)]
pub struct TokenExchange {
    pub id_token: String,
    pub access_token: Option<String>,
}

/// Drives the authorization-code flow against one configured provider.
pub struct SsoVerifier {
    cfg: OidcConfig,
    http: reqwest::Client,
    jwks: JwksCache,
}

impl SsoVerifier {
    pub fn new(cfg: OidcConfig, store: Arc<dyn FastStore>) -> ComplyResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(cfg.http_timeout_ms))
            .build()
            .map_err(|e| ComplyError::Config(format!("HTTP client build failed: {e}")))?;
        let jwks = JwksCache::new(&cfg, store, http.clone());
        Ok(Self { cfg, http, jwks })
    }

    /// Construct the provider authorization URL. Pure function of the
    /// configuration and the caller-supplied state/nonce.
    pub fn build_authorization_url(&self, state: &str, nonce: &str) -> ComplyResult<Url> {
        let mut url = Url::parse(&self.cfg.auth_url)
            .map_err(|e| ComplyError::Config(format!("invalid OIDC_AUTH_URL: {e}")))?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.cfg.client_id)
            .append_pair("redirect_uri", &self.cfg.redirect_uri)
            .append_pair("scope", &self.cfg.scope)
            .append_pair("state", state)
            .append_pair("nonce", nonce);
        Ok(url)
    }

    /// Exchange an authorization code for tokens.
    pub async fn exchange_code_for_token(&self, code: &str) -> ComplyResult<TokenExchange> {
        let mut form = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.cfg.redirect_uri.as_str()),
            ("client_id", self.cfg.client_id.as_str()),
        ];
        if let Some(secret) = self.cfg.client_secret.as_deref() {
            form.push(("client_secret", secret));
        }

        let resp = self
            .http
            .post(&self.cfg.token_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| ComplyError::Upstream(format!("token exchange failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ComplyError::Upstream(format!(
                "token endpoint returned {status}"
            )));
        }

        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| ComplyError::Upstream(format!("token response not JSON: {e}")))?;

        let id_token = body
            .get("id_token")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ComplyError::Upstream("token response missing id_token".to_string()))?
            .to_string();
        let access_token = body
            .get("access_token")
            .and_then(|v| v.as_str())
            .map(String::from);

        debug!("Authorization code exchanged");
        Ok(TokenExchange {
            id_token,
            access_token,
        })
    }

    /// Verify an identity token and return its claims.
    ///
    /// The header is decoded without trust to learn the algorithm and key
    /// id; the signature is then recomputed over the `header.payload`
    /// bytes with the key the JWKS cache resolves. When `expected_nonce`
    /// is given it must match the token's `nonce` claim exactly.
    pub async fn verify_identity_token(
        &self,
        id_token: &str,
        expected_nonce: Option<&str>,
    ) -> ComplyResult<IdentityClaims> {
        let header = jsonwebtoken::decode_header(id_token)
            .map_err(|e| ComplyError::Verification(format!("malformed token header: {e}")))?;
        let kid = header
            .kid
            .as_deref()
            .ok_or_else(|| ComplyError::Verification("token header missing key id".to_string()))?;

        let jwk = self.jwks.get_key(kid).await?;
        let key = decoding_key(&jwk)?;

        let mut validation = Validation::new(header.alg);
        validation.set_audience(&[&self.cfg.client_id]);
        validation.leeway = 60; // tolerate minor IdP clock skew

        let data = jsonwebtoken::decode::<IdentityClaims>(id_token, &key, &validation)
            .map_err(|e| ComplyError::Verification(format!("token rejected: {e}")))?;

        if let Some(expected) = expected_nonce {
            match data.claims.nonce.as_deref() {
                Some(actual) if actual == expected => {}
                _ => {
                    return Err(ComplyError::Verification(
                        "nonce mismatch (possible replay)".to_string(),
                    ))
                }
            }
        }

        info!(sub = %data.claims.sub, iss = %data.claims.iss, "Identity token verified");
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use comply_store::MemoryStore;

    fn verifier() -> SsoVerifier {
        let cfg = OidcConfig {
            auth_url: "https://idp.example.com/authorize".into(),
            token_url: "https://idp.example.com/token".into(),
            jwks_url: "https://idp.example.com/jwks.json".into(),
            client_id: "comply-client".into(),
            redirect_uri: "https://app.example.com/callback".into(),
            scope: "openid email profile".into(),
            http_timeout_ms: 1_000,
            jwks_cache_ttl_secs: 3_600,
            ..Default::default()
        };
        SsoVerifier::new(cfg, Arc::new(MemoryStore::new())).unwrap()
    }

    #[test]
    fn test_authorization_url_parameters() {
        let url = verifier().build_authorization_url("s1", "n1").unwrap();

        assert_eq!(url.host_str(), Some("idp.example.com"));
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        let get = |name: &str| {
            pairs
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.as_str())
        };

        assert_eq!(get("response_type"), Some("code"));
        assert_eq!(get("client_id"), Some("comply-client"));
        assert_eq!(get("redirect_uri"), Some("https://app.example.com/callback"));
        assert_eq!(get("scope"), Some("openid email profile"));
        assert_eq!(get("state"), Some("s1"));
        assert_eq!(get("nonce"), Some("n1"));
    }

    #[test]
    fn test_authorization_url_is_deterministic() {
        let v = verifier();
        let a = v.build_authorization_url("s", "n").unwrap();
        let b = v.build_authorization_url("s", "n").unwrap();
        assert_eq!(a.as_str(), b.as_str());
    }

    #[tokio::test]
    async fn test_garbage_token_is_a_verification_error() {
        let err = verifier()
            .verify_identity_token("not-a-jwt", None)
            .await
            .unwrap_err();
        assert!(matches!(err, ComplyError::Verification(_)), "got {err}");
    }
}
