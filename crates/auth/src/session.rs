//! Application session tokens: compact HS256-signed credentials minted
//! after a verified SSO login. Stateless; the only lifetime control is
//! the embedded expiry.

use chrono::Utc;
use comply_core::config::{SessionConfig, DEV_SIGNING_SECRET};
use comply_core::types::SessionClaims;
use comply_core::{ComplyError, ComplyResult};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use tracing::warn;

/// Mints and validates session tokens with a server-held secret.
///
/// These tokens are deliberately symmetric (HS256) and distinct from the
/// provider's asymmetric identity tokens; nothing outside this service
/// should ever be asked to verify one.
pub struct SessionSigner {
    encoding: EncodingKey,
    decoding: DecodingKey,
    default_ttl_secs: u64,
}

impl SessionSigner {
    pub fn new(cfg: &SessionConfig) -> Self {
        if cfg.signing_secret == DEV_SIGNING_SECRET {
            warn!("Session signer running with the development fallback secret");
        }
        Self {
            encoding: EncodingKey::from_secret(cfg.signing_secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.signing_secret.as_bytes()),
            default_ttl_secs: cfg.ttl_secs,
        }
    }

    /// Sign the claims into a three-segment token (base64url header,
    /// payload, HMAC-SHA256 signature). `iat`/`exp` are stamped here;
    /// whatever the caller put in them is overwritten.
    pub fn sign(&self, claims: &SessionClaims, ttl_secs: Option<u64>) -> ComplyResult<String> {
        let now = Utc::now().timestamp() as u64;
        let mut claims = claims.clone();
        claims.iat = now;
        claims.exp = now + ttl_secs.unwrap_or(self.default_ttl_secs);

        jsonwebtoken::encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| ComplyError::Internal(anyhow::anyhow!("session token encode: {e}")))
    }

    /// Validate a session token: constant-time HMAC comparison and expiry
    /// check. Every failure mode is a `Verification` error.
    pub fn verify(&self, token: &str) -> ComplyResult<SessionClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_aud = false;
        validation.leeway = 0;

        jsonwebtoken::decode::<SessionClaims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| ComplyError::Verification(format!("session token rejected: {e}")))
    }
}
