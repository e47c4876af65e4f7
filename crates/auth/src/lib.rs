//! Identity layer: OIDC single sign-on verification, JWKS key caching,
//! login flow state, and application session token minting.

#![warn(clippy::unwrap_used)]

pub mod flow;
pub mod jwks;
pub mod oidc;
pub mod session;

pub use flow::{FlowStore, LoginFlow};
pub use jwks::JwksCache;
pub use oidc::{SsoVerifier, TokenExchange};
pub use session::SessionSigner;
