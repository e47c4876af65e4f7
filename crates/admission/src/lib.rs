//! Admission control: per-organization request gating via quota counters,
//! feature flags, and cluster-wide single-flight deduplication. Everything
//! here coordinates through the shared fast store only; no in-process
//! state is shared across requests.

#![warn(clippy::unwrap_used)]

pub mod flags;
pub mod quota;
pub mod single_flight;

pub use flags::FlagResolver;
pub use quota::QuotaEnforcer;
pub use single_flight::SingleFlight;
