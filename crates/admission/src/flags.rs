//! Boolean feature flags with strict precedence: organization override,
//! then global override, then an environment default, then `false`.
//! Flag lookups degrade gracefully: a flaky store falls through to the
//! next tier instead of failing the request.

use comply_core::{ComplyError, ComplyResult};
use comply_store::FastStore;
use std::sync::Arc;
use tracing::{debug, info};

/// Resolves a named capability per organization.
pub struct FlagResolver {
    store: Arc<dyn FastStore>,
}

impl FlagResolver {
    pub fn new(store: Arc<dyn FastStore>) -> Self {
        Self { store }
    }

    fn org_key(name: &str, org_id: &str) -> String {
        format!("flag:{name}:org:{org_id}")
    }

    fn global_key(name: &str) -> String {
        format!("flag:{name}:global")
    }

    /// Environment variable carrying the default for a flag name:
    /// uppercased, non-alphanumeric characters replaced with `_`,
    /// prefixed `FLAG_`.
    pub fn env_var_name(name: &str) -> String {
        let mangled: String = name
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_uppercase()
                } else {
                    '_'
                }
            })
            .collect();
        format!("FLAG_{mangled}")
    }

    fn parse_bool(value: &str) -> bool {
        value.eq_ignore_ascii_case("true") || value == "1"
    }

    async fn lookup(&self, key: &str) -> Option<bool> {
        match self.store.get(key).await {
            Ok(Some(value)) => Some(Self::parse_bool(&value)),
            Ok(None) => None,
            Err(err) => {
                debug!(key = key, error = %err, "Flag lookup failed, treating as absent");
                None
            }
        }
    }

    /// Resolve a flag. Precedence is strict and total: org override >
    /// global override > `FLAG_*` environment default > `false`.
    pub async fn is_enabled(&self, name: &str, org_id: Option<&str>) -> bool {
        if let Some(org) = org_id {
            if let Some(value) = self.lookup(&Self::org_key(name, org)).await {
                return value;
            }
        }
        if let Some(value) = self.lookup(&Self::global_key(name)).await {
            return value;
        }
        if let Ok(value) = std::env::var(Self::env_var_name(name)) {
            return Self::parse_bool(&value);
        }
        false
    }

    /// Write an override at the chosen scope. Overrides persist until
    /// cleared; no TTL.
    pub async fn set_flag(&self, name: &str, value: bool, org_id: Option<&str>) -> ComplyResult<()> {
        if name.trim().is_empty() {
            return Err(ComplyError::Config("flag name must not be empty".to_string()));
        }
        let key = match org_id {
            Some(org) => Self::org_key(name, org),
            None => Self::global_key(name),
        };
        self.store
            .set(&key, if value { "true" } else { "false" }, None)
            .await?;
        info!(flag = name, value = value, org_id = ?org_id, "Flag override set");
        Ok(())
    }

    /// Remove an override, letting resolution fall through to the next
    /// precedence tier.
    pub async fn clear_flag(&self, name: &str, org_id: Option<&str>) -> ComplyResult<()> {
        let key = match org_id {
            Some(org) => Self::org_key(name, org),
            None => Self::global_key(name),
        };
        self.store.del(&key).await?;
        Ok(())
    }
}
