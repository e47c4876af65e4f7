//! Ephemeral SSO flow state. One record per login attempt, consumed
//! exactly once on the provider callback.

use comply_core::ComplyResult;
use comply_store::FastStore;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Flow state lives for ten minutes; a login attempt older than that has
/// been abandoned.
const FLOW_TTL_SECS: u64 = 600;

/// State and nonce handed to the authorization URL for one login attempt.
#[derive(Debug, Clone)]
pub struct LoginFlow {
    pub state: String,
    pub nonce: String,
}

/// Stores per-attempt nonces keyed by state in the shared fast store.
pub struct FlowStore {
    store: Arc<dyn FastStore>,
}

impl FlowStore {
    pub fn new(store: Arc<dyn FastStore>) -> Self {
        Self { store }
    }

    fn key(state: &str) -> String {
        format!("sso:state:{state}")
    }

    /// Start a login attempt: mint a fresh state/nonce pair and record the
    /// nonce under the state key.
    pub async fn begin(&self) -> ComplyResult<LoginFlow> {
        let flow = LoginFlow {
            state: Uuid::new_v4().simple().to_string(),
            nonce: Uuid::new_v4().simple().to_string(),
        };
        self.store
            .set(&Self::key(&flow.state), &flow.nonce, Some(FLOW_TTL_SECS))
            .await?;
        debug!(state = %flow.state, "Login flow started");
        Ok(flow)
    }

    /// Consume the nonce recorded for `state`. Returns `None` when the
    /// state is unknown, expired, or already consumed; a given nonce can
    /// be taken at most once.
    pub async fn take(&self, state: &str) -> ComplyResult<Option<String>> {
        let key = Self::key(state);
        let nonce = self.store.get(&key).await?;
        if nonce.is_some() {
            self.store.del(&key).await?;
        }
        Ok(nonce)
    }
}
