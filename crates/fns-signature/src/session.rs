//! Per-device signature session lifecycle (spec §3, §4.6), persisted
//! through `fns-core`'s shared [`Store`] at `fns/signatures/sessions/<deviceId>`.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use fns_core::{CodeError, Store};
use serde::{Deserialize, Serialize};

const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(24 * 60 * 60);

fn session_key(device_id: &str) -> String {
    format!("fns/signatures/sessions/{device_id}")
}

/// `{agreed, key, expireAT, initiatorExchangeKeyHash}`, spec §3.
#[derive(Clone, Serialize, Deserialize)]
pub struct SignatureSession {
    pub agreed: bool,
    /// Base64url-encoded session key, per spec §4.6 ("session key bytes are
    /// base64-urlencoded prior to storage").
    pub key: String,
    pub expire_at_millis: u128,
    pub initiator_exchange_key_hash: String,
}

impl SignatureSession {
    pub fn key_bytes(&self) -> Result<Vec<u8>, CodeError> {
        base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(&self.key)
            .map_err(|e| CodeError::warning("malformed session key").with_cause(e))
    }

    pub fn is_expired(&self, now_millis: u128) -> bool {
        now_millis >= self.expire_at_millis
    }
}

/// Thin persistence wrapper around the shared [`Store`] scoped to
/// signature sessions.
#[derive(Clone)]
pub struct SessionStore {
    store: Arc<dyn Store>,
}

impl SessionStore {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn load(&self, device_id: &str) -> Result<Option<SignatureSession>, CodeError> {
        let raw = self.store.get(&session_key(device_id)).await?;
        match raw {
            Some(bytes) => {
                let session: SignatureSession = serde_json::from_slice(&bytes)
                    .map_err(|e| CodeError::warning("corrupt session record").with_cause(e))?;
                Ok(Some(session))
            }
            None => Ok(None),
        }
    }

    pub async fn save(
        &self,
        device_id: &str,
        session: &SignatureSession,
        ttl: Duration,
    ) -> Result<(), CodeError> {
        let bytes = serde_json::to_vec(session)
            .map_err(|e| CodeError::warning("failed to encode session").with_cause(e))?;
        self.store
            .set_with_ttl(&session_key(device_id), bytes, ttl)
            .await
    }

    pub fn default_ttl() -> Duration {
        DEFAULT_SESSION_TTL
    }
}
