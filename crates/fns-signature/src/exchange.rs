//! EC key-exchange handshake (spec §4.6), responder role: secp256k1 ECDH +
//! HKDF-SHA256 session key derivation. secp256k1 stands in for the spec's
//! "SM2-style" curve — no SM2 crate appears anywhere in the retrieval pack,
//! and fabricating one would violate the no-fabricated-dependencies rule;
//! `secp256k1` (with its `ecdh` support) is the elliptic-curve crate the
//! wider pack actually converges on (`paritytech-polkadot-sdk`,
//! `allnil-reth`, `WallexDefiTrade-reth`).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::Engine;
use fns_core::CodeError;
use hkdf::Hkdf;
use parking_lot::RwLock;
use secp256k1::ecdh::SharedSecret;
use secp256k1::{PublicKey, Secp256k1, SecretKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::session::{SessionStore, SignatureSession};

const MIN_KEY_LENGTH: usize = 20;
const MAX_KEY_LENGTH: usize = 64;

#[derive(Deserialize)]
pub struct ExchangeKeyRequest {
    /// Compressed-point, base64-standard public key of the initiator.
    pub public_key: String,
    pub key_length: usize,
}

#[derive(Serialize)]
pub struct ExchangeKeyResponse {
    pub id: String,
    pub public_key: String,
    pub expire_at_millis: u128,
    pub responder_exchange_key_hash: String,
}

#[derive(Deserialize)]
pub struct ConfirmExchangeKeyRequest {
    pub initiator_exchange_key_hash: String,
}

#[derive(Serialize)]
pub struct ConfirmExchangeKeyResponse {
    pub ok: bool,
}

/// Validates that a device id is allowed to present a given public key.
/// Certificate issuance itself is out of scope for this spec (no operation
/// describes it); the default permissive registry lets any device proceed,
/// matching the narrow scope spec §4.6 actually names.
pub trait CertificateRegistry: Send + Sync {
    fn public_key_matches(&self, device_id: &str, public_key_b64: &str) -> bool;
}

#[derive(Default)]
pub struct AllowAllRegistry;

impl CertificateRegistry for AllowAllRegistry {
    fn public_key_matches(&self, _device_id: &str, _public_key_b64: &str) -> bool {
        true
    }
}

/// An in-memory registry for tests and simple deployments, keyed by
/// device id.
#[derive(Default)]
pub struct StaticCertificateRegistry {
    keys: RwLock<HashMap<String, String>>,
}

impl StaticCertificateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, device_id: impl Into<String>, public_key_b64: impl Into<String>) {
        self.keys.write().insert(device_id.into(), public_key_b64.into());
    }
}

impl CertificateRegistry for StaticCertificateRegistry {
    fn public_key_matches(&self, device_id: &str, public_key_b64: &str) -> bool {
        self.keys
            .read()
            .get(device_id)
            .is_some_and(|k| k == public_key_b64)
    }
}

fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
}

fn sha256_b64(data: &[u8]) -> String {
    let digest = Sha256::digest(data);
    base64::engine::general_purpose::STANDARD.encode(digest)
}

/// Server-side (responder) key-exchange handshake, spec §4.6.
pub struct KeyExchange {
    sessions: SessionStore,
    registry: Arc<dyn CertificateRegistry>,
    confirmation_required: bool,
    session_ttl: Duration,
}

impl KeyExchange {
    pub fn new(sessions: SessionStore, registry: Arc<dyn CertificateRegistry>) -> Self {
        Self {
            sessions,
            registry,
            confirmation_required: true,
            session_ttl: SessionStore::default_ttl(),
        }
    }

    pub fn with_confirmation_required(mut self, required: bool) -> Self {
        self.confirmation_required = required;
        self
    }

    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    pub async fn exchange_key(
        &self,
        device_id: &str,
        req: ExchangeKeyRequest,
    ) -> Result<ExchangeKeyResponse, CodeError> {
        if !(MIN_KEY_LENGTH..=MAX_KEY_LENGTH).contains(&req.key_length) {
            return Err(CodeError::warning("keyLength must be between 20 and 64 bytes"));
        }
        if !self.registry.public_key_matches(device_id, &req.public_key) {
            return Err(CodeError::unauthorized("device public key is not certified"));
        }

        let initiator_point_bytes = base64::engine::general_purpose::STANDARD
            .decode(&req.public_key)
            .map_err(|e| CodeError::warning("malformed publicKey").with_cause(e))?;
        let initiator_public = PublicKey::from_slice(&initiator_point_bytes)
            .map_err(|_| CodeError::warning("malformed publicKey"))?;

        let secp = Secp256k1::new();
        let responder_secret = SecretKey::new(&mut rand::thread_rng());
        let responder_public = PublicKey::from_secret_key(&secp, &responder_secret);
        let responder_point_bytes = responder_public.serialize().to_vec();
        let responder_public_b64 =
            base64::engine::general_purpose::STANDARD.encode(&responder_point_bytes);

        let shared = SharedSecret::new(&initiator_public, &responder_secret);
        let hkdf = Hkdf::<Sha256>::new(None, shared.as_ref());
        let mut okm = vec![0u8; req.key_length];
        hkdf.expand(b"fns-signature-session", &mut okm)
            .map_err(|_| CodeError::warning("key derivation failed"))?;

        let initiator_hash = sha256_b64(&initiator_point_bytes);
        let responder_hash = sha256_b64(&responder_point_bytes);

        let expire_at_millis = now_millis() + self.session_ttl.as_millis();
        let session = SignatureSession {
            agreed: !self.confirmation_required,
            key: base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(&okm),
            expire_at_millis,
            initiator_exchange_key_hash: initiator_hash,
        };
        self.sessions
            .save(device_id, &session, self.session_ttl)
            .await?;

        Ok(ExchangeKeyResponse {
            id: device_id.to_string(),
            public_key: responder_public_b64,
            expire_at_millis,
            responder_exchange_key_hash: responder_hash,
        })
    }

    pub async fn confirm_exchange_key(
        &self,
        device_id: &str,
        req: ConfirmExchangeKeyRequest,
    ) -> Result<ConfirmExchangeKeyResponse, CodeError> {
        let Some(mut session) = self.sessions.load(device_id).await? else {
            return Ok(ConfirmExchangeKeyResponse { ok: false });
        };
        if session.initiator_exchange_key_hash != req.initiator_exchange_key_hash {
            return Ok(ConfirmExchangeKeyResponse { ok: false });
        }

        session.agreed = true;
        let now = now_millis();
        let remaining_millis = session.expire_at_millis.saturating_sub(now);
        let remaining = Duration::from_millis(remaining_millis.min(u64::MAX as u128) as u64);
        self.sessions.save(device_id, &session, remaining).await?;
        Ok(ConfirmExchangeKeyResponse { ok: true })
    }
}
