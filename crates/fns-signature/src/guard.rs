//! The signature middleware's decision logic (spec §4.6), transport-agnostic
//! so `fns-transport` only has to plumb headers in and out.

use fns_core::CodeError;

use crate::hmac_sign;
use crate::session::SessionStore;

pub struct SignatureGuard {
    sessions: SessionStore,
}

/// Inbound request facts the guard needs; `fns-transport` builds this from
/// the actual HTTP headers.
pub struct InboundSignature<'a> {
    pub device_id: &'a str,
    pub path: &'a str,
    pub body: &'a [u8],
    pub internal_signature_present: bool,
    pub signature: Option<&'a str>,
}

impl SignatureGuard {
    pub fn new(sessions: SessionStore) -> Self {
        Self { sessions }
    }

    /// Verify an inbound request per spec §4.6's bypass/verify chain.
    /// Returns the session key bytes on success so the caller can sign the
    /// response with the same key.
    pub async fn verify(&self, inbound: InboundSignature<'_>) -> Result<Option<Vec<u8>>, CodeError> {
        if inbound.internal_signature_present {
            return Ok(None);
        }

        let Some(signature) = inbound.signature else {
            return Err(CodeError::unauthorized("missing signature")
                .with_meta("code", "signature-lost"));
        };

        let session = self
            .sessions
            .load(inbound.device_id)
            .await?
            .ok_or_else(|| {
                CodeError::unauthorized("session expired").with_meta("code", "session-expired")
            })?;

        if session.is_expired(fns_core::tracer::unix_millis_now()) {
            return Err(
                CodeError::unauthorized("session expired").with_meta("code", "session-expired")
            );
        }
        if !session.agreed {
            return Err(CodeError::forbidden("session not agreed")
                .with_meta("code", "session-not-agreed"));
        }

        let key = session.key_bytes()?;
        if !hmac_sign::verify(&key, inbound.path, inbound.body, signature) {
            return Err(CodeError::unauthorized("signature mismatch")
                .with_meta("code", "signature-unverified"));
        }

        Ok(Some(key))
    }

    /// Sign an outbound response with the session key recovered by
    /// [`Self::verify`].
    pub fn sign_response(key: &[u8], path: &str, body: &[u8]) -> String {
        hmac_sign::sign(key, path, body)
    }
}
