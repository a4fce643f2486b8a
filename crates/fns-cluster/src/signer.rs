//! Inter-node request signing for `X-Fns-Request-Internal-Signature`
//! (spec §3 `Registration.signer`, §4.8), reusing the HMAC primitive
//! `fns-signature` already implements for client sessions.

use fns_signature::hmac_sign;

/// Produces the internal-signature header value for an outgoing
/// node-to-node call.
pub trait ClusterSigner: Send + Sync {
    fn sign(&self, path: &str, body: &[u8]) -> String;
}

/// HMAC-SHA256 over a cluster-wide pre-shared secret. Every node must be
/// configured with the same secret for peers to accept each other's
/// internal calls.
pub struct SharedSecretSigner {
    secret: Vec<u8>,
}

impl SharedSecretSigner {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }
}

impl ClusterSigner for SharedSecretSigner {
    fn sign(&self, path: &str, body: &[u8]) -> String {
        hmac_sign::sign(&self.secret, path, body)
    }
}
