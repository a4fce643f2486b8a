//! Wire shapes for inter-node calls (spec §6: "Internal request/response
//! envelope"). Shared between the outbound client side
//! ([`crate::registration_task::RemoteEndpoint`]) and the inbound server
//! side (`fns-transport`'s dispatch handler for internal requests), so both
//! ends agree on exactly one encoding.

use fns_core::{Attributes, SpanExport};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Serialize, Deserialize, Clone, Default)]
pub struct UserSnapshot {
    pub id: String,
    pub attributes: Attributes,
}

/// `{user, trunk, argument}`, spec §6.
#[derive(Serialize, Deserialize)]
pub struct RequestEnvelope {
    pub user: UserSnapshot,
    pub trunk: BTreeMap<String, Vec<u8>>,
    pub argument: serde_json::Value,
}

/// `{user, trunk, span, succeed, body}`, spec §6. `body` is the result JSON
/// on success, an encoded `CodeErrorBody` on failure.
#[derive(Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub user: UserSnapshot,
    pub trunk: BTreeMap<String, Vec<u8>>,
    pub span: Option<SpanExport>,
    pub succeed: bool,
    pub body: serde_json::Value,
}
