//! The `Endpoint` trait (spec §4.2), grounded on `spark-core::service`'s
//! trait-object service contract. Local services and remote registrations
//! both implement this so the dispatcher never needs to know which one it
//! is holding.

use async_trait::async_trait;

use crate::context::CallContext;
use crate::error::CodeError;
use crate::node::Document;
use crate::request::Request;

/// A callable destination for a `(service, fn)` pair: either a locally
/// hosted [`crate::service::Service`] or a handle onto a remote node's
/// registration.
#[async_trait]
pub trait Endpoint: Send + Sync {
    fn name(&self) -> &str;

    /// Stable identity used for barrier/cache keys and logging; for a
    /// local service this is `name`, for a remote registration it
    /// includes the node id (spec §4.10).
    fn key(&self) -> &str;

    fn internal(&self) -> bool;

    fn document(&self) -> Document;

    async fn request(
        &self,
        ctx: &CallContext,
        req: &Request,
    ) -> Result<serde_json::Value, CodeError>;
}
