//! The business `Service` trait application code implements (spec §4.2),
//! grounded on `spark-core::host::service::Service`.

use async_trait::async_trait;

use crate::context::CallContext;
use crate::error::CodeError;
use crate::node::Document;

/// Implemented by application code to expose one or more named functions
/// under a single service name. The runtime wraps every `Service` in a
/// local [`crate::endpoint::Endpoint`] that adds caching, barrier
/// deduplication and tracing around `handle`.
#[async_trait]
pub trait Service: Send + Sync {
    fn name(&self) -> &str;

    fn document(&self) -> Document;

    async fn handle(
        &self,
        ctx: &CallContext,
        fn_name: &str,
        argument: serde_json::Value,
    ) -> Result<serde_json::Value, CodeError>;
}
