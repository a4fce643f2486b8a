//! Exposes the key-exchange handshake as an ordinary local [`Service`]
//! (spec `SPEC_FULL.md` §4.1-4.12 supplement: "the handshake reuses C11's
//! middleware chain rather than being a special cased bypass" — it is
//! dispatched through the same `POST /<service>/<fn>` path as any other
//! fn, under the built-in service name `signatures`).

use async_trait::async_trait;
use fns_core::{names, CallContext, CodeError, Document, FnDescriptor, Service};

use crate::exchange::KeyExchange;

pub const SERVICE_NAME: &str = "signatures";

pub struct SignaturesService {
    key_exchange: KeyExchange,
}

impl SignaturesService {
    pub fn new(key_exchange: KeyExchange) -> Self {
        Self { key_exchange }
    }

    fn device_id(ctx: &CallContext) -> Result<String, CodeError> {
        ctx.request()
            .and_then(|r| r.header().get(names::DEVICE_ID))
            .map(str::to_string)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| CodeError::warning("missing X-Fns-Device-Id"))
    }
}

#[async_trait]
impl Service for SignaturesService {
    fn name(&self) -> &str {
        SERVICE_NAME
    }

    fn document(&self) -> Document {
        Document {
            name: SERVICE_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            internal: false,
            functions: vec![
                FnDescriptor {
                    name: "exchange_key".to_string(),
                    readonly: false,
                    internal: false,
                    cache_ttl_seconds: None,
                },
                FnDescriptor {
                    name: "confirm_exchange_key".to_string(),
                    readonly: false,
                    internal: false,
                    cache_ttl_seconds: None,
                },
            ],
        }
    }

    async fn handle(
        &self,
        ctx: &CallContext,
        fn_name: &str,
        argument: serde_json::Value,
    ) -> Result<serde_json::Value, CodeError> {
        let device_id = Self::device_id(ctx)?;
        match fn_name {
            "exchange_key" => {
                let request = serde_json::from_value(argument)
                    .map_err(|e| CodeError::warning("malformed exchangeKey request").with_cause(e))?;
                let response = self.key_exchange.exchange_key(&device_id, request).await?;
                serde_json::to_value(response)
                    .map_err(|e| CodeError::warning("failed to encode response").with_cause(e))
            }
            "confirm_exchange_key" => {
                let request = serde_json::from_value(argument).map_err(|e| {
                    CodeError::warning("malformed confirmExchangeKey request").with_cause(e)
                })?;
                let response = self
                    .key_exchange
                    .confirm_exchange_key(&device_id, request)
                    .await?;
                serde_json::to_value(response)
                    .map_err(|e| CodeError::warning("failed to encode response").with_cause(e))
            }
            other => Err(CodeError::not_found("unknown signatures fn").with_meta("fn", other)),
        }
    }
}
