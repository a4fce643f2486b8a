//! Remote fn call execution (spec §4.8, C8): builds and signs the outbound
//! envelope, POSTs to the peer, and folds the peer's response (user/trunk/
//! span) back onto the caller's request.

use std::sync::Arc;

use async_trait::async_trait;
use fns_cluster::Registration;
use fns_core::{names, CallContext, CodeError, Document, Endpoint, Request};

use crate::cache_control::{cache_control_requested, compute_etag, CacheRecord, CacheStore};
use crate::envelope::{RequestEnvelope, UserSnapshot};
use crate::stats::Stats;

pub struct RemoteEndpoint {
    registration: Arc<Registration>,
    cache: Option<CacheStore>,
    stats: Arc<Stats>,
}

impl RemoteEndpoint {
    pub fn new(registration: Arc<Registration>, cache: Option<CacheStore>, stats: Arc<Stats>) -> Self {
        Self {
            registration,
            cache,
            stats,
        }
    }
}

#[async_trait]
impl Endpoint for RemoteEndpoint {
    fn name(&self) -> &str {
        &self.registration.name
    }

    fn key(&self) -> &str {
        &self.registration.id
    }

    fn internal(&self) -> bool {
        self.registration.document().internal
    }

    fn document(&self) -> Document {
        self.registration.document()
    }

    async fn request(
        &self,
        ctx: &CallContext,
        req: &Request,
    ) -> Result<serde_json::Value, CodeError> {
        if self.registration.is_closed() {
            return Err(CodeError::unavailable("registration closed")
                .with_call_site(&self.registration.name, req.fn_name()));
        }

        let device_id = req.header().get(names::DEVICE_ID).unwrap_or_default().to_string();
        let path = format!("/{}/{}", req.service(), req.fn_name());
        let argument_bytes = serde_json::to_vec(req.argument()).unwrap_or_default();
        let etag = compute_etag(&device_id, &path, &argument_bytes);

        let mut revalidating = false;
        if !matches!(req.header().get(names::CACHE_CONTROL), Some(v) if v.contains("no-store")) {
            if let Some(cache) = &self.cache {
                if let Ok(Some(record)) = cache.lookup(&etag).await {
                    if record.is_fresh(fns_core::tracer::unix_millis_now()) {
                        self.stats.record_cache_hit();
                        let body = record.body()?;
                        return serde_json::from_slice(&body)
                            .map_err(|e| CodeError::warning("corrupt cache body").with_cause(e));
                    }
                    revalidating = true;
                }
            }
        }

        let envelope = RequestEnvelope {
            user: UserSnapshot {
                id: req.user().id(),
                attributes: req.user().attributes(),
            },
            trunk: req.trunk().snapshot(),
            argument: req.argument().clone(),
        };
        let envelope_bytes = serde_json::to_vec(&envelope)
            .map_err(|e| CodeError::warning("failed to encode envelope").with_cause(e))?;
        let signature = self.registration.signer.sign(&path, &envelope_bytes);

        let mut builder = self
            .registration
            .client
            .post(self.registration.endpoint_url(req.service(), req.fn_name()))
            .timeout(
                ctx.deadline()
                    .remaining(tokio::time::Instant::now())
                    .unwrap_or(self.registration.timeout),
            )
            .header(names::REQUEST_INTERNAL_SIGNATURE, signature)
            .header(names::REQUEST_ID, req.id())
            .body(envelope_bytes);

        for (name, values) in req.header().iter() {
            for value in values {
                builder = builder.header(name, value.as_str());
            }
        }
        if revalidating {
            builder = builder
                .header(names::IF_NONE_MATCH, etag.as_str())
                .header(names::CACHE_CONTROL, "public, max-age=0");
        }

        let response = builder.send().await.map_err(|e| {
            self.registration.record_error();
            CodeError::unavailable("transport failure").with_cause(e)
        })?;

        if response
            .headers()
            .get(reqwest::header::CONNECTION)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.eq_ignore_ascii_case("close"))
        {
            self.registration.mark_closed();
            return Err(CodeError::unavailable("peer signaled connection close"));
        }

        match response.status().as_u16() {
            304 => {
                let cache = self.cache.as_ref().ok_or_else(|| {
                    CodeError::unavailable("304 received without a cache entry")
                })?;
                let record = cache
                    .lookup(&etag)
                    .await?
                    .ok_or_else(|| CodeError::unavailable("stale cache entry for 304 response"))?;
                let body = record.body()?;
                serde_json::from_slice(&body)
                    .map_err(|e| CodeError::warning("corrupt cache body").with_cause(e))
            }
            404 => {
                self.registration.record_error();
                Err(CodeError::not_found("remote fn not found").with_meta("path", &path))
            }
            status if !(200..300).contains(&status) => {
                self.registration.record_error();
                Err(CodeError::unavailable("peer returned non-2xx")
                    .with_meta("status", status.to_string()))
            }
            _ => {
                let bytes = response
                    .bytes()
                    .await
                    .map_err(|e| CodeError::warning("failed to read response body").with_cause(e))?;
                let decoded: crate::envelope::ResponseEnvelope = serde_json::from_slice(&bytes).map_err(|e| {
                    self.registration.record_error();
                    CodeError::warning("failed to decode envelope").with_cause(e)
                })?;

                if !decoded.succeed {
                    return Err(serde_json::from_value::<fns_core::CodeErrorBody>(decoded.body)
                        .map(|body| {
                            CodeError::warning(body.message).with_meta("code", body.code)
                        })
                        .unwrap_or_else(|_| CodeError::warning("remote fn failed")));
                }

                // spec §4.8: adopt the peer's id only if we didn't have one,
                // but always take its attributes once authenticated.
                if req.user().id().is_empty() {
                    req.user().set_id(decoded.user.id.clone());
                }
                if req.user().authenticated() {
                    req.user().set_attributes(decoded.user.attributes);
                }
                req.trunk().merge(&decoded.trunk);

                if let Some(remote_span) = decoded.span {
                    ctx.extensions()
                        .get_or_insert_with(|| {
                            fns_core::Span::root(format!("{}.{}", req.service(), req.fn_name()))
                        })
                        .adopt(remote_span);
                }

                if let (Some(cache), Some(ttl)) = (&self.cache, cache_control_requested(ctx)) {
                    if let Ok(body) = serde_json::to_vec(&decoded.body) {
                        let record =
                            CacheRecord::new(200, &body, ttl, fns_core::tracer::unix_millis_now());
                        let _ = cache.save(&etag, &record).await;
                    }
                }

                self.stats.record_handled();
                Ok(decoded.body)
            }
        }
    }
}
