//! Local fn task runner (spec §4.7, C7): wraps an application [`Service`]
//! with span tracing, cache-control short-circuiting and barrier
//! deduplication, so it can be dispatched through the same [`Endpoint`]
//! surface as a remote [`fns_cluster::Registration`].

use std::sync::Arc;

use async_trait::async_trait;
use fns_core::{
    names, Barrier, CallContext, CodeError, Document, Endpoint, Request, Service, Span,
    TraceReporter,
};

use crate::cache_control::{cache_control_requested, compute_etag, CacheRecord, CacheStore};
use crate::settings::RuntimeSettings;
use crate::stats::Stats;

fn barrier_key(request_hash: u64, device_id: &str) -> u64 {
    let mut buf = request_hash.to_le_bytes().to_vec();
    buf.extend_from_slice(device_id.as_bytes());
    xxhash_rust::xxh64::xxh64(&buf, 0)
}

fn request_path(service: &str, fn_name: &str) -> String {
    format!("/{service}/{fn_name}")
}

pub struct LocalEndpoint {
    service: Arc<dyn Service>,
    barrier: Barrier,
    cache: Option<CacheStore>,
    reporter: Arc<dyn TraceReporter>,
    stats: Arc<Stats>,
    settings: RuntimeSettings,
}

impl LocalEndpoint {
    pub fn new(
        service: Arc<dyn Service>,
        barrier: Barrier,
        cache: Option<CacheStore>,
        reporter: Arc<dyn TraceReporter>,
        stats: Arc<Stats>,
        settings: RuntimeSettings,
    ) -> Self {
        Self {
            service,
            barrier,
            cache,
            reporter,
            stats,
            settings,
        }
    }
}

#[async_trait]
impl Endpoint for LocalEndpoint {
    fn name(&self) -> &str {
        self.service.name()
    }

    fn key(&self) -> &str {
        self.service.name()
    }

    fn internal(&self) -> bool {
        self.service.document().internal
    }

    fn document(&self) -> Document {
        self.service.document()
    }

    async fn request(
        &self,
        ctx: &CallContext,
        req: &Request,
    ) -> Result<serde_json::Value, CodeError> {
        let span = ctx
            .extensions()
            .get_or_insert_with(|| Span::root(format!("{}.{}", req.service(), req.fn_name())));
        let local_span = span.child("fn.local");
        local_span.tag("kind", "local");

        let device_id = req.header().get(names::DEVICE_ID).unwrap_or_default().to_string();
        let path = request_path(req.service(), req.fn_name());

        let disable_cache = req
            .header()
            .get(names::CACHE_CONTROL)
            .is_some_and(|v| v.contains("no-store"));

        if req.internal() && !disable_cache {
            if let Some(cache) = &self.cache {
                let argument_bytes = serde_json::to_vec(req.argument()).unwrap_or_default();
                let etag = compute_etag(&device_id, &path, &argument_bytes);
                if let Ok(Some(record)) = cache.lookup(&etag).await {
                    if record.is_fresh(fns_core::tracer::unix_millis_now()) {
                        self.stats.record_cache_hit();
                        local_span.tag("cached", "hit");
                        fns_core::tracer::report_async(self.reporter.clone(), local_span);
                        let body = record.body()?;
                        return serde_json::from_slice(&body)
                            .map_err(|e| CodeError::warning("corrupt cache body").with_cause(e));
                    }
                }
            }
        }

        let key = barrier_key(req.hash(), &device_id);
        let service = self.service.clone();
        let ctx_for_call = ctx.clone();
        let fn_name = req.fn_name().to_string();
        let argument = req.argument().clone();
        let service_name = req.service().to_string();

        let call = self.barrier.do_call(key, move || async move {
            service.handle(&ctx_for_call, &fn_name, argument).await
        });

        let timed = tokio::time::timeout(self.settings.handle_timeout(), call).await;

        let result = match timed {
            Ok((result, _shared)) => result.map_err(|e| e.with_call_site(&service_name, req.fn_name())),
            Err(_) => Err(CodeError::timeout("handle timeout exceeded")
                .with_call_site(&service_name, req.fn_name())),
        };

        match &result {
            Ok(_) => {
                self.stats.record_handled();
                local_span.tag("status", "OK");
                local_span.tag("handled", "succeed");
            }
            Err(err) => {
                self.stats.record_failed();
                local_span.tag("status", err.kind().name());
                local_span.tag("handled", "failed");
            }
        }

        if let (Some(cache), Some(ttl)) = (&self.cache, cache_control_requested(ctx)) {
            if let Ok(value) = &result {
                if let Ok(body) = serde_json::to_vec(value) {
                    let argument_bytes = serde_json::to_vec(req.argument()).unwrap_or_default();
                    let etag = compute_etag(&device_id, &path, &argument_bytes);
                    let record =
                        CacheRecord::new(200, &body, ttl, fns_core::tracer::unix_millis_now());
                    let _ = cache.save(&etag, &record).await;
                }
            }
        }

        if !req.internal() {
            fns_core::tracer::report_async(self.reporter.clone(), local_span);
        } else {
            local_span.finish();
        }

        result
    }
}

