//! Cache-control (spec §4.5, C5): the fn-side flag, the middleware-side
//! ETag bookkeeping, and the caller-side revalidation dance, grounded on
//! `spark-core::pipeline::ExtensionsMap` for the per-request flag and the
//! shared `Store` for persistence.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use fns_core::{CallContext, CodeError, Store};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Mutable per-request flag a `Service` implementation can set via
/// [`enable_cache_control`]; the middleware decides whether to actually
/// honor it.
#[derive(Default)]
pub struct CacheFlag(Mutex<CacheFlagState>);

#[derive(Default, Clone, Copy)]
struct CacheFlagState {
    enabled: bool,
    ttl: Option<Duration>,
}

impl CacheFlag {
    pub fn mark_enabled(&self, ttl: Duration) {
        let mut state = self.0.lock();
        state.enabled = true;
        state.ttl = Some(ttl);
    }

    pub fn snapshot(&self) -> Option<Duration> {
        let state = self.0.lock();
        state.enabled.then_some(state.ttl.unwrap_or_default())
    }
}

/// Called by `Service::handle` implementations to request that the
/// response be cached (spec §4.5: "a service fn may always request
/// caching; whether caching is actually applied is decided by the
/// middleware").
pub fn enable_cache_control(ctx: &CallContext, ttl: Duration) {
    let flag = ctx.extensions().get_or_insert_with(CacheFlag::default);
    flag.mark_enabled(ttl);
}

pub fn cache_control_requested(ctx: &CallContext) -> Option<Duration> {
    ctx.extensions().get::<CacheFlag>().and_then(|f| f.snapshot())
}

/// `{ttlDuration, status, deadline, body}` persisted at
/// `fns/etags/<etag>` (spec §3).
#[derive(Clone, Serialize, Deserialize)]
pub struct CacheRecord {
    pub ttl_millis: u64,
    pub status: u16,
    pub deadline_millis: u128,
    /// Base64-standard encoded response body, so the record stays valid
    /// JSON regardless of payload content.
    pub body_b64: String,
}

impl CacheRecord {
    pub fn new(status: u16, body: &[u8], ttl: Duration, now_millis: u128) -> Self {
        Self {
            ttl_millis: ttl.as_millis() as u64,
            status,
            deadline_millis: now_millis + ttl.as_millis(),
            body_b64: base64::engine::general_purpose::STANDARD.encode(body),
        }
    }

    pub fn body(&self) -> Result<Vec<u8>, CodeError> {
        base64::engine::general_purpose::STANDARD
            .decode(&self.body_b64)
            .map_err(|e| CodeError::warning("corrupt cache record").with_cause(e))
    }

    pub fn is_fresh(&self, now_millis: u128) -> bool {
        now_millis < self.deadline_millis
    }
}

fn etag_key(etag: &str) -> String {
    format!("fns/etags/{etag}")
}

/// `xxhash64(deviceId || path || body)` rendered as decimal (spec
/// §GLOSSARY).
pub fn compute_etag(device_id: &str, path: &str, body: &[u8]) -> String {
    let mut buf = Vec::with_capacity(device_id.len() + path.len() + body.len());
    buf.extend_from_slice(device_id.as_bytes());
    buf.extend_from_slice(path.as_bytes());
    buf.extend_from_slice(body);
    xxhash_rust::xxh64::xxh64(&buf, 0).to_string()
}

/// Server-side ETag store bookkeeping, shared by the transport middleware
/// and by tests exercising the cache-hit scenario directly.
#[derive(Clone)]
pub struct CacheStore {
    store: Arc<dyn Store>,
}

impl CacheStore {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn lookup(&self, etag: &str) -> Result<Option<CacheRecord>, CodeError> {
        match self.store.get(&etag_key(etag)).await? {
            Some(bytes) => Ok(serde_json::from_slice(&bytes).ok()),
            None => Ok(None),
        }
    }

    pub async fn save(&self, etag: &str, record: &CacheRecord) -> Result<(), CodeError> {
        let bytes = serde_json::to_vec(record)
            .map_err(|e| CodeError::warning("failed to encode cache record").with_cause(e))?;
        self.store
            .set_with_ttl(&etag_key(etag), bytes, Duration::from_millis(record.ttl_millis))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fns_core::LocalStore;

    #[tokio::test]
    async fn second_identical_call_within_ttl_serves_from_store() {
        let cache = CacheStore::new(Arc::new(LocalStore::new()));
        let etag = compute_etag("dev-1", "/svc/get", br#"{"k":1}"#);
        let now = fns_core::tracer::unix_millis_now();
        let record = CacheRecord::new(200, br#"{"k":1,"v":"cached"}"#, Duration::from_secs(5), now);
        cache.save(&etag, &record).await.unwrap();

        let fetched = cache.lookup(&etag).await.unwrap().unwrap();
        assert!(fetched.is_fresh(fns_core::tracer::unix_millis_now()));
        assert_eq!(fetched.body().unwrap(), br#"{"k":1,"v":"cached"}"#);
    }

    #[test]
    fn ctx_side_flag_round_trips() {
        let ctx = CallContext::root();
        assert!(cache_control_requested(&ctx).is_none());
        enable_cache_control(&ctx, Duration::from_secs(5));
        assert_eq!(cache_control_requested(&ctx), Some(Duration::from_secs(5)));
    }
}
