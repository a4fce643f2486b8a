use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::extract::ConnectInfo;
use axum::http::{Request, StatusCode};
use fns_cluster::Registrations;
use fns_core::{
    names, Barrier, CallContext, CodeError, Document, FnDescriptor, LocalStore, NoopReporter,
    Service,
};
use fns_runtime::cache_control::{enable_cache_control, CacheStore};
use fns_runtime::{Dispatcher, RuntimeSettings, Stats};
use fns_runtime::fn_task::LocalEndpoint;
use fns_signature::{AllowAllRegistry, KeyExchange, SessionStore, SignatureGuard};
use fns_transport::lifecycle::{Lifecycle, LifecycleState};
use fns_transport::limiter::{Limiter, LimiterSettings};
use fns_transport::state::AppState;
use tower::ServiceExt;

struct EchoService;

#[async_trait]
impl Service for EchoService {
    fn name(&self) -> &str {
        "echo"
    }

    fn document(&self) -> Document {
        Document {
            name: "echo".to_string(),
            version: "1.0.0".to_string(),
            internal: false,
            functions: vec![
                FnDescriptor { name: "ping".to_string(), readonly: true, internal: false, cache_ttl_seconds: None },
                FnDescriptor { name: "cached".to_string(), readonly: true, internal: false, cache_ttl_seconds: Some(5) },
            ],
        }
    }

    async fn handle(
        &self,
        ctx: &CallContext,
        fn_name: &str,
        argument: serde_json::Value,
    ) -> Result<serde_json::Value, CodeError> {
        match fn_name {
            "ping" => Ok(argument),
            "cached" => {
                enable_cache_control(ctx, Duration::from_secs(5));
                Ok(serde_json::json!({"ok": true}))
            }
            other => Err(CodeError::not_found("unknown fn").with_meta("fn", other)),
        }
    }
}

/// A `cached` fn that counts invocations, so a test can prove a second
/// call was served from cache rather than re-invoking the handler.
struct CountingCacheService {
    calls: Arc<std::sync::atomic::AtomicUsize>,
}

#[async_trait]
impl Service for CountingCacheService {
    fn name(&self) -> &str {
        "echo"
    }

    fn document(&self) -> Document {
        Document {
            name: "echo".to_string(),
            version: "1.0.0".to_string(),
            internal: false,
            functions: vec![FnDescriptor {
                name: "cached".to_string(),
                readonly: true,
                internal: false,
                cache_ttl_seconds: Some(5),
            }],
        }
    }

    async fn handle(
        &self,
        ctx: &CallContext,
        fn_name: &str,
        _argument: serde_json::Value,
    ) -> Result<serde_json::Value, CodeError> {
        match fn_name {
            "cached" => {
                let calls = self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
                enable_cache_control(ctx, Duration::from_secs(5));
                Ok(serde_json::json!({"calls": calls}))
            }
            other => Err(CodeError::not_found("unknown fn").with_meta("fn", other)),
        }
    }
}

fn test_state_with_counting_cache(
    limiter_capacity: u32,
    calls: Arc<std::sync::atomic::AtomicUsize>,
) -> AppState {
    let store: Arc<dyn fns_core::Store> = Arc::new(LocalStore::new());
    let cache = Some(CacheStore::new(store.clone()));
    let stats = Arc::new(Stats::new());
    let registrations = Registrations::new();
    let dispatcher = Dispatcher::new(registrations.clone(), cache.clone(), stats.clone());

    let local = LocalEndpoint::new(
        Arc::new(CountingCacheService { calls }),
        Barrier::new(),
        cache.clone(),
        Arc::new(NoopReporter),
        stats.clone(),
        RuntimeSettings::default(),
    );
    dispatcher.register_local(Arc::new(local));

    let sessions = SessionStore::new(store.clone());
    let node = fns_core::Node::new("node-1", "test-node", "http://127.0.0.1:0");

    AppState {
        node,
        dispatcher,
        registrations,
        lifecycle: Arc::new(Lifecycle::new()),
        limiter: Arc::new(Limiter::new(LimiterSettings {
            capacity: limiter_capacity,
            refill_per_second: 0,
            retry_after_seconds: 1,
        })),
        signature_guard: Arc::new(SignatureGuard::new(sessions.clone())),
        key_exchange: Arc::new(KeyExchange::new(sessions, Arc::new(AllowAllRegistry))),
        stats,
        cache,
        stats_barrier: Barrier::new(),
        system: Arc::new(parking_lot::Mutex::new(sysinfo::System::new_all())),
        pid: sysinfo::get_current_pid().unwrap_or_else(|_| sysinfo::Pid::from(0usize)),
        store,
    }
}

fn test_state(limiter_capacity: u32) -> AppState {
    let store: Arc<dyn fns_core::Store> = Arc::new(LocalStore::new());
    let cache = Some(CacheStore::new(store.clone()));
    let stats = Arc::new(Stats::new());
    let registrations = Registrations::new();
    let dispatcher = Dispatcher::new(registrations.clone(), cache.clone(), stats.clone());

    let local = LocalEndpoint::new(
        Arc::new(EchoService),
        Barrier::new(),
        cache.clone(),
        Arc::new(NoopReporter),
        stats.clone(),
        RuntimeSettings::default(),
    );
    dispatcher.register_local(Arc::new(local));

    let sessions = SessionStore::new(store.clone());
    let node = fns_core::Node::new("node-1", "test-node", "http://127.0.0.1:0");

    AppState {
        node,
        dispatcher,
        registrations,
        lifecycle: Arc::new(Lifecycle::new()),
        limiter: Arc::new(Limiter::new(LimiterSettings {
            capacity: limiter_capacity,
            refill_per_second: 0,
            retry_after_seconds: 1,
        })),
        signature_guard: Arc::new(SignatureGuard::new(sessions.clone())),
        key_exchange: Arc::new(KeyExchange::new(sessions, Arc::new(AllowAllRegistry))),
        stats,
        cache,
        stats_barrier: Barrier::new(),
        system: Arc::new(parking_lot::Mutex::new(sysinfo::System::new_all())),
        pid: sysinfo::get_current_pid().unwrap_or_else(|_| sysinfo::Pid::from(0usize)),
        store,
    }
}

/// Like [`test_state`] but also returns the [`SessionStore`] backing
/// `signature_guard`, so a test can seed an agreed session directly rather
/// than driving the full `/signatures/exchange_key` handshake.
fn test_state_with_sessions(limiter_capacity: u32) -> (AppState, SessionStore) {
    let store: Arc<dyn fns_core::Store> = Arc::new(LocalStore::new());
    let cache = Some(CacheStore::new(store.clone()));
    let stats = Arc::new(Stats::new());
    let registrations = Registrations::new();
    let dispatcher = Dispatcher::new(registrations.clone(), cache.clone(), stats.clone());

    let local = LocalEndpoint::new(
        Arc::new(EchoService),
        Barrier::new(),
        cache.clone(),
        Arc::new(NoopReporter),
        stats.clone(),
        RuntimeSettings::default(),
    );
    dispatcher.register_local(Arc::new(local));

    let sessions = SessionStore::new(store.clone());
    let node = fns_core::Node::new("node-1", "test-node", "http://127.0.0.1:0");

    let state = AppState {
        node,
        dispatcher,
        registrations,
        lifecycle: Arc::new(Lifecycle::new()),
        limiter: Arc::new(Limiter::new(LimiterSettings {
            capacity: limiter_capacity,
            refill_per_second: 0,
            retry_after_seconds: 1,
        })),
        signature_guard: Arc::new(SignatureGuard::new(sessions.clone())),
        key_exchange: Arc::new(KeyExchange::new(sessions.clone(), Arc::new(AllowAllRegistry))),
        stats,
        cache,
        stats_barrier: Barrier::new(),
        system: Arc::new(parking_lot::Mutex::new(sysinfo::System::new_all())),
        pid: sysinfo::get_current_pid().unwrap_or_else(|_| sysinfo::Pid::from(0usize)),
        store,
    };
    (state, sessions)
}

fn request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    let mut req = Request::builder()
        .method(method)
        .uri(uri)
        .header("x-fns-device-id", "dev-1")
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap();
    req.extensions_mut()
        .insert(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 0))));
    req
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
    serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
}

#[tokio::test]
async fn starting_lifecycle_rejects_with_425() {
    let state = test_state(50);
    let router = fns_transport::router(state);

    let response = router
        .oneshot(request("GET", "/application/health", serde_json::json!(null)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_EARLY);
    assert_eq!(response.headers().get("retry-after").unwrap(), "10");
}

#[tokio::test]
async fn closed_lifecycle_rejects_with_503_and_connection_close() {
    let state = test_state(50);
    state.lifecycle.set_state(LifecycleState::Closed);
    let router = fns_transport::router(state);

    let response = router
        .oneshot(request("GET", "/application/health", serde_json::json!(null)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(response.headers().get("connection").unwrap(), "close");
}

#[tokio::test]
async fn health_reports_node_identity() {
    let state = test_state(50);
    state.lifecycle.set_state(LifecycleState::Serving);
    let router = fns_transport::router(state);

    let response = router
        .oneshot(request("GET", "/application/health", serde_json::json!(null)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["id"], "node-1");
    assert_eq!(body["name"], "test-node");
}

#[tokio::test]
async fn missing_device_id_is_rejected_with_400() {
    let state = test_state(50);
    state.lifecycle.set_state(LifecycleState::Serving);
    let router = fns_transport::router(state);

    let req = Request::builder()
        .method("GET")
        .uri("/application/health")
        .body(Body::empty())
        .unwrap();
    let mut req = req;
    req.extensions_mut()
        .insert(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 0))));

    let response = router.oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn internal_call_dispatches_and_wraps_response_envelope() {
    let state = test_state(50);
    state.lifecycle.set_state(LifecycleState::Serving);
    let router = fns_transport::router(state);

    let envelope = serde_json::json!({
        "user": {"id": "", "attributes": {}},
        "trunk": {},
        "argument": {"hello": "world"},
    });
    let mut req = request("POST", "/echo/ping", envelope);
    req.headers_mut()
        .insert(names::REQUEST_INTERNAL_SIGNATURE, "any-signature".parse().unwrap());

    let response = router.oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["succeed"], true);
    assert_eq!(body["body"]["hello"], "world");
}

#[tokio::test]
async fn cache_flagged_call_serves_second_hit_via_304() {
    let state = test_state(50);
    state.lifecycle.set_state(LifecycleState::Serving);
    let router = fns_transport::router(state);

    let envelope = serde_json::json!({
        "user": {"id": "", "attributes": {}},
        "trunk": {},
        "argument": serde_json::Value::Null,
    });
    let mut first = request("POST", "/echo/cached", envelope.clone());
    first
        .headers_mut()
        .insert(names::REQUEST_INTERNAL_SIGNATURE, "any-signature".parse().unwrap());

    let response = router.clone().oneshot(first).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let etag = response
        .headers()
        .get(names::ETAG)
        .expect("etag header set when cache-control is requested")
        .to_str()
        .unwrap()
        .to_string();

    let mut second = request("POST", "/echo/cached", envelope);
    second
        .headers_mut()
        .insert(names::REQUEST_INTERNAL_SIGNATURE, "any-signature".parse().unwrap());
    second
        .headers_mut()
        .insert(names::IF_NONE_MATCH, etag.parse().unwrap());

    let response = router.oneshot(second).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
}

#[tokio::test]
async fn limiter_exhaustion_is_reported_with_retry_after() {
    let state = test_state(1);
    state.lifecycle.set_state(LifecycleState::Serving);
    // Exhaust the bucket directly rather than via a held-open concurrent
    // request: the limiter is a `Take`-before/`Repay`-after concurrency
    // bound (spec §4.11), so two sequential requests would never collide.
    state.limiter.take("dev-1").unwrap();
    let router = fns_transport::router(state);

    let response = router
        .oneshot(request("GET", "/application/health", serde_json::json!(null)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().get("retry-after").is_some());
}

#[tokio::test]
async fn services_documents_lists_registered_service() {
    let state = test_state(50);
    state.lifecycle.set_state(LifecycleState::Serving);
    let router = fns_transport::router(state);

    let response = router
        .oneshot(request("GET", "/services/names", serde_json::json!(null)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body, serde_json::json!(["echo"]));
}

/// Spec §8 scenario 1 ("round-trip signed call"): an external client with
/// an agreed session HMAC-signs `path || body`, gets back `200` with the
/// echoed body and a response `X-Fns-Signature` that verifies against the
/// same session key.
#[tokio::test]
async fn signed_external_call_round_trips() {
    use base64::Engine;
    use fns_signature::session::SignatureSession;

    let (state, sessions) = test_state_with_sessions(50);
    state.lifecycle.set_state(LifecycleState::Serving);

    let key = b"0123456789abcdef0123456789abcdef".to_vec();
    let session = SignatureSession {
        agreed: true,
        key: base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(&key),
        expire_at_millis: fns_core::tracer::unix_millis_now() + 60_000,
        initiator_exchange_key_hash: "irrelevant-for-this-test".to_string(),
    };
    sessions
        .save("dev-1", &session, std::time::Duration::from_secs(60))
        .await
        .unwrap();

    let argument = serde_json::json!({"msg": "hi"});
    let body_bytes = serde_json::to_vec(&argument).unwrap();
    let signature = fns_signature::hmac_sign::sign(&key, "/echo/ping", &body_bytes);

    let router = fns_transport::router(state);
    let mut req = request("POST", "/echo/ping", argument.clone());
    req.headers_mut()
        .insert(names::SIGNATURE, signature.parse().unwrap());

    let response = router.oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let response_signature = response
        .headers()
        .get(names::SIGNATURE)
        .expect("response is signed with the session key")
        .to_str()
        .unwrap()
        .to_string();

    let response_body_bytes = to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
    assert_eq!(
        serde_json::from_slice::<serde_json::Value>(&response_body_bytes).unwrap(),
        argument
    );
    assert!(fns_signature::hmac_sign::verify(
        &key,
        "/echo/ping",
        &response_body_bytes,
        &response_signature
    ));
}

/// Spec §8 scenario 2's literal "second identical call → 200 with same
/// body, served without invoking the fn" clause: a repeat call with no
/// conditional header must short-circuit the handler entirely.
#[tokio::test]
async fn repeat_cache_hit_serves_without_invoking_handler() {
    let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let state = test_state_with_counting_cache(50, calls.clone());
    state.lifecycle.set_state(LifecycleState::Serving);
    let router = fns_transport::router(state);

    let envelope = serde_json::json!({
        "user": {"id": "", "attributes": {}},
        "trunk": {},
        "argument": serde_json::Value::Null,
    });
    let mut first = request("POST", "/echo/cached", envelope.clone());
    first
        .headers_mut()
        .insert(names::REQUEST_INTERNAL_SIGNATURE, "any-signature".parse().unwrap());
    let first_response = router.clone().oneshot(first).await.unwrap();
    assert_eq!(first_response.status(), StatusCode::OK);
    let first_body = body_json(first_response).await;
    assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);

    let mut second = request("POST", "/echo/cached", envelope);
    second
        .headers_mut()
        .insert(names::REQUEST_INTERNAL_SIGNATURE, "any-signature".parse().unwrap());
    let second_response = router.oneshot(second).await.unwrap();
    assert_eq!(second_response.status(), StatusCode::OK);
    let second_body = body_json(second_response).await;

    assert_eq!(first_body, second_body);
    assert_eq!(
        calls.load(std::sync::atomic::Ordering::SeqCst),
        1,
        "second identical call must be served from cache, not by re-invoking the fn"
    );
}

/// Spec §8 scenario 6's drain clause: an in-flight admission keeps the host
/// open until it completes, and the counter reaches zero before `close()`
/// returns, even though new requests immediately see `503`.
#[tokio::test]
async fn lifecycle_close_drains_in_flight_admission_before_returning() {
    let state = test_state(50);
    state.lifecycle.set_state(LifecycleState::Serving);
    let guard = state.lifecycle.admit();
    assert_eq!(state.lifecycle.in_flight(), 1);

    let lifecycle = state.lifecycle.clone();
    let closer = tokio::spawn(async move { lifecycle.close().await });

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(state.lifecycle.state(), LifecycleState::Closed);

    let router = fns_transport::router(state.clone());
    let response = router
        .oneshot(request("GET", "/application/health", serde_json::json!(null)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    drop(guard);
    closer.await.unwrap();
    assert_eq!(state.lifecycle.in_flight(), 0);
}
