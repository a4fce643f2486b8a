//! The C11 middleware chain, outer to inner: `application → signatures →
//! cacheControl → limiter → handlers` (spec §4.11). Each layer is an
//! ordinary `axum::middleware::from_fn_with_state` function; wiring order
//! lives in `lib.rs`.

use std::net::SocketAddr;

use axum::body::{to_bytes, Body};
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderName, HeaderValue, Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use fns_core::{names, CallContext, CodeError};
use fns_runtime::cache_control::{cache_control_requested, compute_etag, CacheRecord};
use fns_signature::guard::InboundSignature;

use crate::device::{extract_device_id, extract_device_ip};
use crate::request_ctx::{DeviceId, DeviceIp, RequestBody};
use crate::respond::{bad_request, error_response, is_service_fn_path};
use crate::state::AppState;

/// Request bodies larger than this are rejected rather than buffered in
/// full; generous enough for ordinary RPC arguments.
const MAX_BODY_BYTES: usize = 8 * 1024 * 1024;

async fn buffer_body(body: Body) -> Result<bytes::Bytes, Response> {
    to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|_| bad_request("request body too large or malformed"))
}

/// Gates by host lifecycle, resolves device id/ip, buffers the request body
/// once for downstream layers, times the handler, and stamps the response
/// headers every request gets regardless of outcome (spec §4.11).
pub async fn application_middleware(
    State(state): State<AppState>,
    ConnectInfo(remote_addr): ConnectInfo<SocketAddr>,
    mut req: Request,
    next: Next,
) -> Response {
    use crate::lifecycle::LifecycleState;

    match state.lifecycle.state() {
        LifecycleState::Closed => {
            let mut response = error_response(&CodeError::unavailable("application is closed"));
            response
                .headers_mut()
                .insert(axum::http::header::CONNECTION, HeaderValue::from_static("close"));
            return response;
        }
        LifecycleState::Starting => {
            let mut response = error_response(&CodeError::too_early("application is starting"));
            response
                .headers_mut()
                .insert(axum::http::header::RETRY_AFTER, HeaderValue::from_static("10"));
            return response;
        }
        LifecycleState::Serving => {}
    }

    let query = req.uri().query().unwrap_or("").to_string();
    let device_id = match extract_device_id(req.headers(), &query) {
        Some(id) => id,
        None => return bad_request("missing X-Fns-Device-Id"),
    };
    let device_ip = extract_device_ip(req.headers(), Some(remote_addr.ip()));

    let body = match buffer_body(std::mem::take(req.body_mut())).await {
        Ok(bytes) => bytes,
        Err(response) => return response,
    };
    *req.body_mut() = Body::from(body.clone());

    req.extensions_mut().insert(DeviceId(device_id.clone()));
    if let Some(ip) = &device_ip {
        req.extensions_mut().insert(DeviceIp(ip.clone()));
    }
    req.extensions_mut().insert(RequestBody(body));
    req.extensions_mut().insert(CallContext::root());

    let guard = state.lifecycle.admit();
    let start = tokio::time::Instant::now();
    let response = next.run(req).await;
    drop(guard);
    let latency_millis = start.elapsed().as_millis();

    let (mut parts, body) = response.into_parts();
    let body_bytes = to_bytes(body, MAX_BODY_BYTES).await.unwrap_or_default();

    if !parts.headers.contains_key(axum::http::header::CONTENT_TYPE) {
        let content_type = if serde_json::from_slice::<serde_json::Value>(&body_bytes).is_ok() {
            "application/json"
        } else if std::str::from_utf8(&body_bytes[..body_bytes.len().min(512)]).is_ok() {
            "text/plain; charset=utf-8"
        } else {
            "application/octet-stream"
        };
        parts
            .headers
            .insert(axum::http::header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    }

    if let Ok(value) = HeaderValue::from_str(&latency_millis.to_string()) {
        parts
            .headers
            .insert(HeaderName::from_static(names::HANDLE_LATENCY), value);
    }
    parts
        .headers
        .insert(HeaderName::from_static("timing-allow-origin"), HeaderValue::from_static("*"));
    parts
        .headers
        .insert(HeaderName::from_static("x-frame-options"), HeaderValue::from_static("SAMEORIGIN"));

    Response::from_parts(parts, Body::from(body_bytes))
}

/// Verifies `X-Fns-Signature` on client calls and signs the response with
/// the same session key (spec §4.6). Bypassed for internal (node-to-node)
/// calls, dev-proxy forwarding, and websocket upgrades (spec §9 redesign
/// flag: the source's dev-mode check should have been an upgrade check;
/// the spec asks for both to bypass).
pub async fn signature_middleware(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let path = req.uri().path().to_string();
    let applies = req.method() == Method::POST && is_service_fn_path(&path);
    if !applies {
        return next.run(req).await;
    }

    let internal_signature = req.headers().get(names::REQUEST_INTERNAL_SIGNATURE).is_some();
    let dev_mode = req.headers().contains_key(names::DEV_MODE);
    let is_upgrade = req.headers().get(axum::http::header::UPGRADE).is_some();
    if internal_signature || dev_mode || is_upgrade {
        return next.run(req).await;
    }

    let device_id = req
        .extensions()
        .get::<DeviceId>()
        .map(|d| d.0.clone())
        .unwrap_or_default();
    let signature = req
        .headers()
        .get(names::SIGNATURE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = req
        .extensions()
        .get::<RequestBody>()
        .map(|b| b.0.clone())
        .unwrap_or_default();

    let verdict = state
        .signature_guard
        .verify(InboundSignature {
            device_id: &device_id,
            path: &path,
            body: &body,
            internal_signature_present: false,
            signature: signature.as_deref(),
        })
        .await;

    let session_key = match verdict {
        Ok(key) => key,
        Err(err) => return error_response(&err),
    };

    let response = next.run(req).await;
    let Some(key) = session_key else {
        return response;
    };

    let (mut parts, body) = response.into_parts();
    let body_bytes = to_bytes(body, MAX_BODY_BYTES).await.unwrap_or_default();
    let signature = fns_signature::guard::SignatureGuard::sign_response(&key, &path, &body_bytes);
    if let Ok(value) = HeaderValue::from_str(&signature) {
        parts
            .headers
            .insert(HeaderName::from_static(names::SIGNATURE), value);
    }
    Response::from_parts(parts, Body::from(body_bytes))
}

/// Serves a fresh cache hit without invoking the handler at all — `200`
/// with the stored body for an ordinary repeat call, `304` for a matching
/// `If-None-Match` — otherwise records the ETag the handler's `CacheFlag`
/// requested (spec §4.5, spec §8 scenario 2: "second identical call → 200
/// with same body, served without invoking the fn").
pub async fn cache_control_middleware(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let Some(cache) = state.cache.clone() else {
        return next.run(req).await;
    };
    let path = req.uri().path().to_string();
    if req.method() != Method::POST || !is_service_fn_path(&path) {
        return next.run(req).await;
    }

    let device_id = req
        .extensions()
        .get::<DeviceId>()
        .map(|d| d.0.clone())
        .unwrap_or_default();
    let body = req
        .extensions()
        .get::<RequestBody>()
        .map(|b| b.0.clone())
        .unwrap_or_default();
    let etag = compute_etag(&device_id, &path, &body);

    let if_none_match = req
        .headers()
        .get(names::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    if let Ok(Some(record)) = cache.lookup(&etag).await {
        if record.is_fresh(fns_core::tracer::unix_millis_now()) {
            if if_none_match.as_deref() == Some(etag.as_str()) {
                return StatusCode::NOT_MODIFIED.into_response();
            }
            if let Ok(cached_body) = record.body() {
                let status = StatusCode::from_u16(record.status).unwrap_or(StatusCode::OK);
                let mut response = (status, cached_body).into_response();
                let headers = response.headers_mut();
                if let Ok(value) = HeaderValue::from_str(&etag) {
                    headers.insert(HeaderName::from_static(names::ETAG), value);
                }
                headers.insert(
                    HeaderName::from_static(names::CACHE_CONTROL),
                    HeaderValue::from_static("public, max-age=0"),
                );
                return response;
            }
        }
    }

    let ctx = req
        .extensions()
        .get::<CallContext>()
        .cloned()
        .unwrap_or_else(CallContext::root);

    let response = next.run(req).await;

    let Some(ttl) = cache_control_requested(&ctx) else {
        return response;
    };

    let (mut parts, body) = response.into_parts();
    let body_bytes = to_bytes(body, MAX_BODY_BYTES).await.unwrap_or_default();
    let record = CacheRecord::new(
        parts.status.as_u16(),
        &body_bytes,
        ttl,
        fns_core::tracer::unix_millis_now(),
    );
    let _ = cache.save(&etag, &record).await;

    if let Ok(value) = HeaderValue::from_str(&etag) {
        parts.headers.insert(HeaderName::from_static(names::ETAG), value);
    }
    parts.headers.insert(
        HeaderName::from_static(names::CACHE_CONTROL),
        HeaderValue::from_static("public, max-age=0"),
    );
    if let Ok(value) = HeaderValue::from_str(&ttl.as_secs().to_string()) {
        parts
            .headers
            .insert(HeaderName::from_static(names::CACHE_TTL), value);
    }
    Response::from_parts(parts, Body::from(body_bytes))
}

/// Token-bucket admission per device id; exhaustion reports `Retry-After`
/// (spec §4.11).
pub async fn limiter_middleware(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let device_id = req
        .extensions()
        .get::<DeviceId>()
        .map(|d| d.0.clone())
        .unwrap_or_default();
    if device_id.is_empty() {
        return next.run(req).await;
    }

    if let Err(retry_after) = state.limiter.take(&device_id) {
        let mut response = StatusCode::TOO_MANY_REQUESTS.into_response();
        if let Ok(value) = HeaderValue::from_str(&retry_after.as_secs().to_string()) {
            response
                .headers_mut()
                .insert(axum::http::header::RETRY_AFTER, value);
        }
        return response;
    }

    let response = next.run(req).await;
    state.limiter.repay(&device_id);
    response
}
