//! Local developer proxy (spec §4.3 dev-mode supplement): `GET
//! /cluster/nodes`, the shared-store multiplex at `POST /cluster/shared`,
//! and the `X-Fns-Dev-Mode` variant of `POST /{service}/{fn}` that lets a
//! workstation impersonate one specific registration instead of being load
//! balanced across the ring.

use std::time::Duration;

use axum::extract::{Request, State};
use axum::response::{IntoResponse, Json, Response};
use fns_core::{names, CallContext, CodeError, Endpoint, Trunk, User};
use fns_runtime::envelope::RequestEnvelope;
use fns_runtime::RemoteEndpoint;
use fns_signature::guard::InboundSignature;
use serde::Deserialize;

use crate::handlers::headers_from_axum;
use crate::request_ctx::{DeviceId, RequestBody};
use crate::respond::{bad_request, error_response};
use crate::state::AppState;

/// `GET /cluster/nodes`: every service's current ring, for a developer
/// inspecting cluster membership.
pub async fn nodes(State(state): State<AppState>) -> Response {
    let listing = state.registrations.list();
    let body: Vec<_> = listing
        .into_iter()
        .map(|(service, registrations)| {
            serde_json::json!({
                "service": service,
                "registrations": registrations
                    .iter()
                    .map(|r| serde_json::json!({
                        "id": r.id,
                        "hostId": r.host_id,
                        "version": r.version,
                        "address": r.address,
                    }))
                    .collect::<Vec<_>>(),
            })
        })
        .collect();
    Json(body).into_response()
}

#[derive(Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
enum SharedOp {
    Get { key: String },
    Set { key: String, value: String },
    SetWithTtl { key: String, value: String, ttl_seconds: u64 },
    Incr { key: String, delta: i64 },
    ExpireKey { key: String, ttl_seconds: u64 },
    Remove { key: String },
}

/// `POST /cluster/shared`: a multiplexed entry point onto the node's shared
/// [`fns_core::Store`] for a developer workstation. The original dev-proxy
/// names this "locker/store/cache" as one undifferentiated surface; this
/// spec's data model only has the one shared `Store`, so all three collapse
/// onto it (documented in `DESIGN.md`).
pub async fn shared(State(state): State<AppState>, body: bytes::Bytes) -> Response {
    let op: SharedOp = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(_) => return bad_request("malformed shared-store operation"),
    };

    let result = match op {
        SharedOp::Get { key } => state.store.get(&key).await.map(|v| {
            serde_json::json!({ "value": v.map(|b| String::from_utf8_lossy(&b).into_owned()) })
        }),
        SharedOp::Set { key, value } => state
            .store
            .set(&key, value.into_bytes())
            .await
            .map(|_| serde_json::json!({ "ok": true })),
        SharedOp::SetWithTtl { key, value, ttl_seconds } => state
            .store
            .set_with_ttl(&key, value.into_bytes(), Duration::from_secs(ttl_seconds))
            .await
            .map(|_| serde_json::json!({ "ok": true })),
        SharedOp::Incr { key, delta } => state
            .store
            .incr(&key, delta)
            .await
            .map(|next| serde_json::json!({ "value": next })),
        SharedOp::ExpireKey { key, ttl_seconds } => state
            .store
            .expire_key(&key, Duration::from_secs(ttl_seconds))
            .await
            .map(|_| serde_json::json!({ "ok": true })),
        SharedOp::Remove { key } => state
            .store
            .remove(&key)
            .await
            .map(|_| serde_json::json!({ "ok": true })),
    };

    match result {
        Ok(value) => Json(value).into_response(),
        Err(err) => error_response(&err),
    }
}

/// `POST /{service}/{fn}` under `X-Fns-Dev-Mode`: verifies the signature as
/// an ordinary client call would, then dispatches straight to the exact
/// registration named by the header rather than the round-robin ring, so a
/// developer can target one specific running instance (spec §4.3).
pub async fn forward(state: AppState, service: String, fn_name: String, req: Request) -> Response {
    let app_id = match req.headers().get(names::DEV_MODE).and_then(|v| v.to_str().ok()) {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => return bad_request("missing X-Fns-Dev-Mode target id"),
    };

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
    let signature = req
        .headers()
        .get(names::SIGNATURE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let path = format!("/{service}/{fn_name}");

    if let Err(err) = state
        .signature_guard
        .verify(InboundSignature {
            device_id: &device_id,
            path: &path,
            body: &body,
            internal_signature_present: false,
            signature: signature.as_deref(),
        })
        .await
    {
        return error_response(&err);
    }

    let envelope: RequestEnvelope = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(_) => return bad_request("malformed request envelope"),
    };

    let Some(registration) = state.registrations.get_exact(&service, &app_id) else {
        return error_response(
            &CodeError::not_found("no such registration")
                .with_meta("service", &service)
                .with_meta("id", &app_id),
        );
    };

    let headers = headers_from_axum(req.headers());
    let user = User::with_id(envelope.user.id);
    user.set_attributes(envelope.user.attributes);
    let trunk = Trunk::new();
    trunk.merge(&envelope.trunk);

    let ctx = req
        .extensions()
        .get::<CallContext>()
        .cloned()
        .unwrap_or_else(CallContext::root);
    let options = fns_core::RequestOptions::new()
        .header(headers)
        .user(user)
        .trunk(trunk)
        .internal(true);
    let (request, next_ctx) = fns_core::Request::new(&ctx, service, fn_name, envelope.argument, options);

    let endpoint = RemoteEndpoint::new(registration, state.cache.clone(), state.stats.clone());
    match endpoint.request(&next_ctx, &request).await {
        Ok(body) => Json(body).into_response(),
        Err(err) => error_response(&err),
    }
}
