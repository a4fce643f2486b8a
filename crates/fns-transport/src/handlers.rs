//! `GET /application/*`, `GET /services/*` and the core `POST /{service}/{fn}`
//! dispatch handler (spec §4.3/§4.4/§6).

use axum::extract::{Path, Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};

use fns_core::{names, AcceptedVersions, CallContext, Headers, RequestOptions, Trunk, User};
use fns_runtime::envelope::{RequestEnvelope, ResponseEnvelope, UserSnapshot};

use crate::request_ctx::{DeviceIp, RequestBody};
use crate::respond::{bad_request, error_response};
use crate::state::AppState;

const STATS_BARRIER_KEY: u64 = 0x5354_4154_5f4b4559;

pub(crate) fn headers_from_axum(headers: &HeaderMap) -> Headers {
    let mut out = Headers::new();
    for (name, value) in headers.iter() {
        if let Ok(v) = value.to_str() {
            out.insert(name.as_str(), v.to_string());
        }
    }
    out
}

/// `GET /application/health` (spec §4.3): node identity plus the caller's
/// resolved device ip, no auth or signature required.
pub async fn health(State(state): State<AppState>, req: Request) -> Response {
    let device_ip = req.extensions().get::<DeviceIp>().map(|d| d.0.clone());
    Json(serde_json::json!({
        "name": state.node.name,
        "id": state.node.id,
        "version": state.node.version,
        "launch": state.node.launch,
        "now": fns_core::tracer::unix_millis_now(),
        "deviceIp": device_ip,
    }))
    .into_response()
}

/// `GET /application/stats` (spec §4.3): process mem/cpu via `sysinfo`,
/// coalesced through a singleflight barrier so a burst of monitoring
/// scrapers never refreshes the same process table concurrently.
pub async fn stats(State(state): State<AppState>) -> Response {
    let node = state.node.clone();
    let system = state.system.clone();
    let pid = state.pid;
    let lifecycle = state.lifecycle.clone();

    let (result, _shared) = state
        .stats_barrier
        .do_call(STATS_BARRIER_KEY, move || async move {
            let mut system = system.lock();
            system.refresh_process(pid);
            let (mem, cpu) = system
                .process(pid)
                .map(|p| (p.memory(), p.cpu_usage()))
                .unwrap_or((0, 0.0));
            Ok(serde_json::json!({
                "id": node.id,
                "name": node.name,
                "running": lifecycle.state() == crate::lifecycle::LifecycleState::Serving,
                "mem": mem,
                "cpu": cpu,
            }))
        })
        .await;

    match result {
        Ok(value) => Json(value).into_response(),
        Err(err) => error_response(&err),
    }
}

/// `GET /services/documents` (spec §4.4).
pub async fn documents(State(state): State<AppState>) -> Response {
    Json(state.dispatcher.local_documents()).into_response()
}

/// `GET /services/names` (spec §4.4).
pub async fn names_list(State(state): State<AppState>) -> Response {
    Json(state.dispatcher.local_service_names()).into_response()
}

/// `GET /services/openapi` (spec §4.4, Non-goal: no OpenAPI generator is
/// implemented, so this is a stable 501 rather than a silent empty body).
pub async fn openapi() -> Response {
    StatusCode::NOT_IMPLEMENTED.into_response()
}

/// `POST /{service}/{fn}` (spec §4.2/§6): the core dispatch path. Branches
/// on whether the call arrived from a peer node (`X-Fns-Request-Internal-
/// Signature`) or an external client, decodes the body accordingly, and
/// responds with the matching envelope shape.
pub async fn dispatch_service_fn(
    State(state): State<AppState>,
    Path((service, fn_name)): Path<(String, String)>,
    req: Request,
) -> Response {
    if req.headers().contains_key(names::DEV_MODE) {
        return crate::dev_proxy::forward(state, service, fn_name, req).await;
    }

    let internal = req.headers().contains_key(names::REQUEST_INTERNAL_SIGNATURE);
    let headers = headers_from_axum(req.headers());
    let body_bytes = req
        .extensions()
        .get::<RequestBody>()
        .map(|b| b.0.clone())
        .unwrap_or_default();

    let version_values: Vec<String> = req
        .headers()
        .get_all(names::REQUEST_VERSION)
        .iter()
        .filter_map(|v| v.to_str().ok().map(str::to_string))
        .collect();
    let accepted_versions = match AcceptedVersions::parse(&version_values) {
        Ok(v) => v,
        Err(err) => return error_response(&err),
    };

    let ctx = req
        .extensions()
        .get::<CallContext>()
        .cloned()
        .unwrap_or_else(CallContext::root);

    let (argument, user, trunk) = if internal {
        let envelope: RequestEnvelope = match serde_json::from_slice(&body_bytes) {
            Ok(v) => v,
            Err(_) => return bad_request("malformed request envelope"),
        };
        let user = User::with_id(envelope.user.id);
        user.set_attributes(envelope.user.attributes);
        let trunk = Trunk::new();
        trunk.merge(&envelope.trunk);
        (envelope.argument, user, trunk)
    } else {
        let argument: serde_json::Value = match serde_json::from_slice(&body_bytes) {
            Ok(v) => v,
            Err(_) => return bad_request("malformed JSON body"),
        };
        (argument, User::new(), Trunk::new())
    };

    let options = RequestOptions::new()
        .header(headers)
        .user(user)
        .trunk(trunk)
        .internal(internal);
    let (mut request, next_ctx) = fns_core::Request::new(&ctx, service, fn_name, argument, options);
    request.set_accepted_versions(accepted_versions);

    let result = state.dispatcher.dispatch(&next_ctx, &request).await;
    if internal {
        // A fn's own business errors (NotFound, Forbidden, ...) are encoded
        // in the envelope body with `succeed: false`, not surfaced as a
        // non-2xx response — spec §4.8 reserves non-2xx/the error counter
        // for transport and decode failures, not fn-level errors.
        let span = next_ctx.extensions().get::<fns_core::Span>().map(|s| s.export());
        let (succeed, body) = match result {
            Ok(body) => (true, body),
            Err(err) => (
                false,
                serde_json::to_value(fns_core::CodeErrorBody::from(&err)).unwrap_or(serde_json::Value::Null),
            ),
        };
        let envelope = ResponseEnvelope {
            user: UserSnapshot {
                id: request.user().id(),
                attributes: request.user().attributes(),
            },
            trunk: request.trunk().snapshot(),
            span,
            succeed,
            body,
        };
        Json(envelope).into_response()
    } else {
        match result {
            Ok(body) => Json(body).into_response(),
            Err(err) => error_response(&err),
        }
    }
}
