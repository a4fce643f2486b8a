//! `fns-transport` — the axum/tower HTTP surface: the C11 middleware chain,
//! the application/services/signatures/cluster handlers, and the router
//! that wires them together (spec §4/§6, C11).

pub mod dev_proxy;
pub mod device;
pub mod handlers;
pub mod lifecycle;
pub mod limiter;
pub mod middleware;
pub mod request_ctx;
pub mod respond;
pub mod state;

use axum::routing::{get, post};
use axum::Router;

pub use lifecycle::{Lifecycle, LifecycleState};
pub use limiter::{Limiter, LimiterSettings};
pub use state::AppState;

/// Builds the full router: routes first, then middleware layered
/// innermost-to-outermost so that execution order on the way in reads
/// `application → signatures → cacheControl → limiter → handlers` (spec
/// §4.11). `axum`'s `.layer()` wraps each prior layer in a new outer shell,
/// so the last `.layer()` call here is the first one a request passes
/// through.
///
/// `application_middleware` extracts `ConnectInfo<SocketAddr>`, so callers
/// must serve this router via
/// `axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())`.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/application/health", get(handlers::health))
        .route("/application/stats", get(handlers::stats))
        .route("/services/documents", get(handlers::documents))
        .route("/services/names", get(handlers::names_list))
        .route("/services/openapi", get(handlers::openapi))
        .route("/cluster/nodes", get(dev_proxy::nodes))
        .route("/cluster/shared", post(dev_proxy::shared))
        .route("/{service}/{fn_name}", post(handlers::dispatch_service_fn))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::limiter_middleware,
        ))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::cache_control_middleware,
        ))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::signature_middleware,
        ))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::application_middleware,
        ))
        .with_state(state)
}
