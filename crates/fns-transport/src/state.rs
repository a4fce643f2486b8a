//! Shared application state threaded through every axum handler, grounded
//! on `spark-hosting::host::Host`'s "single struct the host assembles and
//! passes down" shape.

use std::sync::Arc;

use fns_cluster::Registrations;
use fns_core::{Barrier, Node, Store};
use fns_runtime::{CacheStore, Dispatcher, Stats};
use fns_signature::{KeyExchange, SignatureGuard};
use parking_lot::Mutex;

use crate::lifecycle::Lifecycle;
use crate::limiter::Limiter;

#[derive(Clone)]
pub struct AppState {
    pub node: Node,
    pub dispatcher: Dispatcher,
    pub registrations: Registrations,
    pub lifecycle: Arc<Lifecycle>,
    pub limiter: Arc<Limiter>,
    pub signature_guard: Arc<SignatureGuard>,
    pub key_exchange: Arc<KeyExchange>,
    pub stats: Arc<Stats>,
    /// Same etag keyspace the dispatcher's internal cache-control uses
    /// (spec §4.5): the application-facing middleware and the internal
    /// fn/registration revalidation dance share one store.
    pub cache: Option<CacheStore>,
    /// Coalesces concurrent `GET /application/stats` calls (spec §4.12:
    /// "under singleflight dedup by handler name").
    pub stats_barrier: Barrier,
    pub system: Arc<Mutex<sysinfo::System>>,
    pub pid: sysinfo::Pid,
    /// Backs the dev-proxy's `POST /cluster/shared` store multiplex (spec
    /// §4.3); the same instance a cluster-aware deployment would hand to
    /// `fns-runtime`'s cache layer, so dev-mode reads see live state.
    pub store: Arc<dyn Store>,
}
