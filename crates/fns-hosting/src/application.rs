//! Host assembly (spec §2/§4.11, ground truth `fns-transport::AppState`),
//! grounded on `spark-hosting::host::Host`'s "one struct the host builds
//! and hands down" shape: [`Application::new`] wires every `fns-*` crate's
//! pieces into one [`AppState`], registers the built-in `signatures`
//! service the way any other local [`fns_core::Service`] is registered, and
//! [`Application::serve`] drives the axum server through to a drained
//! shutdown.

use std::net::SocketAddr;
use std::sync::Arc;

use fns_cluster::{ClusterDiscovery, ClusterLoop, ClusterLoopSettings, Registrations, SharedSecretSigner};
use fns_core::{Barrier, LocalStore, LoggingReporter, Node, Store};
use fns_runtime::{CacheStore, Dispatcher, LocalEndpoint, RuntimeSettings, Stats};
use fns_signature::{AllowAllRegistry, CertificateRegistry, KeyExchange, SessionStore, SignatureGuard, SignaturesService};
use fns_transport::{AppState, Lifecycle, LifecycleState, Limiter, LimiterSettings};

use crate::shutdown::GracefulShutdownCoordinator;

/// Plain tunables an embedder fills in or loads from its own config source
/// (spec §4.0.2: loading itself is a Non-goal, the tunables aren't).
#[derive(Clone)]
pub struct ApplicationSettings {
    pub node_id: String,
    pub node_name: String,
    pub address: String,
    pub runtime: RuntimeSettings,
    pub limiter: LimiterSettings,
    pub cluster: ClusterLoopSettings,
    pub cluster_signing_secret: Vec<u8>,
}

impl Default for ApplicationSettings {
    fn default() -> Self {
        Self {
            node_id: uuid::Uuid::new_v4().to_string(),
            node_name: "fns-node".to_string(),
            address: "http://127.0.0.1:8080".to_string(),
            runtime: RuntimeSettings::default(),
            limiter: LimiterSettings::default(),
            cluster: ClusterLoopSettings::default(),
            cluster_signing_secret: b"change-me".to_vec(),
        }
    }
}

/// The assembled host: every `fns-*` crate's state behind one [`AppState`],
/// plus the background cluster loop `serve`/`start` drive.
pub struct Application {
    state: AppState,
    cluster_loop: Arc<ClusterLoop>,
}

impl Application {
    pub fn new(settings: ApplicationSettings, discovery: Arc<dyn ClusterDiscovery>) -> Self {
        let store: Arc<dyn Store> = Arc::new(LocalStore::new());
        let cache = Some(CacheStore::new(store.clone()));
        let stats = Arc::new(Stats::new());
        let registrations = Registrations::new();
        let dispatcher = Dispatcher::new(registrations.clone(), cache.clone(), stats.clone());

        let sessions = SessionStore::new(store.clone());
        let registry: Arc<dyn CertificateRegistry> = Arc::new(AllowAllRegistry);

        // `KeyExchange` isn't `Clone` (it owns a `SessionStore` it mutates
        // through, not anything that needs sharing); the `SignaturesService`
        // registered below and `AppState.key_exchange` get their own
        // instances, but both wrap the same `SessionStore`/registry so the
        // sessions they persist are the same rows either would see.
        let key_exchange = Arc::new(KeyExchange::new(sessions.clone(), registry.clone()));
        let signatures_service = SignaturesService::new(KeyExchange::new(sessions.clone(), registry));

        let signatures = Arc::new(LocalEndpoint::new(
            Arc::new(signatures_service),
            Barrier::new(),
            cache.clone(),
            Arc::new(LoggingReporter),
            stats.clone(),
            settings.runtime,
        ));
        dispatcher.register_local(signatures);

        let signature_guard = Arc::new(SignatureGuard::new(sessions));

        let node = Node::new(settings.node_id.clone(), settings.node_name.clone(), settings.address.clone());

        let signer: Arc<dyn fns_cluster::ClusterSigner> =
            Arc::new(SharedSecretSigner::new(settings.cluster_signing_secret.clone()));
        let cluster_loop = Arc::new(ClusterLoop::new(
            settings.node_id.clone(),
            node.name.clone(),
            node.version.clone(),
            discovery,
            registrations.clone(),
            reqwest::Client::new(),
            signer,
            settings.cluster,
        ));

        let state = AppState {
            node,
            dispatcher,
            registrations,
            lifecycle: Arc::new(Lifecycle::new()),
            limiter: Arc::new(Limiter::new(settings.limiter)),
            signature_guard,
            key_exchange,
            stats,
            cache,
            stats_barrier: Barrier::new(),
            system: Arc::new(parking_lot::Mutex::new(sysinfo::System::new_all())),
            pid: sysinfo::get_current_pid().unwrap_or_else(|_| sysinfo::Pid::from(0usize)),
            store,
        };

        Self { state, cluster_loop }
    }

    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    pub fn cluster_loop(&self) -> Arc<ClusterLoop> {
        self.cluster_loop.clone()
    }

    /// Spawns the background cluster membership loop, marks the host
    /// `Serving`, and returns the shutdown coordinator the caller waits on.
    pub fn start(&self) -> GracefulShutdownCoordinator {
        let cluster_loop = self.cluster_loop.clone();
        tokio::spawn(async move { cluster_loop.run().await });
        self.state.lifecycle.set_state(LifecycleState::Serving);

        let mut coordinator = GracefulShutdownCoordinator::new(self.state.lifecycle.clone());
        coordinator.register_background(self.cluster_loop.stop_handle());
        coordinator
    }

    /// Serves the HTTP surface until an operator asks for shutdown, then
    /// drains in-flight requests before returning (spec §8). `axum`'s
    /// `ConnectInfo<SocketAddr>` extractor (used by `application_middleware`
    /// for device-ip resolution) requires
    /// `into_make_service_with_connect_info`.
    pub async fn serve(self, listener: tokio::net::TcpListener) -> std::io::Result<()> {
        let coordinator = self.start();
        let router = fns_transport::router(self.state.clone());

        axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())
            .with_graceful_shutdown(async move {
                coordinator.wait_for_signal().await;
                coordinator.shutdown().await;
            })
            .await
    }
}
