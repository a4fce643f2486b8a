//! Graceful shutdown coordination (spec §5/§8), grounded on
//! `spark-hosting::shutdown::GracefulShutdownCoordinator`'s "register a
//! target, broadcast a signal, wait for drain" shape — simplified here to
//! the one `Lifecycle` + one `ClusterLoop` this spec actually assembles,
//! in the plain `tokio` idiom the rest of `fns-*` already uses rather than
//! the teacher's `no_std`/`alloc`-gated form.

use std::sync::Arc;

use tokio::sync::Notify;

use fns_transport::Lifecycle;

/// Waits for SIGINT (and, on unix, SIGTERM), then drives the host's
/// [`Lifecycle`] through drain and stops any registered background loops.
pub struct GracefulShutdownCoordinator {
    lifecycle: Arc<Lifecycle>,
    background_stops: Vec<Arc<Notify>>,
}

impl GracefulShutdownCoordinator {
    pub fn new(lifecycle: Arc<Lifecycle>) -> Self {
        Self {
            lifecycle,
            background_stops: Vec::new(),
        }
    }

    /// Registers a background task's stop handle (e.g.
    /// [`fns_cluster::ClusterLoop::stop_handle`]) to be notified once
    /// shutdown begins.
    pub fn register_background(&mut self, stop: Arc<Notify>) {
        self.background_stops.push(stop);
    }

    /// Blocks until an operator asks the process to stop.
    pub async fn wait_for_signal(&self) {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigterm =
                signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
        }
    }

    /// Marks the host closed, stops every registered background loop, and
    /// waits for in-flight requests to drain (spec §8: "in-flight counter
    /// reaches zero before Close() returns").
    pub async fn shutdown(&self) {
        tracing::info!("shutdown requested, draining in-flight requests");
        for stop in &self.background_stops {
            stop.notify_waiters();
        }
        self.lifecycle.close().await;
        tracing::info!("drain complete, shutting down");
    }
}
