//! The periodic cluster discovery/membership loop (spec §4.10, C10),
//! grounded on `spark-core::cluster::membership::ClusterMembership`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use fns_core::Node;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::discovery::{fetch_documents, ClusterDiscovery};
use crate::registration::Registration;
use crate::ring::Registrations;
use crate::signer::ClusterSigner;

/// Tunables named by spec §4.10, mirroring `spark-core::limits::LimitSettings`'s
/// plain-settings-struct shape (see `SPEC_FULL.md` §4.0.2).
#[derive(Clone, Copy, Debug)]
pub struct ClusterLoopSettings {
    pub bootstrap_delay: Duration,
    pub refresh_interval: Duration,
    pub request_timeout: Duration,
}

impl Default for ClusterLoopSettings {
    fn default() -> Self {
        Self {
            bootstrap_delay: Duration::from_millis(10),
            refresh_interval: Duration::from_secs(5),
            request_timeout: Duration::from_secs(5),
        }
    }
}

/// Drives periodic discovery, diffing discovered nodes against what's
/// already registered and keeping [`Registrations`] in sync.
pub struct ClusterLoop {
    self_id: String,
    self_name: String,
    self_version: String,
    discovery: Arc<dyn ClusterDiscovery>,
    registrations: Registrations,
    client: reqwest::Client,
    signer: Arc<dyn ClusterSigner>,
    settings: ClusterLoopSettings,
    known: Mutex<HashMap<String, Node>>,
    stop: Arc<Notify>,
}

impl ClusterLoop {
    pub fn new(
        self_id: impl Into<String>,
        self_name: impl Into<String>,
        self_version: impl Into<String>,
        discovery: Arc<dyn ClusterDiscovery>,
        registrations: Registrations,
        client: reqwest::Client,
        signer: Arc<dyn ClusterSigner>,
        settings: ClusterLoopSettings,
    ) -> Self {
        Self {
            self_id: self_id.into(),
            self_name: self_name.into(),
            self_version: self_version.into(),
            discovery,
            registrations,
            client,
            signer,
            settings,
            known: Mutex::new(HashMap::new()),
            stop: Arc::new(Notify::new()),
        }
    }

    pub fn stop_handle(&self) -> Arc<Notify> {
        self.stop.clone()
    }

    /// Runs until [`Self::stop_handle`] is notified. Intended to be
    /// spawned as a background task by `fns-hosting`.
    pub async fn run(&self) {
        tokio::time::sleep(self.settings.bootstrap_delay).await;
        loop {
            let tick = self.tick();
            tokio::select! {
                _ = tick => {}
                _ = self.stop.notified() => break,
            }
            tokio::select! {
                _ = tokio::time::sleep(self.settings.refresh_interval) => {}
                _ = self.stop.notified() => break,
            }
        }
    }

    async fn tick(&self) {
        let nodes = match self.discovery.nodes().await {
            Ok(nodes) => nodes,
            Err(err) => {
                tracing::warn!(error = %err, "cluster discovery poll failed");
                return;
            }
        };

        // Spec §4.10 step 2: drop self by id, and also any peer advertising
        // the same (name, version) as this node — a second instance of the
        // same build, not a distinct registration target.
        let discovered: HashMap<String, Node> = nodes
            .into_iter()
            .filter(|n| n.id != self.self_id)
            .filter(|n| !(n.name == self.self_name && n.version == self.self_version))
            .map(|n| (n.id.clone(), n))
            .collect();

        let (added, removed) = {
            let mut known = self.known.lock();
            let mut added = Vec::new();
            for (id, node) in &discovered {
                let is_new = match known.get(id) {
                    Some(existing) => existing.name != node.name,
                    None => true,
                };
                if is_new {
                    added.push(node.clone());
                }
            }
            let removed: Vec<String> = known
                .keys()
                .filter(|id| !discovered.contains_key(*id))
                .cloned()
                .collect();
            *known = discovered;
            (added, removed)
        };

        for id in removed {
            self.registrations.remove(&id);
        }

        for node in added {
            match fetch_documents(&self.client, &node.address).await {
                Ok(documents) => {
                    for document in documents {
                        let registration = Registration::new(
                            node.id.clone(),
                            document.version.clone(),
                            node.address.clone(),
                            document,
                            self.client.clone(),
                            self.settings.request_timeout,
                            self.signer.clone(),
                        );
                        self.registrations.add(registration);
                    }
                }
                Err(err) => {
                    tracing::warn!(node = %node.id, error = %err, "document fetch failed");
                }
            }
        }
    }
}
