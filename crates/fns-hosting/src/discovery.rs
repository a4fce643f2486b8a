//! A fixed-node-list [`ClusterDiscovery`], useful for single-node
//! deployments and tests where nothing is actually doing gossip/registry
//! discovery yet.

use async_trait::async_trait;
use parking_lot::RwLock;

use fns_cluster::ClusterDiscovery;
use fns_core::{CodeError, Node};

/// Returns whatever node list was last handed to it. An embedder wiring up
/// a real discovery mechanism (gossip, DNS, a registry service) implements
/// [`ClusterDiscovery`] directly instead.
pub struct StaticDiscovery {
    nodes: RwLock<Vec<Node>>,
}

impl StaticDiscovery {
    pub fn new(nodes: Vec<Node>) -> Self {
        Self {
            nodes: RwLock::new(nodes),
        }
    }

    pub fn set(&self, nodes: Vec<Node>) {
        *self.nodes.write() = nodes;
    }
}

#[async_trait]
impl ClusterDiscovery for StaticDiscovery {
    async fn nodes(&self) -> Result<Vec<Node>, CodeError> {
        Ok(self.nodes.read().clone())
    }
}
