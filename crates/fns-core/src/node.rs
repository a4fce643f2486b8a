//! Cluster node identity and the documents a node publishes about its
//! services (spec §3/§4.10), grounded on `spark-core::cluster::discovery`.

use serde::{Deserialize, Serialize};

/// One cluster member's address and metadata, as exchanged by the
/// discovery/membership loop (spec §3: `{id, name, version, address,
/// services}`).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Node {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub version: String,
    pub address: String,
    #[serde(default)]
    pub services: Vec<ServiceDescriptor>,
    #[serde(default)]
    pub launch: Option<u128>,
}

impl Node {
    pub fn new(id: impl Into<String>, name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            version: String::new(),
            address: address.into(),
            services: Vec::new(),
            launch: Some(crate::tracer::unix_millis_now()),
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_services(mut self, services: Vec<ServiceDescriptor>) -> Self {
        self.services = services;
        self
    }
}

/// One service a [`Node`] advertises, spec §3: "A service descriptor
/// carries `{name, document?}`".
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceDescriptor {
    pub name: String,
    #[serde(default)]
    pub document: Option<Document>,
}

/// One `fn` a service exposes, as advertised in its [`Document`].
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct FnDescriptor {
    pub name: String,
    pub readonly: bool,
    pub internal: bool,
    #[serde(default)]
    pub cache_ttl_seconds: Option<u64>,
}

/// A service's self-description: what it's named, which version it runs,
/// what functions it exposes. Exchanged via `GET /services/documents`
/// (spec §4.4, §4.10).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Document {
    pub name: String,
    pub version: String,
    pub internal: bool,
    pub functions: Vec<FnDescriptor>,
}

impl Document {
    pub fn function(&self, name: &str) -> Option<&FnDescriptor> {
        self.functions.iter().find(|f| f.name == name)
    }
}
