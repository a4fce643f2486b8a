//! `fns-cluster` — registrations, the per-service ring, and the cluster
//! discovery/membership loop (spec §4.9/§4.10, C9/C10).

pub mod discovery;
pub mod membership;
pub mod registration;
pub mod ring;
pub mod signer;

pub use discovery::{fetch_documents, ClusterDiscovery};
pub use membership::{ClusterLoop, ClusterLoopSettings};
pub use registration::{Registration, TimedCounter};
pub use ring::Registrations;
pub use signer::{ClusterSigner, SharedSecretSigner};
