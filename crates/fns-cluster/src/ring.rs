//! Per-service ring of [`Registration`]s and the process-wide registry
//! (spec §4.9, C9), grounded on `spark-core::cluster::membership` and the
//! design note favoring an index-based ring over an intrusive linked list.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use fns_core::AcceptedVersions;
use parking_lot::RwLock;

use crate::registration::Registration;

/// An index-based round-robin ring; removal is O(n), acceptable because
/// cluster sizes stay far below 1000 (spec §9 design note).
#[derive(Default)]
pub struct Ring {
    entries: RwLock<Vec<Arc<Registration>>>,
    cursor: AtomicUsize,
}

impl Ring {
    fn push(&self, registration: Arc<Registration>) {
        self.entries.write().push(registration);
    }

    fn remove(&self, id: &str) {
        self.entries.write().retain(|r| r.id != id);
    }

    fn get_exact(&self, id: &str) -> Option<Arc<Registration>> {
        let mut entries = self.entries.write();
        let idx = entries.iter().position(|r| r.id == id)?;
        if entries[idx].is_closed() {
            entries.remove(idx);
            return None;
        }
        if entries[idx].is_unhealthy() {
            return None;
        }
        Some(entries[idx].clone())
    }

    /// Round-robin scan, skipping closed (removing them) and unhealthy
    /// entries, accepting the first whose version the filter admits.
    fn next(&self, service: &str, versions: &AcceptedVersions) -> Option<Arc<Registration>> {
        loop {
            let len = {
                let entries = self.entries.read();
                entries.len()
            };
            if len == 0 {
                return None;
            }

            // One cursor advance per call, not per scan step — otherwise a
            // skipped (unhealthy/closed) entry perturbs which entry the
            // *next* call starts from, breaking round-robin fairness.
            let start = self.cursor.fetch_add(1, Ordering::Relaxed);

            let mut closed_idx = None;
            let mut found = None;
            {
                let entries = self.entries.read();
                for step in 0..len {
                    let idx = (start + step) % len;
                    let candidate = &entries[idx];
                    if candidate.is_closed() {
                        closed_idx = Some(idx);
                        break;
                    }
                    if candidate.is_unhealthy() {
                        continue;
                    }
                    if versions.accept(service, &candidate.version) {
                        found = Some(candidate.clone());
                        break;
                    }
                }
            }

            if let Some(idx) = closed_idx {
                self.entries.write().remove(idx);
                continue;
            }
            return found;
        }
    }

    fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn snapshot(&self) -> Vec<Arc<Registration>> {
        let mut out = self.entries.read().clone();
        out.sort_by(|a, b| a.version.cmp(&b.version));
        out
    }
}

/// Thread-safe map from service name to its ring (spec §3).
#[derive(Clone, Default)]
pub struct Registrations {
    rings: Arc<DashMap<String, Arc<Ring>>>,
}

impl Registrations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, registration: Arc<Registration>) {
        let ring = self
            .rings
            .entry(registration.name.clone())
            .or_insert_with(|| Arc::new(Ring::default()))
            .clone();
        ring.push(registration);
    }

    pub fn remove(&self, id: &str) {
        let mut emptied = Vec::new();
        for entry in self.rings.iter() {
            entry.value().remove(id);
            if entry.value().is_empty() {
                emptied.push(entry.key().clone());
            }
        }
        for name in emptied {
            self.rings.remove_if(&name, |_, ring| ring.is_empty());
        }
    }

    pub fn get_exact(&self, name: &str, id: &str) -> Option<Arc<Registration>> {
        self.rings.get(name)?.get_exact(id)
    }

    pub fn get(&self, name: &str, versions: &AcceptedVersions) -> Option<Arc<Registration>> {
        self.rings.get(name)?.next(name, versions)
    }

    pub fn list(&self) -> Vec<(String, Vec<Arc<Registration>>)> {
        let mut out: Vec<_> = self
            .rings
            .iter()
            .filter(|entry| !entry.value().is_empty())
            .map(|entry| (entry.key().clone(), entry.value().snapshot()))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fns_core::AcceptedVersions;
    use std::time::Duration;

    fn registration(host: &str, service: &str) -> Arc<Registration> {
        registration_versioned(host, service, "1.0.0")
    }

    fn registration_versioned(host: &str, service: &str, version: &str) -> Arc<Registration> {
        let document = fns_core::Document {
            name: service.to_string(),
            version: version.to_string(),
            internal: false,
            functions: vec![],
        };
        Registration::new(
            host,
            version,
            format!("http://{host}"),
            document,
            reqwest::Client::new(),
            Duration::from_secs(5),
            Arc::new(crate::signer::SharedSecretSigner::new(b"test-secret".to_vec())),
        )
    }

    #[test]
    fn round_robin_visits_each_entry_once_per_cycle() {
        let registrations = Registrations::new();
        for host in ["a", "b", "c"] {
            registrations.add(registration(host, "billing"));
        }

        let mut seen = std::collections::HashSet::new();
        for _ in 0..3 {
            let r = registrations
                .get("billing", &AcceptedVersions::default())
                .unwrap();
            seen.insert(r.host_id.clone());
        }
        assert_eq!(seen.len(), 3);
    }

    /// Spec §8 scenario 3 ("cluster rotation"): 3 peers hosting the same
    /// service split 6 calls 2 apiece; once one peer's error window trips
    /// unhealthy, the next 5 calls skip it entirely.
    #[test]
    fn unhealthy_peer_is_skipped_until_it_recovers() {
        let registrations = Registrations::new();
        let peers: Vec<_> = ["a", "b", "c"]
            .into_iter()
            .map(|host| registration(host, "billing"))
            .collect();
        for peer in &peers {
            registrations.add(peer.clone());
        }

        let mut counts = std::collections::HashMap::new();
        for _ in 0..6 {
            let r = registrations
                .get("billing", &AcceptedVersions::default())
                .unwrap();
            *counts.entry(r.host_id.clone()).or_insert(0) += 1;
        }
        assert_eq!(counts["a"], 2);
        assert_eq!(counts["b"], 2);
        assert_eq!(counts["c"], 2);

        // Default threshold is 10 errors in the window; 11 trips unhealthy.
        for _ in 0..11 {
            peers[1].record_error();
        }
        assert!(peers[1].is_unhealthy());

        let mut counts = std::collections::HashMap::new();
        for _ in 0..5 {
            let r = registrations
                .get("billing", &AcceptedVersions::default())
                .unwrap();
            *counts.entry(r.host_id.clone()).or_insert(0) += 1;
        }
        // Spec §8 scenario 3: 5 calls over 2 healthy peers split as evenly
        // as possible (3/2 either way); the unhealthy peer sees none.
        assert_eq!(*counts.get("b").unwrap_or(&0), 0);
        let a_count = *counts.get("a").unwrap_or(&0);
        let c_count = *counts.get("c").unwrap_or(&0);
        assert_eq!(a_count + c_count, 5);
        assert!((a_count as i64 - c_count as i64).abs() <= 1);
    }

    /// Spec §8 scenario 4 ("version filter"): a half-open range routes to
    /// the older peer, an exact filter routes to the newer one, and a
    /// version neither peer carries matches nothing.
    #[test]
    fn version_filter_selects_the_matching_peer() {
        let registrations = Registrations::new();
        registrations.add(registration_versioned("peer-a", "billing", "1.0.0"));
        registrations.add(registration_versioned("peer-b", "billing", "2.0.0"));

        let range = AcceptedVersions::parse(&["billing=1.0.0:2.0.0".into()]).unwrap();
        let r = registrations.get("billing", &range).unwrap();
        assert_eq!(r.host_id, "peer-a");

        let exact = AcceptedVersions::parse(&["billing=2.0.0".into()]).unwrap();
        let r = registrations.get("billing", &exact).unwrap();
        assert_eq!(r.host_id, "peer-b");

        let none = AcceptedVersions::parse(&["billing=3.0.0".into()]).unwrap();
        assert!(registrations.get("billing", &none).is_none());
    }

    #[test]
    fn removing_last_entry_purges_the_ring() {
        let registrations = Registrations::new();
        let r = registration("a", "billing");
        let id = r.id.clone();
        registrations.add(r);
        registrations.remove(&id);
        assert!(registrations.get("billing", &AcceptedVersions::default()).is_none());
    }
}
