use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Mutable key→bytes bag propagated across nested/remote calls (spec §3, §GLOSSARY).
#[derive(Clone, Default)]
pub struct Trunk(Arc<RwLock<BTreeMap<String, Vec<u8>>>>);

impl Trunk {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.0.read().get(key).cloned()
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<Vec<u8>>) {
        self.0.write().insert(key.into(), value.into());
    }

    pub fn remove(&self, key: &str) {
        self.0.write().remove(key);
    }

    pub fn snapshot(&self) -> BTreeMap<String, Vec<u8>> {
        self.0.read().clone()
    }

    /// Merge entries from a remote response back onto this trunk (spec §4.8:
    /// "merging trunk entries"). Last-writer-wins per key.
    pub fn merge(&self, other: &BTreeMap<String, Vec<u8>>) {
        let mut guard = self.0.write();
        for (k, v) in other {
            guard.insert(k.clone(), v.clone());
        }
    }

    pub fn deep_clone(&self) -> Self {
        Self(Arc::new(RwLock::new(self.0.read().clone())))
    }
}
