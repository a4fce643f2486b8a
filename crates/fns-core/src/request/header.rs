use std::collections::BTreeMap;

/// Well-known request header names (spec §6).
pub mod names {
    pub const DEVICE_ID: &str = "x-fns-device-id";
    pub const DEVICE_IP: &str = "x-fns-device-ip";
    pub const REQUEST_ID: &str = "x-fns-request-id";
    pub const REQUEST_TIMEOUT: &str = "x-fns-request-timeout";
    pub const REQUEST_VERSION: &str = "x-fns-request-version";
    pub const REQUEST_INTERNAL_SIGNATURE: &str = "x-fns-request-internal-signature";
    pub const SIGNATURE: &str = "x-fns-signature";
    pub const DEV_MODE: &str = "x-fns-dev-mode";
    pub const IF_NONE_MATCH: &str = "if-none-match";
    pub const ETAG: &str = "etag";
    pub const CACHE_CONTROL: &str = "cache-control";
    pub const HANDLE_LATENCY: &str = "x-fns-handle-latency";
    pub const CACHE_TTL: &str = "x-fns-cache-ttl";
}

/// Multi-valued, case-insensitive header bag.
///
/// Keys are normalized to lower case on insert so lookups never have to
/// guess the caller's casing convention, matching HTTP's own header
/// semantics without pulling in a full HTTP crate at the `fns-core` layer.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Headers(BTreeMap<String, Vec<String>>);

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(name: &str) -> String {
        name.to_ascii_lowercase()
    }

    pub fn insert(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        self.0
            .entry(Self::key(name.as_ref()))
            .or_default()
            .push(value.into());
    }

    pub fn set(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        self.0.insert(Self::key(name.as_ref()), vec![value.into()]);
    }

    pub fn remove(&mut self, name: impl AsRef<str>) {
        self.0.remove(&Self::key(name.as_ref()));
    }

    pub fn get(&self, name: impl AsRef<str>) -> Option<&str> {
        self.0
            .get(&Self::key(name.as_ref()))
            .and_then(|v| v.first())
            .map(|s| s.as_str())
    }

    pub fn get_all(&self, name: impl AsRef<str>) -> &[String] {
        self.0
            .get(&Self::key(name.as_ref()))
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn contains(&self, name: impl AsRef<str>) -> bool {
        self.0.contains_key(&Self::key(name.as_ref()))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Clone the header set for a derived internal request, dropping the
    /// fields that must not propagate across hops (spec §4.1).
    pub fn cloned_for_derived_request(&self) -> Self {
        let mut out = self.clone();
        out.remove(names::REQUEST_VERSION);
        out.remove(names::CACHE_CONTROL);
        out.remove(names::IF_NONE_MATCH);
        out
    }
}
