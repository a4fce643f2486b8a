//! One `(peer-node-id, service-name)` entry, spec §3/§4.9, grounded on
//! `spark-core::cluster::membership`'s peer bookkeeping.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use fns_core::Document;
use parking_lot::Mutex;

use crate::signer::ClusterSigner;

/// Sliding-window error counter: a registration is unhealthy once more than
/// `threshold` errors land inside `window` (spec §3: "`errs.Value() > 10`
/// in its sliding window, default 10 s").
pub struct TimedCounter {
    window: Duration,
    threshold: u64,
    events: Mutex<Vec<Instant>>,
}

impl TimedCounter {
    pub fn new(window: Duration, threshold: u64) -> Self {
        Self {
            window,
            threshold,
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn record(&self) {
        let now = Instant::now();
        let mut events = self.events.lock();
        events.push(now);
        let window = self.window;
        events.retain(|t| now.duration_since(*t) <= window);
    }

    pub fn value(&self) -> u64 {
        let now = Instant::now();
        let window = self.window;
        let mut events = self.events.lock();
        events.retain(|t| now.duration_since(*t) <= window);
        events.len() as u64
    }

    pub fn is_over_threshold(&self) -> bool {
        self.value() > self.threshold
    }
}

impl Default for TimedCounter {
    fn default() -> Self {
        Self::new(Duration::from_secs(10), 10)
    }
}

/// A remote `Endpoint` target for one service hosted by one peer.
pub struct Registration {
    pub host_id: String,
    pub id: String,
    pub version: String,
    pub address: String,
    pub name: String,
    pub client: reqwest::Client,
    pub timeout: Duration,
    pub signer: Arc<dyn ClusterSigner>,
    closed: AtomicBool,
    errs: TimedCounter,
    document: Mutex<Document>,
}

impl Registration {
    pub fn new(
        host_id: impl Into<String>,
        version: impl Into<String>,
        address: impl Into<String>,
        document: Document,
        client: reqwest::Client,
        timeout: Duration,
        signer: Arc<dyn ClusterSigner>,
    ) -> Arc<Self> {
        let host_id = host_id.into();
        let name = document.name.clone();
        Arc::new(Self {
            id: format!("{host_id}/{name}"),
            host_id,
            version: version.into(),
            address: address.into(),
            name,
            client,
            timeout,
            signer,
            closed: AtomicBool::new(false),
            errs: TimedCounter::default(),
            document: Mutex::new(document),
        })
    }

    pub fn document(&self) -> Document {
        self.document.lock().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn mark_closed(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub fn record_error(&self) {
        self.errs.record();
    }

    pub fn is_unhealthy(&self) -> bool {
        self.errs.is_over_threshold()
    }

    pub fn endpoint_url(&self, service: &str, fn_name: &str) -> String {
        format!("{}/{}/{}", self.address.trim_end_matches('/'), service, fn_name)
    }
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("id", &self.id)
            .field("version", &self.version)
            .field("closed", &self.is_closed())
            .field("unhealthy", &self.is_unhealthy())
            .finish()
    }
}
