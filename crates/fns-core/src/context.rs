//! Cancellation, deadlines and the ambient `CallContext` request chaining
//! described in spec §3/§4.1, grounded on `spark-core::contract::{Cancellation,
//! Deadline, CallContext}`.

use crate::request::Request;
use dashmap::DashMap;
use std::any::{Any, TypeId};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// Per-context typed extension storage, grounded on
/// `spark-core::pipeline::ExtensionsMap`: lets collaborators (e.g.
/// cache-control, spec §4.5) attach mutable state to a `CallContext`
/// without `fns-core` knowing their concrete types.
#[derive(Clone, Default)]
pub struct Extensions(Arc<DashMap<TypeId, Arc<dyn Any + Send + Sync>>>);

impl Extensions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<T: Send + Sync + 'static>(&self, value: T) {
        self.0.insert(TypeId::of::<T>(), Arc::new(value));
    }

    pub fn get<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        let entry = self.0.get(&TypeId::of::<T>())?;
        entry.value().clone().downcast::<T>().ok()
    }

    pub fn get_or_insert_with<T: Send + Sync + 'static>(&self, default: impl FnOnce() -> T) -> Arc<T> {
        let entry = self
            .0
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Arc::new(default()) as Arc<dyn Any + Send + Sync>);
        entry
            .value()
            .clone()
            .downcast::<T>()
            .expect("type-keyed entry holds a mismatched type")
    }
}

/// Hierarchical cancellation signal. Cancelling a parent cancels every
/// child; cancelling a child never affects its parent.
#[derive(Clone)]
pub struct Cancellation {
    tx: std::sync::Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl Default for Cancellation {
    fn default() -> Self {
        Self::new()
    }
}

impl Cancellation {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: std::sync::Arc::new(tx),
            rx,
        }
    }

    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// A child token cancelled whenever `self` is cancelled, independently
    /// cancellable on its own.
    pub fn child(&self) -> Self {
        let child = Self::new();
        let mut parent_rx = self.rx.clone();
        let child_tx = child.tx.clone();
        if *parent_rx.borrow() {
            let _ = child_tx.send(true);
            return child;
        }
        tokio::spawn(async move {
            if parent_rx.changed().await.is_ok() && *parent_rx.borrow() {
                let _ = child_tx.send(true);
            }
        });
        child
    }

    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        while !*rx.borrow() {
            if rx.changed().await.is_err() {
                break;
            }
        }
    }
}

/// An optional point in time after which a call should be abandoned.
#[derive(Clone, Copy, Debug, Default)]
pub struct Deadline(Option<Instant>);

impl Deadline {
    pub fn none() -> Self {
        Self(None)
    }

    pub fn at(instant: Instant) -> Self {
        Self(Some(instant))
    }

    pub fn with_timeout(now: Instant, timeout: Duration) -> Self {
        Self(Some(now + timeout))
    }

    pub fn instant(&self) -> Option<Instant> {
        self.0
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        self.0.is_some_and(|d| now >= d)
    }

    /// The shorter of `self` and `other`, per spec §5: "derived from the
    /// inbound context deadline and the configured handle-timeout
    /// (whichever is sooner)".
    pub fn earliest(self, other: Deadline) -> Deadline {
        match (self.0, other.0) {
            (Some(a), Some(b)) => Deadline(Some(a.min(b))),
            (Some(a), None) => Deadline(Some(a)),
            (None, b) => Deadline(b),
        }
    }

    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        self.0.map(|d| d.saturating_duration_since(now))
    }
}

/// Ambient per-call context threaded through dispatch: carries the previous
/// `Request` (if any, for the inheritance rules of `NewRequest`), the
/// effective deadline, and a cancellation signal.
#[derive(Clone)]
pub struct CallContext {
    request: Option<Request>,
    deadline: Deadline,
    cancellation: Cancellation,
    extensions: Extensions,
}

impl Default for CallContext {
    fn default() -> Self {
        Self::root()
    }
}

impl CallContext {
    /// A context with no inherited request — the entry point for an
    /// external client call.
    pub fn root() -> Self {
        Self {
            request: None,
            deadline: Deadline::none(),
            cancellation: Cancellation::new(),
            extensions: Extensions::new(),
        }
    }

    /// Derive a child context carrying `request` as the now-current one,
    /// used right after a [`Request`] is constructed from this context so
    /// that a nested `NewRequest` call inherits from it in turn. Extensions
    /// are shared with the parent: a fn-side flag like cache-control must
    /// be visible to the middleware that installed it.
    pub fn with_request(&self, request: Request) -> Self {
        Self {
            request: Some(request),
            deadline: self.deadline,
            cancellation: self.cancellation.child(),
            extensions: self.extensions.clone(),
        }
    }

    pub fn with_deadline(&self, deadline: Deadline) -> Self {
        Self {
            request: self.request.clone(),
            deadline: self.deadline.earliest(deadline),
            cancellation: self.cancellation.clone(),
            extensions: self.extensions.clone(),
        }
    }

    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    pub fn request(&self) -> Option<&Request> {
        self.request.as_ref()
    }

    pub fn deadline(&self) -> Deadline {
        self.deadline
    }

    pub fn cancellation(&self) -> &Cancellation {
        &self.cancellation
    }
}
