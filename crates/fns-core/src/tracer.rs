//! Per-request span tree (spec §4.9), grounded on `spark-otel`'s span
//! hierarchy and exported as JSON rather than through `tracing`'s own
//! subscriber so that a trace can ride along in a response trunk entry.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;

/// One node in the trace tree. The parent link is transient (not
/// serialized): a span only serializes its own fields plus its children,
/// matching spec §4.9 ("children are nested by value; the parent pointer
/// is not part of the exported shape").
#[derive(Clone)]
pub struct Span {
    inner: Arc<Mutex<SpanState>>,
}

struct SpanState {
    name: String,
    started_at: SystemTime,
    tags: serde_json::Map<String, serde_json::Value>,
    children: Vec<Span>,
    finished: Option<Duration>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SpanExport {
    pub name: String,
    pub latency_millis: u128,
    pub tags: serde_json::Map<String, serde_json::Value>,
    pub children: Vec<SpanExport>,
}

impl Span {
    pub fn root(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SpanState {
                name: name.into(),
                started_at: SystemTime::now(),
                tags: serde_json::Map::new(),
                children: Vec::new(),
                finished: None,
            })),
        }
    }

    /// Start a child span, auto-parented under `self`.
    pub fn child(&self, name: impl Into<String>) -> Span {
        let child = Span::root(name);
        self.inner.lock().children.push(child.clone());
        child
    }

    pub fn tag(&self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.inner.lock().tags.insert(key.into(), value.into());
    }

    /// Graft an already-exported subtree (e.g. a remote peer's span,
    /// spec §4.8: "append remote span subtree to the local span") as a
    /// finished child of this span.
    pub fn adopt(&self, export: SpanExport) {
        self.inner.lock().children.push(Span::from_export(export));
    }

    fn from_export(export: SpanExport) -> Span {
        let children = export
            .children
            .into_iter()
            .map(Span::from_export)
            .collect();
        Span {
            inner: Arc::new(Mutex::new(SpanState {
                name: export.name,
                started_at: SystemTime::now(),
                tags: export.tags,
                children,
                finished: Some(Duration::from_millis(export.latency_millis as u64)),
            })),
        }
    }

    pub fn finish(&self) {
        let mut state = self.inner.lock();
        if state.finished.is_none() {
            state.finished = state.started_at.elapsed().ok();
        }
    }

    pub fn export(&self) -> SpanExport {
        let state = self.inner.lock();
        let latency = state
            .finished
            .or_else(|| state.started_at.elapsed().ok())
            .unwrap_or_default();
        SpanExport {
            name: state.name.clone(),
            latency_millis: latency.as_millis(),
            tags: state.tags.clone(),
            children: state.children.iter().map(Span::export).collect(),
        }
    }
}

/// Fire-and-forget sink a finished root span is reported to (spec §4.9:
/// "tracings.report"). The default no-op sink lets callers wire their own
/// collector without fns-core depending on a transport crate.
pub trait TraceReporter: Send + Sync {
    fn report(&self, span: SpanExport);
}

pub struct NoopReporter;

impl TraceReporter for NoopReporter {
    fn report(&self, _span: SpanExport) {}
}

pub struct LoggingReporter;

impl TraceReporter for LoggingReporter {
    fn report(&self, span: SpanExport) {
        tracing::debug!(
            target: "fns.tracer",
            name = %span.name,
            latency_millis = span.latency_millis,
            "span reported"
        );
    }
}

/// Spawns reporting onto the runtime so the caller's hot path never waits
/// on the sink.
pub fn report_async(reporter: Arc<dyn TraceReporter>, span: Span) {
    tokio::spawn(async move {
        span.finish();
        reporter.report(span.export());
    });
}

pub fn unix_millis_now() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn children_nest_by_value_without_parent_pointers() {
        let root = Span::root("handle");
        let child = root.child("barrier");
        child.tag("hit", true);
        root.finish();

        let exported = root.export();
        assert_eq!(exported.name, "handle");
        assert_eq!(exported.children.len(), 1);
        assert_eq!(exported.children[0].name, "barrier");
        assert_eq!(exported.children[0].tags.get("hit"), Some(&serde_json::json!(true)));
    }
}
