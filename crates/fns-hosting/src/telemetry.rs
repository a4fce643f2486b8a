//! Process-wide logging installation (spec `SPEC_FULL.md` §4.0: grounded on
//! `spark-otel::facade`'s "one install call, swap the exporter later" shape).
//!
//! `install()` wires an `EnvFilter` + `fmt` layer over `tracing`; every
//! `fns-*` crate already logs through `tracing`, so this is the only place
//! a subscriber is installed. Swapping the `fmt` layer for an OTLP
//! exporter (`tracing-opentelemetry` + `opentelemetry-sdk`, both already in
//! the workspace dependency table) is a one-line change left to the
//! embedding binary — the spec's Non-goals exclude prescribing an exporter,
//! not this integration point.

use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info";

/// Installs the process-wide `tracing` subscriber. Call once, near the top
/// of `main`. Honors `RUST_LOG`, falling back to [`DEFAULT_FILTER`].
pub fn install() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let registry = tracing_subscriber::registry().with(filter).with(fmt::layer());
    if registry.try_init().is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}
