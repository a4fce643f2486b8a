//! `fns-core` — the dependency-free contract layer every other `fns-*`
//! crate builds on: requests, call context, errors, the shared store, the
//! barrier, the tracer, and the `Service`/`Endpoint` traits application and
//! transport code implement against (spec §3/§4, grounded on
//! `spark-core::lib`'s pub-use surface).

pub mod barrier;
pub mod context;
pub mod endpoint;
pub mod error;
pub mod node;
pub mod request;
pub mod service;
pub mod store;
pub mod tracer;

pub use barrier::Barrier;
pub use context::{CallContext, Cancellation, Deadline, Extensions};
pub use endpoint::Endpoint;
pub use error::{CodeError, CodeErrorBody, ErrorKind};
pub use node::{Document, FnDescriptor, Node, ServiceDescriptor};
pub use request::{names, AcceptedVersions, Attributes, Headers, Request, RequestOptions, Trunk, User, VersionFilter};
pub use service::Service;
pub use store::{LocalStore, Store};
pub use tracer::{LoggingReporter, NoopReporter, Span, SpanExport, TraceReporter};
