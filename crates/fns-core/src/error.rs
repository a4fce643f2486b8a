//! The error taxonomy shared by every component of the runtime (spec §7).
//!
//! `CodeError` is the single type that crosses service/fn boundaries, gets
//! serialized into HTTP response bodies, and drives status-code selection.
//! It intentionally does not layer `Impl`/`Domain`/`Core` the way the
//! teacher's `spark-core::error` module does — spec §7 only asks for one
//! flat taxonomy, so the extra layer would be unused ceremony.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// The stable, finite set of error kinds the runtime ever produces.
///
/// Each variant maps to exactly one HTTP status (see [`ErrorKind::status`]).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    Unavailable,
    Timeout,
    Overload,
    TooEarly,
    NotAcceptable,
    Warning,
    Forbidden,
    Unauthorized,
}

impl ErrorKind {
    /// HTTP status this kind is rendered as, per spec §6/§7.
    pub fn status(self) -> u16 {
        match self {
            ErrorKind::NotFound => 404,
            ErrorKind::Unavailable => 503,
            ErrorKind::Timeout => 408,
            ErrorKind::Overload => 503,
            ErrorKind::TooEarly => 425,
            ErrorKind::NotAcceptable => 406,
            ErrorKind::Warning => 555,
            ErrorKind::Forbidden => 403,
            ErrorKind::Unauthorized => 401,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ErrorKind::NotFound => "NotFound",
            ErrorKind::Unavailable => "Unavailable",
            ErrorKind::Timeout => "Timeout",
            ErrorKind::Overload => "Overload",
            ErrorKind::TooEarly => "TooEarly",
            ErrorKind::NotAcceptable => "NotAcceptable",
            ErrorKind::Warning => "Warning",
            ErrorKind::Forbidden => "Forbidden",
            ErrorKind::Unauthorized => "Unauthorized",
        }
    }
}

/// Opaque, cloneable cause chain link. Boxed so `CodeError` stays `Clone`
/// without forcing every upstream error type to be `Clone` itself.
#[derive(Clone)]
struct Cause(Arc<dyn std::error::Error + Send + Sync + 'static>);

impl fmt::Debug for Cause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

/// `CodeError` — the `{id, code, name, message, meta, stacktrace, cause}`
/// shape from spec §7. `stacktrace` is represented implicitly via the
/// `cause` chain plus `tracing`'s span context rather than a captured
/// backtrace string; FNS runs with `RUST_LOG`-driven structured logs, not
/// printed stack traces, matching the ambient logging stack in `SPEC_FULL.md`.
#[derive(Clone, Debug)]
pub struct CodeError {
    id: String,
    kind: ErrorKind,
    message: Cow<'static, str>,
    meta: BTreeMap<String, String>,
    cause: Option<Cause>,
}

impl CodeError {
    pub fn new(kind: ErrorKind, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            message: message.into(),
            meta: BTreeMap::new(),
            cause: None,
        }
    }

    pub fn not_found(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn unavailable(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::Unavailable, message)
    }

    pub fn timeout(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    pub fn overload(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::Overload, message)
    }

    pub fn too_early(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::TooEarly, message)
    }

    pub fn warning(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::Warning, message)
    }

    pub fn forbidden(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::Forbidden, message)
    }

    pub fn unauthorized(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::Unauthorized, message)
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    /// Enrich with the `service`/`fn` metadata C7/C8 require on every error
    /// that crosses a dispatch boundary.
    pub fn with_call_site(self, service: &str, fn_name: &str) -> Self {
        self.with_meta("service", service).with_meta("fn", fn_name)
    }

    pub fn with_cause(mut self, cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Cause(Arc::new(cause)));
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn meta(&self) -> &BTreeMap<String, String> {
        &self.meta
    }

    pub fn status(&self) -> u16 {
        self.kind.status()
    }

    pub fn cause(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause.as_ref().map(|c| c.0.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl fmt::Display for CodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.name(), self.message)
    }
}

impl std::error::Error for CodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause()
    }
}

/// Wire shape of `CodeError`, matching spec §6's "every non-2xx response
/// carries a JSON body decodable into CodeError".
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct CodeErrorBody {
    pub id: String,
    pub code: String,
    pub name: String,
    pub message: String,
    #[serde(default)]
    pub meta: BTreeMap<String, String>,
}

impl From<&CodeError> for CodeErrorBody {
    fn from(err: &CodeError) -> Self {
        Self {
            id: err.id.clone(),
            code: err.kind.name().to_ascii_lowercase(),
            name: err.kind.name().to_string(),
            message: err.message.to_string(),
            meta: err.meta.clone(),
        }
    }
}

pub type Result<T, E = CodeError> = std::result::Result<T, E>;
