//! The `Request` value threaded through every dispatch, spec §3/§4.1.

mod header;
mod trunk;
mod user;
mod version;

pub use header::{names, Headers};
pub use trunk::Trunk;
pub use user::{Attributes, User};
pub use version::{AcceptedVersions, VersionFilter};

use crate::context::CallContext;
use std::sync::OnceLock;
use uuid::Uuid;

/// Options accepted by [`Request::new`], mirroring the teacher's functional
/// option pattern (`spark_core::contract::RequestOption`).
#[derive(Default)]
pub struct RequestOptions {
    header: Option<Headers>,
    user: Option<User>,
    trunk: Option<Trunk>,
    internal: Option<bool>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn header(mut self, header: Headers) -> Self {
        self.header = Some(header);
        self
    }

    pub fn user(mut self, user: User) -> Self {
        self.user = Some(user);
        self
    }

    pub fn trunk(mut self, trunk: Trunk) -> Self {
        self.trunk = Some(trunk);
        self
    }

    pub fn internal(mut self, internal: bool) -> Self {
        self.internal = Some(internal);
        self
    }
}

/// A single `(service, fn, argument)` invocation plus everything that rides
/// along with it: identity, header, user, trunk and accepted-version
/// constraints (spec §3).
#[derive(Clone)]
pub struct Request {
    id: String,
    header: Headers,
    service: String,
    fn_name: String,
    argument: serde_json::Value,
    internal: bool,
    user: User,
    trunk: Trunk,
    accepted_versions: AcceptedVersions,
    hash: std::sync::Arc<OnceLock<u64>>,
}

impl Request {
    /// Build a request against `ctx`, applying the inheritance rules of
    /// spec §4.1: if `ctx` already carries a request, `id`, a
    /// version/cache-control-stripped clone of its header, its user and
    /// its trunk are inherited unless explicitly overridden, and
    /// `internal` becomes `true` automatically. Otherwise a fresh id is
    /// minted and `internal` defaults to `false`.
    pub fn new(
        ctx: &CallContext,
        service: impl Into<String>,
        fn_name: impl Into<String>,
        argument: serde_json::Value,
        options: RequestOptions,
    ) -> (Self, CallContext) {
        let parent = ctx.request();

        let id = parent
            .map(|p| p.id.clone())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let header = options.header.unwrap_or_else(|| {
            parent
                .map(|p| p.header.cloned_for_derived_request())
                .unwrap_or_default()
        });

        let user = options
            .user
            .unwrap_or_else(|| parent.map(|p| p.user.deep_clone()).unwrap_or_default());

        let trunk = options
            .trunk
            .unwrap_or_else(|| parent.map(|p| p.trunk.deep_clone()).unwrap_or_default());

        let internal = options.internal.unwrap_or(parent.is_some());

        let accepted_versions = parent
            .map(|p| p.accepted_versions.clone())
            .unwrap_or_default();

        let request = Self {
            id,
            header,
            service: service.into(),
            fn_name: fn_name.into(),
            argument,
            internal,
            user,
            trunk,
            accepted_versions,
            hash: std::sync::Arc::new(OnceLock::new()),
        };

        let next_ctx = ctx.with_request(request.clone());
        (request, next_ctx)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn header(&self) -> &Headers {
        &self.header
    }

    pub fn header_mut(&mut self) -> &mut Headers {
        &mut self.header
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn fn_name(&self) -> &str {
        &self.fn_name
    }

    pub fn argument(&self) -> &serde_json::Value {
        &self.argument
    }

    pub fn internal(&self) -> bool {
        self.internal
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    pub fn trunk(&self) -> &Trunk {
        &self.trunk
    }

    pub fn accepted_versions(&self) -> &AcceptedVersions {
        &self.accepted_versions
    }

    pub fn set_accepted_versions(&mut self, versions: AcceptedVersions) {
        self.accepted_versions = versions;
    }

    /// `xxh64("/service/fn" || json(argument))`, memoized. Spec §3's
    /// invariant: identical `(service, fn, argument)` always hashes
    /// identically, which is what the barrier and cache layers key on.
    pub fn hash(&self) -> u64 {
        *self.hash.get_or_init(|| {
            let mut buf = Vec::with_capacity(64);
            buf.push(b'/');
            buf.extend_from_slice(self.service.as_bytes());
            buf.push(b'/');
            buf.extend_from_slice(self.fn_name.as_bytes());
            if let Ok(json) = serde_json::to_vec(&self.argument) {
                buf.extend_from_slice(&json);
            }
            xxhash_rust::xxh64::xxh64(&buf, 0)
        })
    }
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("id", &self.id)
            .field("service", &self.service)
            .field("fn_name", &self.fn_name)
            .field("internal", &self.internal)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_invocations_hash_identically() {
        let ctx = CallContext::root();
        let (a, _) = Request::new(
            &ctx,
            "billing",
            "charge",
            serde_json::json!({"amount": 10}),
            RequestOptions::new(),
        );
        let (b, _) = Request::new(
            &ctx,
            "billing",
            "charge",
            serde_json::json!({"amount": 10}),
            RequestOptions::new(),
        );
        assert_eq!(a.hash(), b.hash());
    }

    #[test]
    fn nested_request_inherits_id_and_becomes_internal() {
        let ctx = CallContext::root();
        let (outer, ctx2) = Request::new(
            &ctx,
            "billing",
            "charge",
            serde_json::json!(null),
            RequestOptions::new(),
        );
        assert!(!outer.internal());

        let (inner, _) = Request::new(
            &ctx2,
            "ledger",
            "record",
            serde_json::json!(null),
            RequestOptions::new(),
        );
        assert_eq!(inner.id(), outer.id());
        assert!(inner.internal());
    }

    #[test]
    fn root_request_gets_fresh_id_and_is_external() {
        let ctx = CallContext::root();
        let (req, _) = Request::new(
            &ctx,
            "billing",
            "charge",
            serde_json::json!(null),
            RequestOptions::new(),
        );
        assert!(!req.internal());
        assert!(!req.id().is_empty());
    }
}
