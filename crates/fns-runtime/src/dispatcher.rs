//! The one place that decides whether a `(service, fn)` call is served
//! locally or forwarded to a peer (spec §4.7/§4.8), grounded on
//! `spark-core::pipeline::PipelineFactory` + the "a router selects a
//! service" shape of `spark-router`'s `DynRouter`.

use std::sync::Arc;

use dashmap::DashMap;
use fns_cluster::Registrations;
use fns_core::{CallContext, CodeError, Document, Endpoint, Request};

use crate::cache_control::CacheStore;
use crate::fn_task::LocalEndpoint;
use crate::registration_task::RemoteEndpoint;
use crate::stats::Stats;

#[derive(Clone)]
pub struct Dispatcher {
    locals: Arc<DashMap<String, Arc<LocalEndpoint>>>,
    remotes: Registrations,
    cache: Option<CacheStore>,
    stats: Arc<Stats>,
}

impl Dispatcher {
    pub fn new(remotes: Registrations, cache: Option<CacheStore>, stats: Arc<Stats>) -> Self {
        Self {
            locals: Arc::new(DashMap::new()),
            remotes,
            cache,
            stats,
        }
    }

    pub fn register_local(&self, endpoint: Arc<LocalEndpoint>) {
        self.locals.insert(endpoint.name().to_string(), endpoint);
    }

    pub fn local_documents(&self) -> Vec<Document> {
        let mut docs: Vec<_> = self.locals.iter().map(|e| e.value().document()).collect();
        docs.sort_by(|a, b| a.name.cmp(&b.name));
        docs
    }

    pub fn local_service_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.locals.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Route `req` to a local service if one is registered under its
    /// name, otherwise to a registration chosen from the ring, honoring
    /// `req.accepted_versions()`.
    pub async fn dispatch(
        &self,
        ctx: &CallContext,
        req: &Request,
    ) -> Result<serde_json::Value, CodeError> {
        if let Some(local) = self.locals.get(req.service()) {
            return local.value().request(ctx, req).await;
        }

        if let Some(registration) = self.remotes.get(req.service(), req.accepted_versions()) {
            let endpoint =
                RemoteEndpoint::new(registration, self.cache.clone(), self.stats.clone());
            return endpoint.request(ctx, req).await;
        }

        Err(CodeError::not_found("no endpoint for service")
            .with_meta("service", req.service())
            .with_meta("fn", req.fn_name()))
    }
}
