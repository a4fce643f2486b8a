//! Thin process entrypoint: install logging, assemble an [`Application`]
//! from environment-derived settings, bind a listener, serve until drained.

use std::sync::Arc;

use fns_hosting::{Application, ApplicationSettings, StaticDiscovery};

fn settings_from_env() -> ApplicationSettings {
    let mut settings = ApplicationSettings::default();
    if let Ok(name) = std::env::var("FNS_NODE_NAME") {
        settings.node_name = name;
    }
    if let Ok(address) = std::env::var("FNS_NODE_ADDRESS") {
        settings.address = address;
    }
    if let Ok(secret) = std::env::var("FNS_CLUSTER_SECRET") {
        settings.cluster_signing_secret = secret.into_bytes();
    }
    settings
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    fns_hosting::telemetry::install();

    let settings = settings_from_env();
    let bind_addr = std::env::var("FNS_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

    // No external discovery source is wired by default; an embedder
    // pointing this at a real cluster swaps this for its own
    // `ClusterDiscovery` (gossip, DNS, a registry service).
    let discovery = Arc::new(StaticDiscovery::new(Vec::new()));
    let app = Application::new(settings, discovery);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(address = %bind_addr, "fns-node listening");
    app.serve(listener).await
}
