//! Cluster membership discovery contract (spec §4.10, C10), grounded on
//! `spark-core::cluster::discovery::ServiceDiscovery`.

use async_trait::async_trait;
use fns_core::{CodeError, Document, Node};
use std::time::Duration;

/// Supplies the current set of cluster nodes. Implementations might poll a
/// gossip protocol, a registry service, or a static config file; the
/// runtime only needs the node list.
#[async_trait]
pub trait ClusterDiscovery: Send + Sync {
    async fn nodes(&self) -> Result<Vec<Node>, CodeError>;
}

const DOCUMENT_FETCH_MAX_ATTEMPTS: u32 = 5;
const DOCUMENT_FETCH_RETRY_DELAY: Duration = Duration::from_secs(1);

/// `GET /services/documents` against a peer, retrying on `425 Too Early`
/// up to 5 times with a 1 s delay (spec §4.10).
pub async fn fetch_documents(
    client: &reqwest::Client,
    address: &str,
) -> Result<Vec<Document>, CodeError> {
    let url = format!("{}/services/documents", address.trim_end_matches('/'));

    for attempt in 1..=DOCUMENT_FETCH_MAX_ATTEMPTS {
        let response = client
            .get(&url)
            .send()
            .await
            .map_err(|e| CodeError::warning("document fetch failed").with_cause(e))?;

        if response.status().as_u16() == 425 {
            if attempt == DOCUMENT_FETCH_MAX_ATTEMPTS {
                return Err(CodeError::too_early("peer not ready").with_meta("address", address));
            }
            tokio::time::sleep(DOCUMENT_FETCH_RETRY_DELAY).await;
            continue;
        }

        if !response.status().is_success() {
            return Err(CodeError::unavailable("peer returned non-2xx for documents")
                .with_meta("status", response.status().as_str()));
        }

        return response
            .json::<Vec<Document>>()
            .await
            .map_err(|e| CodeError::warning("malformed documents payload").with_cause(e));
    }

    Err(CodeError::too_early("peer not ready").with_meta("address", address))
}
