//! Plain, `serde`-deserializable tunables (spec `SPEC_FULL.md` §4.0.2):
//! loading these from a file/env is left to the embedder, matching the
//! spec's Non-goal on configuration *loading*, not on the tunables
//! themselves.

use serde::Deserialize;
use std::time::Duration;

#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(default)]
pub struct RuntimeSettings {
    pub cache_ttl_seconds: u64,
    pub handle_timeout_seconds: u64,
    pub retry_count: u32,
    pub retry_backoff_seconds: u64,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            cache_ttl_seconds: 30 * 60,
            handle_timeout_seconds: 30,
            retry_count: 5,
            retry_backoff_seconds: 1,
        }
    }
}

impl RuntimeSettings {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_seconds)
    }

    pub fn handle_timeout(&self) -> Duration {
        Duration::from_secs(self.handle_timeout_seconds)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_secs(self.retry_backoff_seconds)
    }
}
