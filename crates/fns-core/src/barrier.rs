//! Single-flight request deduplication, spec §4.7, grounded on
//! `spark-core`'s cooperative-initialization idioms (`OnceCell`-style
//! contracts) combined with a `dashmap`-keyed inflight table.

use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::OnceCell;

use crate::error::CodeError;

type Slot = Arc<OnceCell<Result<serde_json::Value, CodeError>>>;

/// Deduplicates concurrent calls that share the same key (typically
/// `xxh64(request.hash() || device_id)`, spec §4.7): the first caller runs
/// `f`, every other caller for the same key awaits its result instead of
/// re-executing it.
#[derive(Clone, Default)]
pub struct Barrier {
    inflight: Arc<DashMap<u64, Slot>>,
}

impl Barrier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` under the barrier keyed by `key`. Returns `(value, shared)`
    /// where `shared` is `true` when this call observed another caller's
    /// in-flight (or just-completed) result rather than running `f` itself.
    pub async fn do_call<F, Fut>(
        &self,
        key: u64,
        f: F,
    ) -> (Result<serde_json::Value, CodeError>, bool)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<serde_json::Value, CodeError>>,
    {
        let slot = self
            .inflight
            .entry(key)
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        let mut leader = false;
        let result = slot
            .get_or_init(|| async {
                leader = true;
                f().await
            })
            .await
            .clone();

        self.inflight.remove_if(key, |_, v| Arc::ptr_eq(v, &slot));
        (result, !leader)
    }

    /// Evict a key without waiting on it, used when a handler wants to
    /// force the next identical call to re-execute (spec §4.7 `Forget`).
    pub fn forget(&self, key: u64) {
        self.inflight.remove(&key);
    }

    pub fn inflight_count(&self) -> usize {
        self.inflight.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn concurrent_identical_calls_execute_once() {
        let barrier = Barrier::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..100 {
            let barrier = barrier.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                barrier
                    .do_call(42, || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                        Ok(serde_json::json!({"ok": true}))
                    })
                    .await
            }));
        }

        for h in handles {
            let (result, _) = h.await.unwrap();
            assert!(result.is_ok());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn distinct_keys_run_independently() {
        let barrier = Barrier::new();
        let (a, a_shared) = barrier
            .do_call(1, || async { Ok(serde_json::json!(1)) })
            .await;
        let (b, b_shared) = barrier
            .do_call(2, || async { Ok(serde_json::json!(2)) })
            .await;
        assert!(a.is_ok() && b.is_ok());
        assert!(!a_shared && !b_shared);
    }
}
