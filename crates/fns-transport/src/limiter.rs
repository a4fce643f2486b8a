//! Per-device token bucket (spec §4.11: "Limiter middleware — token bucket
//! per deviceId: `Take` before next, `Repay` on return; exceeded ⇒ `429`
//! with `Retry-After`"), grounded on `spark-middleware`'s metrics-style
//! per-key counter map.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;

#[derive(Clone, Copy, Debug)]
pub struct LimiterSettings {
    pub capacity: u32,
    pub refill_per_second: u32,
    pub retry_after_seconds: u64,
}

impl Default for LimiterSettings {
    fn default() -> Self {
        Self {
            capacity: 50,
            refill_per_second: 50,
            retry_after_seconds: 1,
        }
    }
}

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// A `Take`/`Repay` token bucket keyed by device id. `Take` both checks and
/// debits atomically so concurrent callers never oversubscribe the bucket;
/// `Repay` is invoked once the request completes to give the token back,
/// matching the teacher's acquire/release pairing for bounded resources.
pub struct Limiter {
    settings: LimiterSettings,
    buckets: DashMap<String, Mutex<Bucket>>,
}

impl Limiter {
    pub fn new(settings: LimiterSettings) -> Self {
        Self {
            settings,
            buckets: DashMap::new(),
        }
    }

    fn refill(&self, bucket: &mut Bucket) {
        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        let refill = elapsed * self.settings.refill_per_second as f64;
        bucket.tokens = (bucket.tokens + refill).min(self.settings.capacity as f64);
        bucket.last_refill = now;
    }

    /// Attempts to take one token for `device_id`. Returns `Ok(())` if
    /// admitted, or the `Retry-After` duration to report if exhausted.
    pub fn take(&self, device_id: &str) -> Result<(), Duration> {
        let entry = self.buckets.entry(device_id.to_string()).or_insert_with(|| {
            Mutex::new(Bucket {
                tokens: self.settings.capacity as f64,
                last_refill: Instant::now(),
            })
        });
        let mut bucket = entry.lock();
        self.refill(&mut bucket);
        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            Ok(())
        } else {
            Err(Duration::from_secs(self.settings.retry_after_seconds))
        }
    }

    /// Returns a token to `device_id`'s bucket once its request completes.
    pub fn repay(&self, device_id: &str) {
        if let Some(entry) = self.buckets.get(device_id) {
            let mut bucket = entry.lock();
            bucket.tokens = (bucket.tokens + 1.0).min(self.settings.capacity as f64);
        }
    }
}

pub type SharedLimiter = Arc<Limiter>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhausting_the_bucket_reports_retry_after() {
        let limiter = Limiter::new(LimiterSettings {
            capacity: 2,
            refill_per_second: 0,
            retry_after_seconds: 3,
        });
        assert!(limiter.take("dev-1").is_ok());
        assert!(limiter.take("dev-1").is_ok());
        assert_eq!(limiter.take("dev-1"), Err(Duration::from_secs(3)));

        limiter.repay("dev-1");
        assert!(limiter.take("dev-1").is_ok());
    }
}
