//! Request rate limiting.
//!
//! [`StoreRateLimiter`] counts hits in fixed windows kept in the shared store,
//! so every instance sees the same counts. [`LocalRateLimiter`] keeps token
//! buckets in process memory; with more than one instance each gets its own
//! allowance.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::time::Instant;

use solefeed_store::{Store, StoreError, UsageStore};

/// Decides whether a keyed request may proceed.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Count one request against `key`. Returns `false` if over the limit.
    async fn check(&self, key: &str) -> Result<bool, StoreError>;
}

/// Fixed-window limiter backed by the store.
pub struct StoreRateLimiter {
    store: Arc<dyn Store>,
    max_requests: u32,
    window_seconds: i64,
}

impl StoreRateLimiter {
    /// Allow `max_requests` per `window` for each key.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, max_requests: u32, window: Duration) -> Self {
        Self {
            store,
            max_requests,
            window_seconds: i64::try_from(window.as_secs()).unwrap_or(i64::MAX).max(1),
        }
    }

    fn window_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let ts = now.timestamp();
        DateTime::<Utc>::from_timestamp(ts - ts.rem_euclid(self.window_seconds), 0).unwrap_or(now)
    }
}

#[async_trait]
impl RateLimiter for StoreRateLimiter {
    async fn check(&self, key: &str) -> Result<bool, StoreError> {
        let hits = self
            .store
            .hit_rate_window(key, self.window_start(Utc::now()))
            .await?;
        Ok(hits <= self.max_requests)
    }
}

#[derive(Debug)]
struct Bucket {
    tokens: u32,
    last_refill: Instant,
}

#[derive(Debug)]
struct Buckets {
    by_key: HashMap<String, Bucket>,
    last_sweep: Instant,
}

/// Per-instance token-bucket limiter.
///
/// A bucket idle for a whole refill interval would be full on its next use,
/// so such buckets are dropped once per interval to keep the map bounded by
/// the keys seen recently.
#[derive(Debug)]
pub struct LocalRateLimiter {
    max_tokens: u32,
    refill_interval: Duration,
    buckets: Mutex<Buckets>,
}

impl LocalRateLimiter {
    /// Allow `max_requests` per `interval` for each key.
    #[must_use]
    pub fn new(max_requests: u32, interval: Duration) -> Self {
        Self {
            max_tokens: max_requests,
            refill_interval: interval,
            buckets: Mutex::new(Buckets {
                by_key: HashMap::new(),
                last_sweep: Instant::now(),
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Buckets> {
        match self.buckets.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Drop buckets that have not refilled for `stale_after`.
    pub fn cleanup(&self, stale_after: Duration) {
        let now = Instant::now();
        let mut buckets = self.lock();
        buckets
            .by_key
            .retain(|_, bucket| now.duration_since(bucket.last_refill) < stale_after);
        buckets.last_sweep = now;
    }

    /// Number of keys currently tracked.
    #[must_use]
    pub fn tracked_keys(&self) -> usize {
        self.lock().by_key.len()
    }

    fn take(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut buckets = self.lock();

        if now.duration_since(buckets.last_sweep) >= self.refill_interval {
            let stale_after = self.refill_interval;
            buckets
                .by_key
                .retain(|_, bucket| now.duration_since(bucket.last_refill) < stale_after);
            buckets.last_sweep = now;
        }

        let bucket = buckets.by_key.entry(key.to_string()).or_insert(Bucket {
            tokens: self.max_tokens,
            last_refill: now,
        });

        let elapsed = now.duration_since(bucket.last_refill);
        if elapsed >= self.refill_interval {
            let intervals = u32::try_from(
                elapsed.as_millis() / self.refill_interval.as_millis().max(1),
            )
            .unwrap_or(u32::MAX);
            bucket.tokens = bucket
                .tokens
                .saturating_add(intervals.saturating_mul(self.max_tokens))
                .min(self.max_tokens);
            bucket.last_refill = now;
        }

        if bucket.tokens > 0 {
            bucket.tokens -= 1;
            true
        } else {
            false
        }
    }
}

#[async_trait]
impl RateLimiter for LocalRateLimiter {
    async fn check(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.take(key))
    }
}
