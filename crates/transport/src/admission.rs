use std::{
    collections::HashMap,
    sync::{
        Arc, RwLock,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use {
    switchboard_common::RecipientKey,
    tokio::time::Instant,
    tokio_util::sync::CancellationToken,
    tracing::{debug, trace},
};

#[cfg(feature = "metrics")]
use switchboard_metrics::{counter, gauge, histogram, labels, transport as transport_metrics};

use crate::{
    bucket::TokenBucket,
    config::{BucketConfig, RateLimitConfig},
    error::{Error, Result},
};

const SWEEP_EVERY_ACQUISITIONS: u64 = 512;

/// Per-recipient buckets, created on first use.
///
/// Lookups take the shared lock; only insertion and eviction take the
/// exclusive one. A bucket that has been full for `idle_ttl` carries no state
/// worth keeping, so periodic sweeps drop it.
pub struct RecipientRegistry {
    config: BucketConfig,
    idle_ttl: Duration,
    max_entries: usize,
    buckets: RwLock<HashMap<RecipientKey, Arc<TokenBucket>>>,
    acquisitions: AtomicU64,
}

impl RecipientRegistry {
    #[must_use]
    pub fn new(config: BucketConfig, idle_ttl: Duration, max_entries: usize) -> Self {
        Self {
            config,
            idle_ttl,
            max_entries: max_entries.max(1),
            buckets: RwLock::new(HashMap::new()),
            acquisitions: AtomicU64::new(0),
        }
    }

    /// Bucket for `key`, creating it if absent.
    pub fn bucket(&self, key: &RecipientKey) -> Arc<TokenBucket> {
        {
            let buckets = self.buckets.read().unwrap_or_else(|e| e.into_inner());
            if let Some(bucket) = buckets.get(key) {
                return Arc::clone(bucket);
            }
        }

        let mut buckets = self.buckets.write().unwrap_or_else(|e| e.into_inner());
        // Another caller may have inserted it between the two locks.
        if let Some(bucket) = buckets.get(key) {
            return Arc::clone(bucket);
        }
        if buckets.len() >= self.max_entries {
            let excess = buckets.len() + 1 - self.max_entries;
            Self::evict_least_recent(&mut buckets, excess);
        }
        let bucket = Arc::new(TokenBucket::new(self.config));
        buckets.insert(key.clone(), Arc::clone(&bucket));
        trace!(recipient = %key, tracked = buckets.len(), "created recipient bucket");

        #[cfg(feature = "metrics")]
        gauge!(transport_metrics::RECIPIENT_BUCKETS).set(buckets.len() as f64);

        bucket
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.buckets.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn contains(&self, key: &RecipientKey) -> bool {
        self.buckets
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(key)
    }

    /// Drop buckets that have been full for at least the idle TTL.
    /// Returns how many were removed.
    pub fn sweep_at(&self, now: Instant) -> usize {
        let mut buckets = self.buckets.write().unwrap_or_else(|e| e.into_inner());
        let before = buckets.len();
        buckets.retain(|_, bucket| bucket.full_since() + self.idle_ttl > now);
        let removed = before - buckets.len();
        if removed > 0 {
            debug!(removed, remaining = buckets.len(), "evicted idle recipient buckets");

            #[cfg(feature = "metrics")]
            {
                counter!(transport_metrics::RECIPIENT_EVICTIONS_TOTAL, labels::REASON => "idle")
                    .increment(removed as u64);
                gauge!(transport_metrics::RECIPIENT_BUCKETS).set(buckets.len() as f64);
            }
        }
        removed
    }

    fn note_acquisition(&self, now: Instant) {
        let seen = self.acquisitions.fetch_add(1, Ordering::Relaxed) + 1;
        if seen.is_multiple_of(SWEEP_EVERY_ACQUISITIONS) {
            self.sweep_at(now);
        }
    }

    fn evict_least_recent(buckets: &mut HashMap<RecipientKey, Arc<TokenBucket>>, count: usize) {
        let mut by_age: Vec<(Instant, RecipientKey)> = buckets
            .iter()
            .map(|(key, bucket)| (bucket.full_since(), key.clone()))
            .collect();
        by_age.sort_unstable_by_key(|(full_since, _)| *full_since);
        for (_, key) in by_age.into_iter().take(count) {
            buckets.remove(&key);
        }
        debug!(count, "recipient registry at capacity, evicted least recent");

        #[cfg(feature = "metrics")]
        counter!(transport_metrics::RECIPIENT_EVICTIONS_TOTAL, labels::REASON => "capacity")
            .increment(count as u64);
    }
}

/// Puts a recipient token back unless the whole admission went through.
struct RecipientHold {
    bucket: Option<Arc<TokenBucket>>,
}

impl RecipientHold {
    fn commit(mut self) {
        self.bucket = None;
    }
}

impl Drop for RecipientHold {
    fn drop(&mut self) {
        if let Some(bucket) = self.bucket.take() {
            bucket.refund();
        }
    }
}

/// Global plus per-recipient admission for outbound requests.
pub struct AdmissionControl {
    global: TokenBucket,
    recipients: RecipientRegistry,
}

impl AdmissionControl {
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            global: TokenBucket::new(config.global),
            recipients: RecipientRegistry::new(
                config.per_recipient,
                config.recipient_idle_ttl,
                config.max_recipients,
            ),
        }
    }

    #[must_use]
    pub fn recipients(&self) -> &RecipientRegistry {
        &self.recipients
    }

    #[must_use]
    pub fn global(&self) -> &TokenBucket {
        &self.global
    }

    /// Wait until both the recipient's bucket (when given) and the global
    /// bucket grant a token.
    ///
    /// On cancellation, or if this future is dropped mid-wait, any recipient
    /// token already taken is returned, so an abandoned admission consumes
    /// nothing.
    pub async fn acquire(
        &self,
        cancel: &CancellationToken,
        recipient: Option<&RecipientKey>,
    ) -> Result<()> {
        let started = Instant::now();

        let hold = match recipient {
            Some(key) => {
                let bucket = self.recipients.bucket(key);
                if bucket.acquire(cancel).await.is_err() {
                    return Err(self.cancelled(recipient));
                }
                RecipientHold {
                    bucket: Some(bucket),
                }
            },
            None => RecipientHold { bucket: None },
        };

        if self.global.acquire(cancel).await.is_err() {
            return Err(self.cancelled(recipient));
        }
        hold.commit();

        let waited = started.elapsed();
        self.recipients.note_acquisition(started + waited);
        if !waited.is_zero() {
            trace!(
                recipient = recipient.map(RecipientKey::as_str),
                waited_ms = waited.as_millis() as u64,
                "admitted after wait"
            );
        }

        #[cfg(feature = "metrics")]
        {
            let scope = if recipient.is_some() {
                "recipient"
            } else {
                "global"
            };
            counter!(transport_metrics::ADMISSIONS_TOTAL, labels::SCOPE => scope).increment(1);
            histogram!(transport_metrics::ADMISSION_WAIT_SECONDS).record(waited.as_secs_f64());
        }

        Ok(())
    }

    /// [`acquire`](Self::acquire) bounded by a deadline.
    pub async fn acquire_until(
        &self,
        cancel: &CancellationToken,
        deadline: Instant,
        recipient: Option<&RecipientKey>,
    ) -> Result<()> {
        match tokio::time::timeout_at(deadline, self.acquire(cancel, recipient)).await {
            Ok(result) => result,
            Err(_) => Err(self.cancelled(recipient)),
        }
    }

    fn cancelled(&self, recipient: Option<&RecipientKey>) -> Error {
        debug!(
            recipient = recipient.map(RecipientKey::as_str),
            "admission cancelled while waiting"
        );

        #[cfg(feature = "metrics")]
        counter!(transport_metrics::ADMISSIONS_CANCELLED_TOTAL).increment(1);

        Error::rate_limited(recipient)
    }
}

impl Default for AdmissionControl {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}
