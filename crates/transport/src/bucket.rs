//! Token bucket, tracked as the theoretical arrival time of the next request
//! (GCRA). Equivalent to a bucket of `capacity` tokens refilled continuously at
//! one token per `interval`, with no float accumulation.

use std::{sync::Mutex, time::Duration};

use {
    tokio::time::{Instant, sleep},
    tokio_util::sync::CancellationToken,
    tracing::trace,
};

use crate::config::BucketConfig;

/// Returned when a wait was abandoned. No token was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("token acquisition cancelled")]
pub struct Cancelled;

#[derive(Debug)]
pub struct TokenBucket {
    interval: Duration,
    /// Slack for bursts: `interval * (capacity - 1)`.
    tolerance: Duration,
    capacity: u32,
    /// The bucket is full whenever `tat <= now`.
    tat: Mutex<Instant>,
}

impl TokenBucket {
    #[must_use]
    pub fn new(config: BucketConfig) -> Self {
        Self::new_at(config, Instant::now())
    }

    #[must_use]
    pub fn new_at(config: BucketConfig, now: Instant) -> Self {
        let capacity = config.capacity.max(1);
        Self {
            interval: config.interval,
            tolerance: config.interval.saturating_mul(capacity - 1),
            capacity,
            tat: Mutex::new(now),
        }
    }

    #[must_use]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    #[must_use]
    pub fn is_unlimited(&self) -> bool {
        self.interval.is_zero()
    }

    /// Take a token if one is available at `now`, otherwise report how long
    /// until one will be.
    pub fn try_take_at(&self, now: Instant) -> Result<(), Duration> {
        if self.is_unlimited() {
            return Ok(());
        }
        let mut tat = self.tat.lock().unwrap_or_else(|e| e.into_inner());
        let horizon = now + self.tolerance;
        if *tat > horizon {
            return Err(*tat - horizon);
        }
        *tat = (*tat).max(now) + self.interval;
        Ok(())
    }

    pub fn try_take(&self) -> Result<(), Duration> {
        self.try_take_at(Instant::now())
    }

    /// Wait for a token. Fails without taking one if `cancel` fires first,
    /// including when it is already cancelled on entry.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<Duration, Cancelled> {
        let started = Instant::now();
        loop {
            if cancel.is_cancelled() {
                return Err(Cancelled);
            }
            match self.try_take() {
                Ok(()) => return Ok(started.elapsed()),
                Err(wait) => {
                    trace!(wait_ms = wait.as_millis() as u64, "waiting for token");
                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => return Err(Cancelled),
                        () = sleep(wait) => {},
                    }
                },
            }
        }
    }

    /// Give back a token taken by a request that was then abandoned.
    pub fn refund(&self) {
        if self.is_unlimited() {
            return;
        }
        let mut tat = self.tat.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(earlier) = tat.checked_sub(self.interval) {
            *tat = earlier;
        }
    }

    /// Whole tokens available at `now`.
    #[must_use]
    pub fn available_at(&self, now: Instant) -> u32 {
        if self.is_unlimited() {
            return self.capacity;
        }
        let tat = *self.tat.lock().unwrap_or_else(|e| e.into_inner());
        if tat <= now {
            return self.capacity;
        }
        let debt = tat - now;
        let headroom = (self.tolerance + self.interval).saturating_sub(debt);
        let whole = headroom.as_nanos() / self.interval.as_nanos().max(1);
        u32::try_from(whole).unwrap_or(self.capacity).min(self.capacity)
    }

    /// Instant from which the bucket has been (or will be) full.
    #[must_use]
    pub fn full_since(&self) -> Instant {
        *self.tat.lock().unwrap_or_else(|e| e.into_inner())
    }
}
