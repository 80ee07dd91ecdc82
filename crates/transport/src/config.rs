use std::time::Duration;

/// One token every `interval`, holding at most `capacity` tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketConfig {
    pub capacity: u32,
    /// Zero disables the bucket.
    pub interval: Duration,
}

impl BucketConfig {
    #[must_use]
    pub fn new(capacity: u32, interval: Duration) -> Self {
        Self { capacity, interval }
    }

    /// `rate` tokens per second.
    #[must_use]
    pub fn per_second(rate: u32, capacity: u32) -> Self {
        Self::new(capacity, interval_for(rate, Duration::from_secs(1)))
    }

    /// `rate` tokens per minute.
    #[must_use]
    pub fn per_minute(rate: u32, capacity: u32) -> Self {
        Self::new(capacity, interval_for(rate, Duration::from_secs(60)))
    }

    #[must_use]
    pub fn unlimited() -> Self {
        Self::new(1, Duration::ZERO)
    }

    #[must_use]
    pub fn is_unlimited(&self) -> bool {
        self.interval.is_zero()
    }
}

fn interval_for(rate: u32, period: Duration) -> Duration {
    if rate == 0 {
        return Duration::ZERO;
    }
    period / rate
}

/// Limits for [`AdmissionControl`](crate::AdmissionControl).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub global: BucketConfig,
    pub per_recipient: BucketConfig,
    /// Recipient buckets that have been full for this long are dropped.
    pub recipient_idle_ttl: Duration,
    /// Upper bound on tracked recipients; least recently used go first.
    pub max_recipients: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            // Bot API broadcast limit.
            global: BucketConfig::per_second(30, 10),
            // Group chats accept about 20 messages a minute.
            per_recipient: BucketConfig::per_minute(20, 1),
            recipient_idle_ttl: Duration::from_secs(600),
            max_recipients: 10_000,
        }
    }
}
