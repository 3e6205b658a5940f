use std::time::Duration;

use tokio::time::Instant;

/// Longest wait between credited tokens, whatever the configured rate.
pub const MAX_REFILL_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Token bucket that only credits whole-token refills.
///
/// `last_refill` advances only once at least one token has accrued, so partial
/// progress toward the next token is never thrown away by frequent polling.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    capacity: f64,
    refill_per_sec: f64,
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// Create a full bucket. `refill_per_sec` must be positive.
    pub fn new(capacity: usize, refill_per_sec: f64, now: Instant) -> Self {
        let capacity = capacity as f64;
        Self {
            capacity,
            refill_per_sec,
            tokens: capacity,
            last_refill: now,
        }
    }

    pub fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill);
        let added = elapsed.as_secs_f64() * self.refill_per_sec;
        if added >= 1.0 {
            self.tokens = (self.tokens + added).min(self.capacity);
            self.last_refill = now;
        }
    }

    pub fn has_token(&self) -> bool {
        self.tokens >= 1.0
    }

    /// Consume one token if available.
    pub fn try_take(&mut self) -> bool {
        if self.has_token() {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Earliest instant at which [`refill`](Self::refill) will credit a token.
    pub fn next_refill_at(&self) -> Instant {
        let interval = self.refill_interval();
        self.last_refill
            .checked_add(interval)
            .unwrap_or_else(|| Instant::now() + MAX_REFILL_INTERVAL)
    }

    /// Time to accrue one token, capped at [`MAX_REFILL_INTERVAL`].
    pub fn refill_interval(&self) -> Duration {
        Duration::try_from_secs_f64(1.0 / self.refill_per_sec)
            .map_or(MAX_REFILL_INTERVAL, |interval| interval.min(MAX_REFILL_INTERVAL))
    }

    pub fn tokens(&self) -> f64 {
        self.tokens
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }
}
