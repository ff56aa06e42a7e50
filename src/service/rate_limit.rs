//! Per-provider call pacing

use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

/// Enforces a minimum interval between the starts of consecutive calls.
///
/// Each caller reserves the next free slot and sleeps until it, so concurrent
/// callers are spaced out without holding the lock while waiting.
pub struct RateLimiter {
    min_interval: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            next_slot: Mutex::new(None),
        }
    }

    /// Wait until the caller may start its call
    pub async fn acquire(&self) {
        if self.min_interval.is_zero() {
            return;
        }

        let start_at = {
            let mut next_slot = match self.next_slot.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            let now = Instant::now();
            let start_at = match *next_slot {
                Some(slot) if slot > now => slot,
                _ => now,
            };
            *next_slot = Some(start_at + self.min_interval);
            start_at
        };

        tokio::time::sleep_until(start_at).await;
    }
}
