//! Token-bucket limiter for outbound search requests
//!
//! The search backend is usually a metered third-party API. A model stuck
//! in a loop of `web_search` actions, or many learners at once, must not
//! exhaust the quota.
//!
//! ```text
//! ┌─────────────┐
//! │   Bucket    │ ← holds up to `capacity` tokens
//! │  ● ● ● ●    │ ← refills at `refill_rate` tokens per second
//! └─────────────┘
//!        │
//!        ▼
//!   search call:
//!     token available → consume 1, call the backend
//!     bucket empty    → ToolResult::error, backend untouched
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

// Tokens are stored scaled so fractional refills are not lost
const SCALE: u64 = 1000;

pub struct RateLimiter {
    capacity: u64,
    refill_rate: f64,
    tokens_scaled: AtomicU64,
    last_refill: Mutex<Instant>,
}

impl RateLimiter {
    /// Create a limiter with a full bucket
    ///
    /// # Arguments
    /// * `capacity` - Burst size
    /// * `refill_rate` - Tokens added per second
    pub fn new(capacity: u64, refill_rate: f64) -> Self {
        Self {
            capacity,
            refill_rate,
            tokens_scaled: AtomicU64::new(capacity * SCALE),
            last_refill: Mutex::new(Instant::now()),
        }
    }

    /// Take one token if available
    pub fn try_acquire(&self) -> bool {
        self.refill();

        loop {
            let current = self.tokens_scaled.load(Ordering::Relaxed);
            if current < SCALE {
                return false;
            }
            if self
                .tokens_scaled
                .compare_exchange(current, current - SCALE, Ordering::SeqCst, Ordering::Relaxed)
                .is_ok()
            {
                return true;
            }
        }
    }

    fn refill(&self) {
        let now = Instant::now();
        // poisoning cannot leave a torn Instant
        let mut last = self
            .last_refill
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let elapsed = now.duration_since(*last);
        let tokens_to_add = (elapsed.as_secs_f64() * self.refill_rate * SCALE as f64) as u64;
        if tokens_to_add == 0 {
            return;
        }
        *last = now;

        let max_scaled = self.capacity * SCALE;
        loop {
            let current = self.tokens_scaled.load(Ordering::Relaxed);
            let new = std::cmp::min(current + tokens_to_add, max_scaled);
            if self
                .tokens_scaled
                .compare_exchange(current, new, Ordering::SeqCst, Ordering::Relaxed)
                .is_ok()
            {
                break;
            }
        }
    }

    pub fn available_tokens(&self) -> u64 {
        self.tokens_scaled.load(Ordering::Relaxed) / SCALE
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Time until one token is available again
    pub fn retry_after(&self) -> Duration {
        if self.refill_rate > 0.0 {
            Duration::from_secs_f64(1.0 / self.refill_rate)
        } else {
            Duration::from_secs(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_burst_then_denied() {
        let limiter = RateLimiter::new(3, 1.0);
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
    }

    #[test]
    fn test_refill() {
        let limiter = RateLimiter::new(2, 100.0);
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());

        // 10ms = 1 token at 100/sec
        std::thread::sleep(Duration::from_millis(15));
        assert!(limiter.try_acquire());
    }

    #[test]
    fn test_available_tokens() {
        let limiter = RateLimiter::new(5, 1.0);
        assert_eq!(limiter.available_tokens(), 5);
        limiter.try_acquire();
        assert_eq!(limiter.available_tokens(), 4);
        assert_eq!(limiter.retry_after(), Duration::from_secs(1));
    }
}
