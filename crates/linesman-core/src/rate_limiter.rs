//! Token bucket rate limiter, one per provider.
//!
//! Capacity and refill rate both equal the configured requests per minute and
//! the bucket starts full. Refill is continuous and computed lazily on every
//! check. Denied callers are never queued.

use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    capacity: f64,
    /// Tokens added per millisecond.
    refill_per_ms: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(requests_per_minute: u32, now: Instant) -> Self {
        let capacity = requests_per_minute.max(1) as f64;
        Self {
            tokens: capacity,
            capacity,
            refill_per_ms: capacity / 60_000.0,
            last_refill: now,
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed_ms = now.saturating_duration_since(self.last_refill).as_secs_f64() * 1000.0;
        self.tokens = (self.tokens + elapsed_ms * self.refill_per_ms).min(self.capacity);
        self.last_refill = now;
    }

    fn try_consume(&mut self, now: Instant) -> bool {
        self.refill(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn time_until_next_token(&mut self, now: Instant) -> Duration {
        self.refill(now);
        if self.tokens >= 1.0 {
            Duration::ZERO
        } else {
            let ms = (1.0 - self.tokens) / self.refill_per_ms;
            Duration::from_secs_f64(ms / 1000.0)
        }
    }
}

/// Thread-safe token bucket shared by every request of one provider.
#[derive(Debug)]
pub struct RateLimiter {
    name: String,
    requests_per_minute: u32,
    bucket: Mutex<TokenBucket>,
}

impl RateLimiter {
    pub fn new(name: impl Into<String>, requests_per_minute: u32) -> Self {
        Self {
            name: name.into(),
            requests_per_minute,
            bucket: Mutex::new(TokenBucket::new(requests_per_minute, Instant::now())),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn requests_per_minute(&self) -> u32 {
        self.requests_per_minute
    }

    fn lock_bucket(&self) -> MutexGuard<'_, TokenBucket> {
        self.bucket.lock().unwrap_or_else(|poisoned| {
            tracing::warn!(provider = %self.name, "Rate limiter mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Take one token if available.
    pub fn try_consume(&self) -> bool {
        self.try_consume_at(Instant::now())
    }

    /// Time until at least one token is available. Zero if one is available now.
    pub fn time_until_next_token(&self) -> Duration {
        self.time_until_next_token_at(Instant::now())
    }

    /// Current token count after refill.
    pub fn available_tokens(&self) -> f64 {
        let mut bucket = self.lock_bucket();
        bucket.refill(Instant::now());
        bucket.tokens
    }

    fn try_consume_at(&self, now: Instant) -> bool {
        let allowed = self.lock_bucket().try_consume(now);
        if !allowed {
            tracing::debug!(provider = %self.name, "Rate limiter denied request");
        }
        allowed
    }

    fn time_until_next_token_at(&self, now: Instant) -> Duration {
        self.lock_bucket().time_until_next_token(now)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[test]
    fn test_bucket_starts_full() {
        let limiter = RateLimiter::new("nba-cdn", 5);
        for _ in 0..5 {
            assert!(limiter.try_consume());
        }
        assert!(!limiter.try_consume());
    }

    #[test]
    fn test_denied_until_token_regenerates() {
        let limiter = RateLimiter::new("odds", 60);
        let start = Instant::now();
        for _ in 0..60 {
            assert!(limiter.try_consume_at(start));
        }
        assert!(!limiter.try_consume_at(start));
        assert!(!limiter.try_consume_at(start + Duration::from_millis(500)));
        // 60 rpm refills one token per second.
        assert!(limiter.try_consume_at(start + Duration::from_millis(1001)));
        assert!(!limiter.try_consume_at(start + Duration::from_millis(1002)));
    }

    #[test]
    fn test_refill_capped_at_capacity() {
        let limiter = RateLimiter::new("espn", 3);
        let start = Instant::now();
        assert!(limiter.try_consume_at(start));
        let later = start + Duration::from_secs(3600);
        for _ in 0..3 {
            assert!(limiter.try_consume_at(later));
        }
        assert!(!limiter.try_consume_at(later));
    }

    #[test]
    fn test_time_until_next_token_non_increasing() {
        let limiter = RateLimiter::new("odds", 30);
        let start = Instant::now();
        for _ in 0..30 {
            limiter.try_consume_at(start);
        }

        let mut previous = limiter.time_until_next_token_at(start);
        assert!(previous > Duration::ZERO);
        assert!(previous <= Duration::from_secs(2));

        for step in 1..=25 {
            let wait = limiter.time_until_next_token_at(start + Duration::from_millis(step * 100));
            assert!(wait <= previous);
            previous = wait;
        }
        assert_eq!(previous, Duration::ZERO);
    }

    #[test]
    fn test_zero_wait_when_tokens_available() {
        let limiter = RateLimiter::new("odds", 10);
        assert_eq!(limiter.time_until_next_token(), Duration::ZERO);
        assert!(limiter.available_tokens() > 9.0);
    }

    #[test]
    fn test_concurrent_consumers_never_exceed_capacity() {
        let limiter = Arc::new(RateLimiter::new("shared", 50));
        let granted = Arc::new(AtomicU32::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                let granted = Arc::clone(&granted);
                std::thread::spawn(move || {
                    for _ in 0..20 {
                        if limiter.try_consume() {
                            granted.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        // Capacity plus whatever trickled in while the threads ran.
        let total = granted.load(Ordering::SeqCst);
        assert!(total >= 50);
        assert!(total <= 52);
    }
}
