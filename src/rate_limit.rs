use std::time::{Duration, Instant};

/// Per-session token bucket for write-class events. Refill is continuous,
/// computed from elapsed time on each acquire, so retries after a rejection
/// don't herd at window boundaries.
#[derive(Debug)]
pub struct TokenBucket {
    capacity: f64,
    tokens: f64,
    refill_per_sec: f64,
    last_refill: Instant,
}

impl TokenBucket {
    pub fn new(capacity: u32, refill_per_sec: f64) -> Self {
        Self {
            capacity: capacity as f64,
            tokens: capacity as f64,
            refill_per_sec,
            last_refill: Instant::now(),
        }
    }

    /// Takes one token if available. A `false` return means the caller must
    /// reject the event without touching any state.
    pub fn try_acquire(&mut self) -> bool {
        self.try_acquire_at(Instant::now())
    }

    fn try_acquire_at(&mut self, now: Instant) -> bool {
        self.refill(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill);
        if elapsed > Duration::ZERO {
            self.tokens =
                (self.tokens + elapsed.as_secs_f64() * self.refill_per_sec).min(self.capacity);
            self.last_refill = now;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_plus_one_is_rejected() {
        let mut bucket = TokenBucket::new(3, 1.0);
        let now = Instant::now();
        for _ in 0..3 {
            assert!(bucket.try_acquire_at(now));
        }
        assert!(!bucket.try_acquire_at(now));
    }

    #[test]
    fn refill_is_continuous_not_windowed() {
        let mut bucket = TokenBucket::new(2, 2.0);
        let start = Instant::now();
        assert!(bucket.try_acquire_at(start));
        assert!(bucket.try_acquire_at(start));
        assert!(!bucket.try_acquire_at(start));

        // Half a second at 2 tokens/sec restores exactly one token.
        let later = start + Duration::from_millis(500);
        assert!(bucket.try_acquire_at(later));
        assert!(!bucket.try_acquire_at(later));
    }

    #[test]
    fn refill_never_exceeds_capacity() {
        let mut bucket = TokenBucket::new(2, 10.0);
        let start = Instant::now();
        let much_later = start + Duration::from_secs(60);
        assert!(bucket.try_acquire_at(much_later));
        assert!(bucket.try_acquire_at(much_later));
        assert!(!bucket.try_acquire_at(much_later));
    }
}
