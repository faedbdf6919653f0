//! crates/mangashelf_core/src/rate_limit.rs
//!
//! Token-bucket limiter for outbound upstream calls. Callers suspend until a
//! token is available instead of failing.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::{sleep, Instant};

use crate::ports::{PortError, PortResult};

struct BucketState {
    tokens: u32,
    last_refill: Instant,
}

pub struct TokenBucket {
    capacity: u32,
    refill_tokens: u32,
    refill_interval: Duration,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    /// A bucket holding at most `capacity` tokens that regains `refill_tokens`
    /// every `refill_interval`. Starts full.
    pub fn new(capacity: u32, refill_tokens: u32, refill_interval: Duration) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            refill_tokens: refill_tokens.max(1),
            refill_interval: refill_interval.max(Duration::from_millis(1)),
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    pub fn per_second(requests: u32) -> Self {
        Self::new(requests, requests, Duration::from_secs(1))
    }

    pub fn per_minute(requests: u32) -> Self {
        Self::new(requests, requests, Duration::from_secs(60))
    }

    fn lock(&self) -> MutexGuard<'_, BucketState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Takes a token if one is available, otherwise reports how long until
    /// the next refill.
    fn take_or_wait(&self) -> Result<(), Duration> {
        let mut state = self.lock();
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(state.last_refill);
        let intervals = u32::try_from(elapsed.as_nanos() / self.refill_interval.as_nanos())
            .unwrap_or(u32::MAX);
        if intervals > 0 {
            let gained = intervals.saturating_mul(self.refill_tokens);
            state.tokens = state.tokens.saturating_add(gained).min(self.capacity);
            // A full bucket restarts its refill clock.
            state.last_refill = if state.tokens == self.capacity {
                now
            } else {
                state.last_refill + self.refill_interval * intervals
            };
        }

        if state.tokens > 0 {
            state.tokens -= 1;
            return Ok(());
        }
        Err((state.last_refill + self.refill_interval).saturating_duration_since(now))
    }

    /// Consumes a token without waiting. Returns `false` if the bucket is empty.
    pub fn try_acquire(&self) -> bool {
        self.take_or_wait().is_ok()
    }

    /// Consumes a token, suspending until one is available.
    pub async fn acquire(&self) {
        loop {
            match self.take_or_wait() {
                Ok(()) => return,
                Err(wait) => sleep(wait).await,
            }
        }
    }

    /// Like `acquire`, but gives up after `max_wait`.
    pub async fn acquire_within(&self, max_wait: Duration) -> PortResult<()> {
        tokio::time::timeout(max_wait, self.acquire())
            .await
            .map_err(|_| PortError::RateLimitTimeout)
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn burst_then_throttle_to_refill_rate() {
        let bucket = TokenBucket::new(3, 1, Duration::from_secs(1));
        let start = Instant::now();

        for _ in 0..3 {
            bucket.acquire().await;
        }
        assert_eq!(start.elapsed(), Duration::ZERO);

        bucket.acquire().await;
        let waited = start.elapsed();
        assert!(waited >= Duration::from_secs(1), "waited {waited:?}");
        assert!(waited < Duration::from_millis(1100), "waited {waited:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn refill_never_exceeds_capacity() {
        let bucket = TokenBucket::per_second(2);
        assert!(bucket.try_acquire());
        assert!(bucket.try_acquire());
        assert!(!bucket.try_acquire());

        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(bucket.try_acquire());
        assert!(bucket.try_acquire());
        assert!(!bucket.try_acquire());
    }

    #[tokio::test(start_paused = true)]
    async fn long_idle_refills_instead_of_spinning() {
        let bucket = TokenBucket::new(1, 1, Duration::from_millis(1));
        bucket.acquire().await;

        // Exactly 2^32 refill intervals.
        tokio::time::advance(Duration::from_millis(1 << 32)).await;
        let start = Instant::now();
        assert!(bucket.try_acquire());

        bucket.acquire().await;
        let waited = start.elapsed();
        assert!(waited >= Duration::from_millis(1), "waited {waited:?}");
        assert!(waited < Duration::from_millis(10), "waited {waited:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn acquire_within_times_out_on_empty_bucket() {
        let bucket = TokenBucket::per_minute(1);
        bucket.acquire().await;

        let result = bucket.acquire_within(Duration::from_secs(5)).await;
        assert_eq!(result, Err(PortError::RateLimitTimeout));

        let result = bucket.acquire_within(Duration::from_secs(60)).await;
        assert_eq!(result, Ok(()));
    }
}
