use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// A simple per-endpoint token bucket sitting in front of the cache, so a
/// cache miss doesn't translate directly into an uncapped burst of vendor
/// calls.
#[derive(Clone)]
pub struct RateLimiter {
    capacity: f64,
    refill_per_sec: f64,
    state: Arc<Mutex<BucketState>>,
}

impl RateLimiter {
    pub fn new(capacity: u32, refill_per_sec: f64) -> Self {
        Self {
            capacity: capacity as f64,
            refill_per_sec,
            state: Arc::new(Mutex::new(BucketState {
                tokens: capacity as f64,
                last_refill: Instant::now(),
            })),
        }
    }

    /// Blocks until a token is available, sleeping in small increments
    /// (the same `tokio::time::sleep`-based wait idiom used elsewhere in
    /// the workspace for retry backoff).
    pub async fn acquire(&self) {
        loop {
            {
                let mut state = self.state.lock().await;
                let elapsed = state.last_refill.elapsed().as_secs_f64();
                state.tokens = (state.tokens + elapsed * self.refill_per_sec).min(self.capacity);
                state.last_refill = Instant::now();

                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquires_up_to_capacity_without_blocking() {
        let limiter = RateLimiter::new(3, 1.0);
        let start = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        limiter.acquire().await;
        assert!(start.elapsed() < Duration::from_millis(100));
    }
}
