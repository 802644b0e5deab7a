//! Token bucket rate limiter for inbound frames
//!
//! Each connection owns one bucket. Every frame costs one token; tokens
//! refill continuously at a fixed rate up to the burst capacity. A frame that
//! finds less than one token is rejected outright: there is no queueing.

use parking_lot::Mutex;
use tokio::time::Instant;

/// Token bucket configuration
#[derive(Clone, Copy, Debug)]
pub struct TokenBucketConfig {
    /// Burst size (and starting token count)
    pub capacity: u32,
    /// Sustained refill rate in tokens per second
    pub refill_per_sec: u32,
}

impl Default for TokenBucketConfig {
    fn default() -> Self {
        Self {
            capacity: party_core::RATE_BURST,
            refill_per_sec: party_core::RATE_SUSTAINED,
        }
    }
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// Per-connection token bucket
#[derive(Debug)]
pub struct TokenBucket {
    capacity: f64,
    refill_rate: f64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    /// Create a full bucket with default configuration
    pub fn new() -> Self {
        Self::with_config(TokenBucketConfig::default())
    }

    /// Create a full bucket with custom configuration
    pub fn with_config(config: TokenBucketConfig) -> Self {
        let capacity = f64::from(config.capacity);
        Self {
            capacity,
            refill_rate: f64::from(config.refill_per_sec),
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Take one token if available.
    ///
    /// Returns `true` if the frame is admitted, `false` if rate limited.
    pub fn allow(&self) -> bool {
        let mut state = self.state.lock();
        self.refill(&mut state);

        if state.tokens < 1.0 {
            return false;
        }
        state.tokens -= 1.0;
        true
    }

    /// Tokens currently available, after refilling
    pub fn available(&self) -> f64 {
        let mut state = self.state.lock();
        self.refill(&mut state);
        state.tokens
    }

    fn refill(&self, state: &mut BucketState) {
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(state.last_refill).as_secs_f64();
        state.last_refill = now;
        state.tokens = (state.tokens + elapsed * self.refill_rate).min(self.capacity);
    }
}

impl Default for TokenBucket {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_burst_then_reject() {
        let bucket = TokenBucket::new();

        for _ in 0..30 {
            assert!(bucket.allow());
        }
        assert!(!bucket.allow());
    }

    #[tokio::test(start_paused = true)]
    async fn test_refills_one_token_per_interval() {
        let bucket = TokenBucket::with_config(TokenBucketConfig {
            capacity: 5,
            refill_per_sec: 10,
        });

        for _ in 0..5 {
            assert!(bucket.allow());
        }
        assert!(!bucket.allow());

        tokio::time::advance(Duration::from_millis(50)).await;
        assert!(!bucket.allow());

        tokio::time::advance(Duration::from_millis(60)).await;
        assert!(bucket.allow());
        assert!(!bucket.allow());
    }

    #[tokio::test(start_paused = true)]
    async fn test_refill_clamped_to_capacity() {
        let bucket = TokenBucket::with_config(TokenBucketConfig {
            capacity: 3,
            refill_per_sec: 10,
        });
        assert!(bucket.allow());

        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(bucket.available(), 3.0);

        for _ in 0..3 {
            assert!(bucket.allow());
        }
        assert!(!bucket.allow());
        assert!(bucket.available() >= 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_calls_do_not_go_negative() {
        let bucket = TokenBucket::with_config(TokenBucketConfig {
            capacity: 1,
            refill_per_sec: 1,
        });
        assert!(bucket.allow());
        for _ in 0..10 {
            assert!(!bucket.allow());
        }
        assert_eq!(bucket.available(), 0.0);

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(bucket.allow());
    }
}
