use crate::core::{Result, SyncError};
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Rate limit applied before each snapshot record fetch.
#[async_trait]
pub trait Throttle: Send + Sync {
    async fn wait(&self);
}

/// No throttling at all.
#[derive(Debug, Default, Clone, Copy)]
pub struct Unthrottled;

#[async_trait]
impl Throttle for Unthrottled {
    async fn wait(&self) {}
}

/// Sleep a fixed delay before every record.
#[derive(Debug, Clone, Copy)]
pub struct FixedDelay {
    delay: Duration,
}

impl FixedDelay {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl Throttle for FixedDelay {
    async fn wait(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}

/// Token bucket: bursts up to `capacity`, refills at `per_second`.
pub struct TokenBucket {
    capacity: f64,
    per_second: f64,
    state: Mutex<BucketState>,
}

struct BucketState {
    tokens: f64,
    refilled_at: Instant,
}

impl TokenBucket {
    /// `per_second` must be finite and above zero.
    pub fn new(capacity: u32, per_second: f64) -> Result<Self> {
        if !per_second.is_finite() || per_second <= 0.0 {
            return Err(SyncError::Config(format!(
                "token bucket rate must be a positive number, got {}",
                per_second
            )));
        }

        let capacity = f64::from(capacity.max(1));
        Ok(Self {
            capacity,
            per_second,
            state: Mutex::new(BucketState {
                tokens: capacity,
                refilled_at: Instant::now(),
            }),
        })
    }
}

#[async_trait]
impl Throttle for TokenBucket {
    async fn wait(&self) {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        let elapsed = now.duration_since(state.refilled_at).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.per_second).min(self.capacity);
        state.refilled_at = now;

        if state.tokens < 1.0 {
            let deficit = 1.0 - state.tokens;
            // Tiny rates overflow `Duration`; tokio treats MAX as "never".
            let pause =
                Duration::try_from_secs_f64(deficit / self.per_second).unwrap_or(Duration::MAX);
            // Holding the lock while sleeping keeps waiters in arrival order.
            tokio::time::sleep(pause).await;
            state.tokens = 1.0;
            state.refilled_at = Instant::now();
        }

        state.tokens -= 1.0;
    }
}
