use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{Instant, sleep_until};

/// A token bucket shared by every page-location worker.
///
/// Each caller reserves a token up front and then sleeps until it is due,
/// so concurrent callers are spaced out instead of racing for refills.
#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    burst: u32,
    state: Mutex<BucketState>,
}

#[derive(Debug)]
struct BucketState {
    /// When the next token would be due if no burst were allowed.
    next_due: Instant,
}

impl RateLimiter {
    /// Allows `count` acquisitions per `period`, without bursts.
    pub fn new(count: u32, period: Duration) -> Self {
        Self::with_burst(count, period, 1)
    }

    /// Like [`RateLimiter::new`], letting up to `burst` acquisitions through at once.
    pub fn with_burst(count: u32, period: Duration, burst: u32) -> Self {
        Self {
            interval: period / count.max(1),
            burst: burst.max(1),
            state: Mutex::new(BucketState {
                next_due: Instant::now(),
            }),
        }
    }

    /// A limiter that never waits.
    pub fn unlimited() -> Self {
        Self::with_burst(1, Duration::ZERO, 1)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Waits until a token is available and consumes it.
    pub async fn acquire(&self) {
        let due = {
            let mut state = self.state.lock().await;
            let now = Instant::now();
            let next_due = state.next_due.max(now);
            state.next_due = next_due + self.interval;
            next_due
                .checked_sub(self.interval * (self.burst - 1))
                .map_or(now, |due| due.max(now))
        };
        if due > Instant::now() {
            sleep_until(due).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_spaces_acquisitions() {
        let limiter = RateLimiter::new(40, Duration::from_secs(60));
        let start = Instant::now();
        for _ in 0..3 {
            limiter.acquire().await;
        }
        assert_eq!(start.elapsed(), Duration::from_millis(3000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_passes_immediately() {
        let limiter = RateLimiter::with_burst(10, Duration::from_secs(10), 3);
        let start = Instant::now();
        for _ in 0..3 {
            limiter.acquire().await;
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
        limiter.acquire().await;
        assert_eq!(start.elapsed(), Duration::from_secs(1));
    }
}
