use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};

/// Process-wide limiter for every request that reaches the origin.
#[derive(Clone)]
pub struct Throttle {
    limiter: Arc<DefaultDirectRateLimiter>,
}

impl Throttle {
    /// `rate` requests per second, no burst. Non-positive rates fall back to 1/s.
    pub fn per_second(rate: f64) -> Self {
        let quota = if rate.is_finite() && rate > 0.0 {
            Quota::with_period(Duration::from_secs_f64(1.0 / rate))
        } else {
            None
        }
        .unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN));
        Self {
            limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }

    pub async fn acquire(&self) {
        self.limiter.until_ready().await;
    }
}
