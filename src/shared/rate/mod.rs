//! Pacing for fire-and-forget fan-out (global app actions, gossip broadcasts).

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Token bucket shared by all fan-out tasks of one kind.
#[derive(Clone)]
pub struct Pacer {
    limiter: Arc<DirectLimiter>,
}

impl Pacer {
    /// Allows `per_second` sends with a burst of roughly a tenth of that.
    pub fn per_second(per_second: u32) -> Self {
        let rate = NonZeroU32::new(per_second.max(1)).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new((per_second / 10).max(1)).unwrap_or(NonZeroU32::MIN);
        Self {
            limiter: Arc::new(RateLimiter::direct(Quota::per_second(rate).allow_burst(burst))),
        }
    }

    /// Waits until the next send is allowed.
    pub async fn take(&self) {
        self.limiter.until_ready().await;
    }
}
