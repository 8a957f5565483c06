//! Admission pacing for the row producer
//!
//! A GCRA bucket with a burst of one, so permits come out at a steady
//! cadence of `rate` per second and never bunch up after an idle period.

use std::num::NonZeroU32;

use governor::clock::Clock;
use governor::middleware::NoOpMiddleware;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};

/// Clock driven by `tokio::time`, so a paused test runtime controls both the
/// bucket and the sleeps spent waiting on it.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

impl Clock for TokioClock {
    type Instant = std::time::Instant;

    fn now(&self) -> Self::Instant {
        tokio::time::Instant::now().into_std()
    }
}

/// Paces how fast rows are admitted into the job queue
pub struct AdmissionLimiter<C: Clock = TokioClock> {
    limiter: RateLimiter<NotKeyed, InMemoryState, C, NoOpMiddleware<C::Instant>>,
    clock: C,
    rate: NonZeroU32,
}

impl AdmissionLimiter<TokioClock> {
    pub fn per_second(rate: NonZeroU32) -> Self {
        Self::with_clock(rate, TokioClock)
    }

    /// Wait until the next permit is available and take it
    pub async fn acquire(&self) {
        while let Err(not_until) = self.limiter.check() {
            let wait = not_until.wait_time_from(self.clock.now());
            tokio::time::sleep(wait).await;
        }
    }
}

impl<C: Clock> AdmissionLimiter<C> {
    pub fn with_clock(rate: NonZeroU32, clock: C) -> Self {
        let quota = Quota::per_second(rate).allow_burst(NonZeroU32::MIN);
        let limiter = RateLimiter::direct_with_clock(quota, &clock);

        Self {
            limiter,
            clock,
            rate,
        }
    }

    pub fn rate(&self) -> NonZeroU32 {
        self.rate
    }

    /// Take a permit if one is available right now
    pub fn try_acquire(&self) -> bool {
        self.limiter.check().is_ok()
    }
}

impl<C: Clock> std::fmt::Debug for AdmissionLimiter<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionLimiter")
            .field("rate", &self.rate)
            .finish()
    }
}
