//! Per-client token buckets.
//!
//! Uses governor's keyed GCRA limiter, which behaves as a token bucket of
//! `capacity` tokens refilled at `refill_per_second`, recomputed lazily on
//! each check. Per-key state lives in a sharded map and is updated with a
//! compare-and-swap, so unrelated clients never contend on one lock.

use std::num::NonZeroU32;

use anyhow::anyhow;
use governor::clock::{Clock, DefaultClock};
use governor::middleware::NoOpMiddleware;
use governor::state::keyed::DefaultKeyedStateStore;
use governor::{Quota, RateLimiter};
use keystone_config::RateLimitConfig;
use tracing::{debug, warn};

use super::sweep::SweepThrottle;

pub trait ClientLimiter: Send + Sync {
    /// Takes one token from `client_key`'s bucket if one is available.
    fn allow(&self, client_key: &str) -> bool;

    /// Forgets clients whose buckets have refilled completely. Returns how
    /// many were forgotten.
    fn sweep(&self) -> usize;

    fn tracked_clients(&self) -> usize;
}

type KeyedLimiter<C> =
    RateLimiter<String, DefaultKeyedStateStore<String>, C, NoOpMiddleware<<C as Clock>::Instant>>;

pub struct TokenBucketLimiter<C: Clock = DefaultClock> {
    limiter: KeyedLimiter<C>,
    max_tracked_clients: usize,
    inline_sweeps: SweepThrottle,
}

impl TokenBucketLimiter {
    pub fn new(config: &RateLimitConfig) -> anyhow::Result<Self> {
        Self::with_clock(config, DefaultClock::default())
    }
}

impl<C: Clock> TokenBucketLimiter<C> {
    pub fn with_clock(config: &RateLimitConfig, clock: C) -> anyhow::Result<Self> {
        let capacity = NonZeroU32::new(config.capacity)
            .ok_or_else(|| anyhow!("rate limit capacity must be positive"))?;
        let refill = NonZeroU32::new(config.refill_per_second)
            .ok_or_else(|| anyhow!("rate limit refill rate must be positive"))?;

        let quota = Quota::per_second(refill).allow_burst(capacity);

        Ok(Self {
            limiter: RateLimiter::new(quota, DefaultKeyedStateStore::default(), clock),
            max_tracked_clients: config.max_tracked_clients,
            inline_sweeps: SweepThrottle::default(),
        })
    }
}

impl<C> ClientLimiter for TokenBucketLimiter<C>
where
    C: Clock + Send + Sync,
    C::Instant: Send + Sync,
{
    fn allow(&self, client_key: &str) -> bool {
        if self.limiter.len() >= self.max_tracked_clients && self.inline_sweeps.try_begin() {
            self.sweep();
            let remaining = self.limiter.len();
            if remaining >= self.max_tracked_clients {
                warn!(
                    tracked = remaining,
                    max = self.max_tracked_clients,
                    "Rate limiter registry is full of active clients"
                );
            }
        }

        self.limiter.check_key(&client_key.to_string()).is_ok()
    }

    fn sweep(&self) -> usize {
        let before = self.limiter.len();
        self.limiter.retain_recent();
        self.limiter.shrink_to_fit();
        let after = self.limiter.len();
        let evicted = before.saturating_sub(after);

        if evicted > 0 {
            debug!(evicted, tracked = after, "Swept rate limiter");
        }
        evicted
    }

    fn tracked_clients(&self) -> usize {
        self.limiter.len()
    }
}
