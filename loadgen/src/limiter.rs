use governor::{DefaultDirectRateLimiter, Quota, RateLimiter as GovernorLimiter};
use std::fmt;
use std::num::NonZeroU32;
use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum LimiterError {
    #[error("Rate limiter requires a positive rate")]
    ZeroRate,
}

/// Per-worker admission gate.
///
/// Admits at most `rate` operations per second in steady state with a burst of a single
/// operation, so a worker never front-loads its budget.
pub struct RateLimiter {
    limiter: DefaultDirectRateLimiter,
    rate: NonZeroU32,
}

impl RateLimiter {
    pub fn new(rate: u32) -> Result<Self, LimiterError> {
        let rate = NonZeroU32::new(rate).ok_or(LimiterError::ZeroRate)?;
        Ok(Self::with_rate(rate))
    }

    pub fn with_rate(rate: NonZeroU32) -> Self {
        Self {
            limiter: GovernorLimiter::direct(Quota::per_second(rate).allow_burst(NonZeroU32::MIN)),
            rate,
        }
    }

    /// Wait until the next operation is allowed.
    pub async fn acquire(&self) {
        self.limiter.until_ready().await;
    }

    pub fn rate(&self) -> NonZeroU32 {
        self.rate
    }
}

impl fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiter")
            .field("rate", &self.rate)
            .finish()
    }
}
