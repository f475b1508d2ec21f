use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};

use crate::data_source::SourceError;
use crate::ProviderId;

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Client-side request budget for an upstream with a published quota.
///
/// The budget never queues or waits: an exhausted budget fails the call
/// immediately with [`SourceError::rate_limited`].
#[derive(Clone)]
pub struct RateBudget {
    provider: ProviderId,
    limiter: Arc<DirectRateLimiter>,
}

impl RateBudget {
    pub fn new(provider: ProviderId, quota_window: Duration, quota_limit: u32) -> Self {
        Self {
            provider,
            limiter: Arc::new(RateLimiter::direct(quota_from_window(
                quota_window,
                quota_limit,
            ))),
        }
    }

    /// CoinGecko public tier: 30 calls per minute.
    pub fn coingecko_public() -> Self {
        Self::new(ProviderId::Coingecko, Duration::from_secs(60), 30)
    }

    pub fn acquire(&self) -> Result<(), SourceError> {
        self.limiter.check().map_err(|_| {
            SourceError::rate_limited(format!(
                "{} client-side rate budget exhausted",
                self.provider
            ))
        })
    }
}

impl std::fmt::Debug for RateBudget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateBudget")
            .field("provider", &self.provider)
            .finish_non_exhaustive()
    }
}

fn quota_from_window(quota_window: Duration, quota_limit: u32) -> Quota {
    let safe_limit = quota_limit.max(1);
    let burst = NonZeroU32::new(safe_limit).unwrap_or(NonZeroU32::MIN);

    let seconds_per_cell = (quota_window.as_secs_f64() / f64::from(safe_limit)).max(0.001);
    let period = Duration::from_secs_f64(seconds_per_cell);

    Quota::with_period(period)
        .unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN))
        .allow_burst(burst)
}
