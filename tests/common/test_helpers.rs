use std::sync::Arc;
use std::time::Duration;
use wayfarer::{
    ApiContext, Governor, HttpClient, InstantSleeper, ManualClock, MemoryWindowStore,
    RateLimiter, ResponseCache, ServiceLimits, Sleeper,
};

pub const TEST_EPOCH_MS: u64 = 1_700_000_000_000;

/// Gateway plumbing against in-memory state and a manual clock.
pub fn api_context(limits: Vec<ServiceLimits>) -> (Arc<ApiContext>, Arc<ManualClock>) {
    api_context_with_sleeper(limits, InstantSleeper)
}

pub fn api_context_with_sleeper<S: Sleeper + 'static>(
    limits: Vec<ServiceLimits>,
    sleeper: S,
) -> (Arc<ApiContext>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(TEST_EPOCH_MS));
    let ctx = ApiContext {
        http: HttpClient::new(Duration::from_secs(10)).expect("http client"),
        limiter: Arc::new(RateLimiter::new(
            limits,
            Arc::new(MemoryWindowStore::new()),
            clock.clone(),
        )),
        governor: Arc::new(Governor::new(2)),
        cache: Arc::new(ResponseCache::new(
            Duration::from_secs(600),
            1024 * 1024,
            clock.clone(),
        )),
        sleeper: Arc::new(sleeper),
        clock: clock.clone(),
    };
    (Arc::new(ctx), clock)
}
