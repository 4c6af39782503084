//! Static configuration.
//!
//! Everything here is fixed at construction time; there is no runtime
//! flag surface. Defaults reflect the free tiers of the providers the
//! app ships against.

use crate::limiter::{ServiceLimits, WindowRule};
use std::time::Duration;

/// Service names used by the limiter and error messages.
pub const SERVICE_WEATHER: &str = "accuweather";
pub const SERVICE_PLACES: &str = "yelp";
pub const SERVICE_GEOCODE: &str = "geocode";

pub const MINUTE: Duration = Duration::from_secs(60);
pub const HOUR: Duration = Duration::from_secs(3600);
pub const DAY: Duration = Duration::from_secs(86_400);

const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_MAX_CONCURRENT_REQUESTS: usize = 2;
const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(10 * 60);
const DEFAULT_CACHE_MAX_BYTES: usize = 1024 * 1024;
const DEFAULT_ACTIVITY_FRESH_AFTER: Duration = Duration::from_secs(3 * 3600);
const DEFAULT_ACTIVITY_QUOTA_COOLDOWN: Duration = Duration::from_secs(48 * 3600);
const DEFAULT_MAX_BUCKET_RECORDS: usize = 60;
const DEFAULT_MAX_RETRIES: usize = 3;
const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_millis(500);
const DEFAULT_RETRY_MAX_DELAY: Duration = Duration::from_secs(10);
const DEFAULT_RETRY_JITTER: Duration = Duration::from_millis(1000);

/// Knobs shared across the core; constructed once at process start.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    pub http_timeout: Duration,
    pub max_concurrent_requests: usize,
    pub cache_ttl: Duration,
    pub cache_max_bytes: usize,
    pub activity_fresh_after: Duration,
    pub activity_quota_cooldown: Duration,
    pub max_bucket_records: usize,
    pub max_retries: usize,
    pub retry_base_delay: Duration,
    pub retry_max_delay: Duration,
    pub retry_jitter: Duration,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            http_timeout: DEFAULT_HTTP_TIMEOUT,
            max_concurrent_requests: DEFAULT_MAX_CONCURRENT_REQUESTS,
            cache_ttl: DEFAULT_CACHE_TTL,
            cache_max_bytes: DEFAULT_CACHE_MAX_BYTES,
            activity_fresh_after: DEFAULT_ACTIVITY_FRESH_AFTER,
            activity_quota_cooldown: DEFAULT_ACTIVITY_QUOTA_COOLDOWN,
            max_bucket_records: DEFAULT_MAX_BUCKET_RECORDS,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_base_delay: DEFAULT_RETRY_BASE_DELAY,
            retry_max_delay: DEFAULT_RETRY_MAX_DELAY,
            retry_jitter: DEFAULT_RETRY_JITTER,
        }
    }
}

/// Per-service window rules.
///
/// - AccuWeather free tier: tiny daily budget, and the two-step
///   location-key/conditions protocol wants breathing room between calls.
/// - Yelp: generous but double-capped (hourly + daily).
/// - Geocoding primary: per-minute politeness cap plus a daily budget.
pub fn default_service_limits() -> Vec<ServiceLimits> {
    vec![
        ServiceLimits::new(SERVICE_WEATHER, vec![
            WindowRule::Spacing { spacing: Duration::from_millis(3000) },
            WindowRule::Ceiling { name: "daily", limit: 45, window: DAY },
        ]),
        ServiceLimits::new(SERVICE_PLACES, vec![
            WindowRule::Ceiling { name: "hourly", limit: 450, window: HOUR },
            WindowRule::Ceiling { name: "daily", limit: 4500, window: DAY },
        ]),
        ServiceLimits::new(SERVICE_GEOCODE, vec![
            WindowRule::Ceiling { name: "minute", limit: 55, window: MINUTE },
            WindowRule::Ceiling { name: "daily", limit: 2400, window: DAY },
        ]),
    ]
}
