//! Clock abstraction used by the limiter, caches, and statistics engine.
//!
//! Wall-clock epoch milliseconds rather than a monotonic instant: limiter
//! window history and cache bucket timestamps are persisted and compared
//! across process restarts, so they must share a time base with the store.

use chrono::NaiveDate;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Source of "now" so time can be faked in tests.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Milliseconds since the Unix epoch.
    fn now_millis(&self) -> u64;

    /// Today's calendar date in UTC.
    fn today(&self) -> NaiveDate {
        date_of_millis(self.now_millis())
    }
}

/// Calendar date (UTC) for an epoch-millisecond timestamp.
pub fn date_of_millis(millis: u64) -> NaiveDate {
    chrono::DateTime::from_timestamp_millis(millis as i64)
        .map(|dt| dt.date_naive())
        .unwrap_or(NaiveDate::MIN)
}

/// Production clock backed by `SystemTime::now()`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(0)
    }
}

/// Test clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    millis: AtomicU64,
}

impl ManualClock {
    pub fn new(start_millis: u64) -> Self {
        Self { millis: AtomicU64::new(start_millis) }
    }

    /// Start at an arbitrary but realistic point in time.
    pub fn at_date(date: NaiveDate) -> Self {
        let millis = date
            .and_hms_opt(12, 0, 0)
            .map(|dt| dt.and_utc().timestamp_millis() as u64)
            .unwrap_or(0);
        Self::new(millis)
    }

    pub fn advance(&self, by: Duration) {
        self.millis.fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn set(&self, millis: u64) {
        self.millis.store(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.millis.load(Ordering::SeqCst)
    }
}
