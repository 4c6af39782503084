//! In-memory response cache: short TTL, byte-bounded, oldest-first
//! eviction.
//!
//! Entries are stored as JSON values with their serialized byte size.
//! Expired entries are logically absent: removed lazily on read and
//! eagerly during insert-triggered cleanup. When an insert would push the
//! resident total over budget, cleanup first drops everything expired and
//! then evicts by insertion age until the cache is at or under 80% of the
//! budget.
//!
//! Keys are the caller's job and must be deterministic for identical
//! logical requests; [`coord_key`] and [`query_key`] cover the two shapes
//! the gateways need.

use crate::clock::Clock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Evict down to this share of the budget when over.
const EVICTION_FLOOR: f64 = 0.8;

struct Entry {
    payload: Value,
    bytes: usize,
    inserted_at: u64,
}

struct Inner {
    entries: HashMap<String, Entry>,
    total_bytes: usize,
}

pub struct ResponseCache {
    inner: Mutex<Inner>,
    ttl: Duration,
    max_bytes: usize,
    clock: Arc<dyn Clock>,
}

impl ResponseCache {
    pub fn new(ttl: Duration, max_bytes: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Mutex::new(Inner { entries: HashMap::new(), total_bytes: 0 }),
            ttl,
            max_bytes,
            clock,
        }
    }

    /// Typed read. Absent if never set, expired, or undecodable (the entry
    /// is dropped in all three cases but the first).
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let now = self.clock.now_millis();
        let mut inner = self.inner.lock().unwrap();

        let expired = match inner.entries.get(key) {
            None => return None,
            Some(entry) => now.saturating_sub(entry.inserted_at) > self.ttl.as_millis() as u64,
        };
        if expired {
            Self::remove(&mut inner, key);
            return None;
        }

        let payload = inner.entries.get(key).map(|e| e.payload.clone())?;
        match serde_json::from_value(payload) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(key, error = %e, "dropping undecodable cache entry");
                Self::remove(&mut inner, key);
                None
            }
        }
    }

    /// Insert or replace. A value that cannot serialize, or that alone
    /// exceeds the whole budget, is not cached.
    pub fn insert<T: Serialize>(&self, key: &str, value: &T) {
        let payload = match serde_json::to_value(value) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(key, error = %e, "value not cacheable");
                return;
            }
        };
        let bytes = payload.to_string().len();
        if bytes > self.max_bytes {
            tracing::debug!(key, bytes, "entry larger than cache budget; skipping");
            return;
        }

        let now = self.clock.now_millis();
        let mut inner = self.inner.lock().unwrap();
        Self::remove(&mut inner, key);

        if inner.total_bytes + bytes > self.max_bytes {
            self.cleanup(&mut inner, now, bytes);
        }

        inner.total_bytes += bytes;
        inner.entries.insert(key.to_string(), Entry { payload, bytes, inserted_at: now });
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.entries.clear();
        inner.total_bytes = 0;
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn total_bytes(&self) -> usize {
        self.inner.lock().unwrap().total_bytes
    }

    /// Expired entries out first; then oldest insertions until at or under
    /// the eviction floor, and in any case low enough that `incoming`
    /// bytes fit inside the budget.
    fn cleanup(&self, inner: &mut Inner, now: u64, incoming: usize) {
        let ttl_ms = self.ttl.as_millis() as u64;
        let expired: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, e)| now.saturating_sub(e.inserted_at) > ttl_ms)
            .map(|(k, _)| k.clone())
            .collect();
        for key in &expired {
            Self::remove(inner, key);
        }

        let floor = (self.max_bytes as f64 * EVICTION_FLOOR) as usize;
        let floor = floor.min(self.max_bytes.saturating_sub(incoming));
        while inner.total_bytes > floor {
            let Some(oldest) = inner
                .entries
                .iter()
                .min_by_key(|(_, e)| e.inserted_at)
                .map(|(k, _)| k.clone())
            else {
                break;
            };
            Self::remove(inner, &oldest);
        }
    }

    fn remove(inner: &mut Inner, key: &str) {
        if let Some(entry) = inner.entries.remove(key) {
            inner.total_bytes = inner.total_bytes.saturating_sub(entry.bytes);
        }
    }
}

impl std::fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCache")
            .field("ttl", &self.ttl)
            .field("max_bytes", &self.max_bytes)
            .field("entries", &self.len())
            .finish()
    }
}

/// Cache key for a coordinate-shaped request; 3-decimal rounding (~110 m)
/// makes nearby lookups share one entry.
pub fn coord_key(endpoint: &str, lat: f64, lng: f64) -> String {
    format!("{endpoint}:{lat:.3}:{lng:.3}")
}

/// Cache key for a text-shaped request; trimmed and lowercased so
/// identical logical queries collide.
pub fn query_key(endpoint: &str, text: &str) -> String {
    format!("{endpoint}:{}", text.trim().to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Payload {
        name: String,
        pad: String,
    }

    fn payload(name: &str, pad_len: usize) -> Payload {
        Payload { name: name.into(), pad: "x".repeat(pad_len) }
    }

    fn cache(max_bytes: usize) -> (ResponseCache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        (ResponseCache::new(Duration::from_secs(600), max_bytes, clock.clone()), clock)
    }

    #[test]
    fn hit_then_expiry() {
        let (cache, clock) = cache(10_000);
        cache.insert("k", &payload("a", 10));

        assert_eq!(cache.get::<Payload>("k"), Some(payload("a", 10)));

        clock.advance(Duration::from_secs(601));
        assert_eq!(cache.get::<Payload>("k"), None);
        assert_eq!(cache.len(), 0, "expired entry removed on read");
    }

    #[test]
    fn set_after_expiry_is_fresh_insert() {
        let (cache, clock) = cache(10_000);
        cache.insert("k", &payload("old", 10));
        clock.advance(Duration::from_secs(601));

        cache.insert("k", &payload("new", 10));
        assert_eq!(cache.get::<Payload>("k").unwrap().name, "new");
    }

    #[test]
    fn replacing_a_key_adjusts_byte_total() {
        let (cache, _clock) = cache(10_000);
        cache.insert("k", &payload("a", 100));
        let after_first = cache.total_bytes();

        cache.insert("k", &payload("a", 10));
        assert!(cache.total_bytes() < after_first);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn eviction_drops_oldest_first_and_stays_under_budget() {
        let (cache, clock) = cache(1_000);

        // ~430 bytes serialized each; the third insert overflows the budget.
        cache.insert("first", &payload("first", 400));
        clock.advance(Duration::from_secs(1));
        cache.insert("second", &payload("second", 400));
        clock.advance(Duration::from_secs(1));
        cache.insert("third", &payload("third", 400));

        assert!(cache.total_bytes() <= 1_000, "at or under budget after insert");
        assert!(cache.get::<Payload>("first").is_none(), "oldest evicted");
        assert!(cache.get::<Payload>("second").is_some());
        assert!(cache.get::<Payload>("third").is_some());
    }

    #[test]
    fn expired_entries_are_purged_before_live_ones_are_evicted() {
        let (cache, clock) = cache(1_000);
        cache.insert("stale", &payload("stale", 400));
        clock.advance(Duration::from_secs(601));

        cache.insert("live", &payload("live", 400));
        clock.advance(Duration::from_secs(1));
        cache.insert("more", &payload("more", 400));

        assert!(cache.get::<Payload>("stale").is_none());
        assert!(cache.get::<Payload>("live").is_some(), "live survived; stale paid");
        assert!(cache.get::<Payload>("more").is_some());
    }

    #[test]
    fn oversized_entry_is_not_cached() {
        let (cache, _clock) = cache(100);
        cache.insert("big", &payload("big", 500));
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.total_bytes(), 0);
    }

    #[test]
    fn clear_resets_everything() {
        let (cache, _clock) = cache(10_000);
        cache.insert("a", &payload("a", 10));
        cache.insert("b", &payload("b", 10));

        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.total_bytes(), 0);
    }

    #[test]
    fn key_helpers_are_deterministic() {
        assert_eq!(coord_key("weather", 48.85837, 2.294481), "weather:48.858:2.294");
        assert_eq!(coord_key("weather", 48.85842, 2.29441), "weather:48.858:2.294");
        assert_eq!(query_key("geocode", "  Eiffel Tower "), "geocode:eiffel tower");
    }
}
