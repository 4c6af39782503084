//! Activity listings and their persistent per-bucket cache.
//!
//! Listings fetched from the places provider are parked in the document
//! store under `(country, category)` buckets with freshness metadata.
//! Policy, not plumbing, lives here:
//! - freshness is a pure function of elapsed time and two flags
//!   (real-vs-fallback data, provider quota exhausted);
//! - fallback data never overwrites real data;
//! - every record is validated and sanitized before it is persisted;
//! - buckets are replaced wholesale, never patched in place.

use crate::clock::Clock;
use crate::error::StoreError;
use crate::store::{sanitize_for_storage, DocumentStore};
use crate::trip::Coordinates;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Structured place metadata attached to a listing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlaceDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Coordinates>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_count: Option<u32>,
}

/// One activity/business listing, normalized from the provider's shape.
/// `id`, `title`, and `url` are mandatory; a record missing any of them
/// is rejected before persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub id: String,
    pub title: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classification: Option<String>,
    #[serde(default)]
    pub rating: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_tier: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub place: Option<PlaceDetails>,
}

impl ActivityRecord {
    /// Mandatory-field check; the store never sees a record failing this.
    pub fn is_storable(&self) -> bool {
        !self.id.trim().is_empty() && !self.title.trim().is_empty() && !self.url.trim().is_empty()
    }

    /// Coerce out-of-range fields instead of rejecting the whole record.
    pub fn sanitized(mut self) -> Self {
        self.rating = self.rating.clamp(0.0, 5.0);
        self
    }
}

/// Bucket address: one country/category pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BucketKey {
    pub country: String,
    pub category: String,
}

impl BucketKey {
    pub fn new(country: impl Into<String>, category: impl Into<String>) -> Self {
        Self { country: country.into(), category: category.into() }
    }

    fn path(&self) -> String {
        format!("activity_cache/{}/{}", self.country.to_lowercase(), self.category.to_lowercase())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketMeta {
    pub last_fetched_ms: u64,
    pub is_real_data: bool,
    pub quota_exceeded: bool,
    #[serde(default)]
    pub category_counts: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bucket {
    pub records: Vec<ActivityRecord>,
    pub meta: BucketMeta,
}

/// What a store call did, for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOutcome {
    Stored { kept: usize, dropped: usize },
    SkippedEmpty,
    /// Incoming fallback data would have clobbered real data.
    SkippedDowngrade,
}

pub struct ActivityCache {
    docs: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
    fresh_after: Duration,
    quota_cooldown: Duration,
    max_records: usize,
}

impl ActivityCache {
    pub fn new(
        docs: Arc<dyn DocumentStore>,
        clock: Arc<dyn Clock>,
        fresh_after: Duration,
        quota_cooldown: Duration,
        max_records: usize,
    ) -> Self {
        Self { docs, clock, fresh_after, quota_cooldown, max_records }
    }

    pub async fn load(&self, key: &BucketKey) -> Result<Option<Bucket>, StoreError> {
        let Some(value) = self.docs.read(&key.path()).await? else {
            return Ok(None);
        };
        match serde_json::from_value(value) {
            Ok(bucket) => Ok(Some(bucket)),
            Err(e) => {
                tracing::warn!(path = key.path(), error = %e, "dropping malformed bucket");
                Ok(None)
            }
        }
    }

    /// Freshness decision. Thresholds by state:
    /// - absent bucket: always fetch;
    /// - quota exceeded: fetch only after the long cooldown;
    /// - fallback data: always fetch (placeholders never satisfy);
    /// - real data: fetch once the normal threshold has elapsed.
    pub fn needs_fresh_data(&self, bucket: Option<&Bucket>) -> bool {
        let Some(bucket) = bucket else {
            return true;
        };
        let elapsed = Duration::from_millis(
            self.clock.now_millis().saturating_sub(bucket.meta.last_fetched_ms),
        );
        if bucket.meta.quota_exceeded {
            return elapsed >= self.quota_cooldown;
        }
        if !bucket.meta.is_real_data {
            return true;
        }
        elapsed >= self.fresh_after
    }

    /// Validate, cap, and replace the bucket wholesale.
    pub async fn store_records(
        &self,
        key: &BucketKey,
        records: Vec<ActivityRecord>,
        is_real_data: bool,
        quota_exceeded: bool,
    ) -> Result<StoreOutcome, StoreError> {
        if records.is_empty() {
            tracing::debug!(path = key.path(), "ignoring empty batch");
            return Ok(StoreOutcome::SkippedEmpty);
        }

        // Fallback data must never clobber good data.
        if !is_real_data && !quota_exceeded {
            if let Some(existing) = self.load(key).await? {
                if existing.meta.is_real_data && !existing.meta.quota_exceeded {
                    tracing::debug!(path = key.path(), "keeping real data over fallback batch");
                    return Ok(StoreOutcome::SkippedDowngrade);
                }
            }
        }

        let incoming = records.len();
        let mut kept: Vec<ActivityRecord> = records
            .into_iter()
            .filter(|r| {
                let ok = r.is_storable();
                if !ok {
                    tracing::warn!(id = %r.id, "dropping record with missing id/title/url");
                }
                ok
            })
            .map(ActivityRecord::sanitized)
            .collect();
        kept.truncate(self.max_records);
        let dropped = incoming - kept.len();

        let mut category_counts: BTreeMap<String, usize> = BTreeMap::new();
        for record in &kept {
            let category = record
                .place
                .as_ref()
                .and_then(|p| p.category.clone())
                .or_else(|| record.classification.clone())
                .unwrap_or_else(|| "uncategorized".to_string());
            *category_counts.entry(category).or_insert(0) += 1;
        }

        let bucket = Bucket {
            records: kept,
            meta: BucketMeta {
                last_fetched_ms: self.clock.now_millis(),
                is_real_data,
                quota_exceeded,
                category_counts,
            },
        };
        let kept_count = bucket.records.len();

        let value = serde_json::to_value(&bucket)
            .map_err(|e| StoreError::InvalidArgument(e.to_string()))?;
        self.docs.write(&key.path(), sanitize_for_storage(value)).await?;

        Ok(StoreOutcome::Stored { kept: kept_count, dropped })
    }

    /// User-triggered "refresh everything": every bucket goes, freshness
    /// checks pass trivially on the next read.
    pub async fn clear_all(&self) -> Result<(), StoreError> {
        self.docs.delete_prefix("activity_cache/").await
    }
}
