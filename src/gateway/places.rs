//! Nearby-activities gateway (Yelp-style business search) with
//! multi-category fan-out.
//!
//! For each configured category the gateway tries up to two search-term
//! synonyms against one pseudo-randomly chosen sub-area, keeping the
//! first non-empty result and pausing between successful fetches to stay
//! inside the provider's spacing limits. The moment the limiter denies a
//! request the fan-out stops and whatever was collected so far is
//! returned; partial results beat no results. Listings are deduplicated
//! by id across the whole sweep.
//!
//! Area/synonym randomness is content variety, not correctness; the RNG
//! is seedable so tests are deterministic.

use super::ApiContext;
use crate::activity::{ActivityRecord, PlaceDetails};
use crate::cache::query_key;
use crate::config::SERVICE_PLACES;
use crate::error::ApiError;
use crate::trip::Coordinates;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A business category and its search-term synonyms, tried in order.
#[derive(Debug, Clone)]
pub struct CategorySpec {
    pub name: &'static str,
    pub terms: [&'static str; 2],
}

#[derive(Debug, Clone)]
pub struct PlacesConfig {
    pub api_key: String,
    pub base_url: String,
    pub categories: Vec<CategorySpec>,
    /// Named sub-regions to scatter searches across.
    pub areas: Vec<&'static str>,
    /// Pause between successful category fetches.
    pub request_delay: Duration,
    /// Results requested per search.
    pub search_limit: usize,
    /// Fixed seed for deterministic area selection in tests.
    pub rng_seed: Option<u64>,
}

impl PlacesConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: "https://api.yelp.com/v3".to_string(),
            categories: default_categories(),
            areas: vec!["downtown", "old town", "riverside", "harbor", "midtown"],
            request_delay: Duration::from_millis(300),
            search_limit: 20,
            rng_seed: None,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng_seed = Some(seed);
        self
    }

    pub fn with_request_delay(mut self, delay: Duration) -> Self {
        self.request_delay = delay;
        self
    }
}

fn default_categories() -> Vec<CategorySpec> {
    vec![
        CategorySpec { name: "restaurants", terms: ["restaurants", "food"] },
        CategorySpec { name: "museums", terms: ["museums", "galleries"] },
        CategorySpec { name: "outdoors", terms: ["hiking", "parks"] },
        CategorySpec { name: "nightlife", terms: ["nightlife", "bars"] },
        CategorySpec { name: "shopping", terms: ["shopping", "markets"] },
    ]
}

pub struct PlacesGateway {
    ctx: Arc<ApiContext>,
    cfg: PlacesConfig,
    rng: Mutex<StdRng>,
}

impl PlacesGateway {
    pub fn new(ctx: Arc<ApiContext>, cfg: PlacesConfig) -> Self {
        let rng = match cfg.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self { ctx, cfg, rng: Mutex::new(rng) }
    }

    /// Sweep all configured categories around `region`, deduplicated by
    /// listing id. Returns whatever was collected when the limiter cuts
    /// the sweep short.
    pub async fn fetch_activities(&self, region: &str) -> Result<Vec<ActivityRecord>, ApiError> {
        let region = region.trim();
        if region.is_empty() {
            return Err(ApiError::Validation("region must not be empty".into()));
        }
        if self.cfg.api_key.trim().is_empty() {
            return Err(ApiError::Validation("places API key not configured".into()));
        }

        let cache_key = query_key("activities", region);
        if let Some(hit) = self.ctx.cache.get::<Vec<ActivityRecord>>(&cache_key) {
            tracing::debug!(region, "activities cache hit");
            return Ok(hit);
        }

        let mut collected: Vec<ActivityRecord> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut first_error: Option<ApiError> = None;

        'categories: for category in &self.cfg.categories {
            let area = self.pick_area();
            let mut fetched_any = false;

            for term in category.terms {
                match self.ctx.limiter.check_admission(SERVICE_PLACES).await {
                    d if d.is_allowed() => {}
                    d => {
                        // Out of quota mid-sweep: keep what we have.
                        tracing::info!(
                            region,
                            category = category.name,
                            wait = ?d.wait(),
                            "limiter stopped activities fan-out; returning partial results"
                        );
                        break 'categories;
                    }
                }

                match self.search(region, area, term).await {
                    Ok(records) if records.is_empty() => continue,
                    Ok(records) => {
                        for record in records {
                            if seen.insert(record.id.clone()) {
                                collected.push(record);
                            }
                        }
                        fetched_any = true;
                        break;
                    }
                    Err(e) if e.is_rate_limited() => {
                        tracing::info!(error = %e, "provider throttled activities fan-out");
                        first_error.get_or_insert(e);
                        break 'categories;
                    }
                    Err(e) => {
                        tracing::warn!(
                            category = category.name,
                            term,
                            error = %e,
                            "activities search failed; skipping term"
                        );
                        first_error.get_or_insert(e);
                    }
                }
            }

            if fetched_any {
                self.ctx.sleeper.sleep(self.cfg.request_delay).await;
            }
        }

        if collected.is_empty() {
            if let Some(e) = first_error {
                return Err(e);
            }
            return Ok(Vec::new());
        }

        self.ctx.cache.insert(&cache_key, &collected);
        Ok(collected)
    }

    fn pick_area(&self) -> &'static str {
        let mut rng = self.rng.lock().unwrap();
        let idx = rng.random_range(0..self.cfg.areas.len());
        self.cfg.areas[idx]
    }

    async fn search(
        &self,
        region: &str,
        area: &str,
        term: &str,
    ) -> Result<Vec<ActivityRecord>, ApiError> {
        let url = format!("{}/businesses/search", self.cfg.base_url);
        let query = [
            ("location", format!("{area}, {region}")),
            ("term", term.to_string()),
            ("limit", self.cfg.search_limit.to_string()),
            ("sort_by", "rating".to_string()),
        ];
        let body = self
            .ctx
            .governor
            .run(|| self.ctx.http.get_json(SERVICE_PLACES, &url, &query))
            .await?;

        let businesses = body
            .get("businesses")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        Ok(businesses.iter().filter_map(|b| normalize(b, area)).collect())
    }
}

/// Yelp business JSON → [`ActivityRecord`]. Listings missing any
/// mandatory field are discarded here, before they ever reach a cache.
fn normalize(business: &Value, area: &str) -> Option<ActivityRecord> {
    let id = non_empty(business.get("id")?)?;
    let title = non_empty(business.get("name")?)?;
    let url = non_empty(business.get("url")?)?;

    let categories: Vec<String> = business
        .get("categories")
        .and_then(Value::as_array)
        .map(|cats| {
            cats.iter()
                .filter_map(|c| c.get("title").and_then(Value::as_str))
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default();

    let address = business
        .pointer("/location/display_address")
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join(", ")
        })
        .filter(|s| !s.is_empty());

    let coordinates = match (
        business.pointer("/coordinates/latitude").and_then(Value::as_f64),
        business.pointer("/coordinates/longitude").and_then(Value::as_f64),
    ) {
        (Some(lat), Some(lng)) => Some(Coordinates::new(lat, lng)),
        _ => None,
    };

    Some(ActivityRecord {
        id,
        title,
        url,
        description: (!categories.is_empty()).then(|| categories.join(", ")),
        image_url: business
            .get("image_url")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_owned),
        classification: categories.first().cloned(),
        rating: business.get("rating").and_then(Value::as_f64).unwrap_or(0.0) as f32,
        price_tier: business
            .get("price")
            .and_then(Value::as_str)
            .map(|p| p.chars().filter(|&c| c == '$').count() as u8)
            .filter(|&t| t > 0),
        address,
        place: Some(PlaceDetails {
            coordinates,
            category: categories.first().cloned(),
            area: Some(area.to_string()),
            phone: business
                .get("display_phone")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_owned),
            review_count: business
                .get("review_count")
                .and_then(Value::as_u64)
                .and_then(|c| u32::try_from(c).ok()),
        }),
    })
}

fn non_empty(value: &Value) -> Option<String> {
    value.as_str().map(str::trim).filter(|s| !s.is_empty()).map(str::to_owned)
}
