//! Geocoding gateway: commercial primary with a Nominatim-style fallback.
//!
//! Forward geocoding (address → coordinates) propagates its final error;
//! reverse geocoding (coordinates → display address) never hard-fails
//! because location display must always render; its last resort is the
//! raw coordinates as text.
//!
//! The fallback provider is attempted once per call and is not charged
//! against the primary's limiter.

use super::ApiContext;
use crate::cache::{coord_key, query_key};
use crate::config::SERVICE_GEOCODE;
use crate::error::{ApiError, ProviderErrorKind};
use crate::trip::Coordinates;
use serde_json::Value;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct GeocodeConfig {
    pub api_key: String,
    pub primary_url: String,
    pub fallback_url: String,
}

impl GeocodeConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            primary_url: "https://us1.locationiq.com/v1".to_string(),
            fallback_url: "https://nominatim.openstreetmap.org".to_string(),
        }
    }

    pub fn with_primary_url(mut self, url: impl Into<String>) -> Self {
        self.primary_url = url.into();
        self
    }

    pub fn with_fallback_url(mut self, url: impl Into<String>) -> Self {
        self.fallback_url = url.into();
        self
    }
}

pub struct GeocodeGateway {
    ctx: Arc<ApiContext>,
    cfg: GeocodeConfig,
}

impl GeocodeGateway {
    pub fn new(ctx: Arc<ApiContext>, cfg: GeocodeConfig) -> Self {
        Self { ctx, cfg }
    }

    /// Address → coordinates. Falls back to the secondary provider on any
    /// non-validation failure; the fallback's failure is final.
    pub async fn forward(&self, address: &str) -> Result<Coordinates, ApiError> {
        let address = address.trim();
        if address.is_empty() {
            return Err(ApiError::Validation("address must not be empty".into()));
        }

        let cache_key = query_key("geocode:fwd", address);
        if let Some(hit) = self.ctx.cache.get::<Coordinates>(&cache_key) {
            return Ok(hit);
        }

        let coords = match self.forward_primary(address).await {
            Ok(coords) => coords,
            Err(e @ ApiError::Validation(_)) => return Err(e),
            Err(primary_err) => {
                tracing::warn!(error = %primary_err, "primary geocoder failed; trying fallback");
                self.forward_fallback(address).await?
            }
        };

        if !coords.is_valid() {
            return Err(ApiError::Provider {
                service: SERVICE_GEOCODE,
                kind: ProviderErrorKind::Malformed,
            });
        }

        self.ctx.cache.insert(&cache_key, &coords);
        Ok(coords)
    }

    /// Coordinates → display address. Degrades to `"lat, lng"` text
    /// rather than erroring; the synthesized form is not cached so a
    /// later call can still recover the real address.
    pub async fn reverse(&self, coords: Coordinates) -> String {
        if !coords.is_valid() {
            return coords.display();
        }

        let cache_key = coord_key("geocode:rev", coords.lat, coords.lng);
        if let Some(hit) = self.ctx.cache.get::<String>(&cache_key) {
            return hit;
        }

        let address = match self.reverse_primary(coords).await {
            Ok(address) => Some(address),
            Err(primary_err) => {
                tracing::warn!(error = %primary_err, "primary reverse geocoder failed; trying fallback");
                self.reverse_fallback(coords).await.ok()
            }
        };

        match address {
            Some(address) => {
                self.ctx.cache.insert(&cache_key, &address);
                address
            }
            None => coords.display(),
        }
    }

    async fn forward_primary(&self, address: &str) -> Result<Coordinates, ApiError> {
        if self.cfg.api_key.trim().is_empty() {
            return Err(ApiError::Validation("geocoding API key not configured".into()));
        }
        self.ctx.admit(SERVICE_GEOCODE).await?;

        let url = format!("{}/search", self.cfg.primary_url);
        let query = [
            ("key", self.cfg.api_key.clone()),
            ("q", address.to_string()),
            ("format", "json".to_string()),
            ("limit", "1".to_string()),
        ];
        let body = self
            .ctx
            .governor
            .run(|| self.ctx.http.get_json(SERVICE_GEOCODE, &url, &query))
            .await?;
        parse_search_hit(&body)
    }

    async fn forward_fallback(&self, address: &str) -> Result<Coordinates, ApiError> {
        let url = format!("{}/search", self.cfg.fallback_url);
        let query = [
            ("q", address.to_string()),
            ("format", "json".to_string()),
            ("limit", "1".to_string()),
        ];
        let body = self
            .ctx
            .governor
            .run(|| self.ctx.http.get_json(SERVICE_GEOCODE, &url, &query))
            .await?;
        parse_search_hit(&body)
    }

    async fn reverse_primary(&self, coords: Coordinates) -> Result<String, ApiError> {
        if self.cfg.api_key.trim().is_empty() {
            return Err(ApiError::Validation("geocoding API key not configured".into()));
        }
        self.ctx.admit(SERVICE_GEOCODE).await?;

        let url = format!("{}/reverse", self.cfg.primary_url);
        let query = [
            ("key", self.cfg.api_key.clone()),
            ("lat", coords.lat.to_string()),
            ("lon", coords.lng.to_string()),
            ("format", "json".to_string()),
        ];
        let body = self
            .ctx
            .governor
            .run(|| self.ctx.http.get_json(SERVICE_GEOCODE, &url, &query))
            .await?;
        parse_display_name(&body)
    }

    async fn reverse_fallback(&self, coords: Coordinates) -> Result<String, ApiError> {
        let url = format!("{}/reverse", self.cfg.fallback_url);
        let query = [
            ("lat", coords.lat.to_string()),
            ("lon", coords.lng.to_string()),
            ("format", "json".to_string()),
        ];
        let body = self
            .ctx
            .governor
            .run(|| self.ctx.http.get_json(SERVICE_GEOCODE, &url, &query))
            .await?;
        parse_display_name(&body)
    }
}

/// Both providers answer searches with `[{lat, lon, ...}]`, coordinates
/// as decimal strings.
fn parse_search_hit(body: &Value) -> Result<Coordinates, ApiError> {
    let malformed = ApiError::Provider {
        service: SERVICE_GEOCODE,
        kind: ProviderErrorKind::Malformed,
    };
    let hit = body.get(0).ok_or_else(|| ApiError::Provider {
        service: SERVICE_GEOCODE,
        kind: ProviderErrorKind::NotFound,
    })?;
    let lat = coordinate_field(hit, "lat").ok_or_else(|| malformed.clone())?;
    let lng = coordinate_field(hit, "lon").ok_or(malformed)?;
    Ok(Coordinates::new(lat, lng))
}

fn coordinate_field(hit: &Value, field: &str) -> Option<f64> {
    match hit.get(field)? {
        Value::String(s) => s.parse().ok(),
        v => v.as_f64(),
    }
}

fn parse_display_name(body: &Value) -> Result<String, ApiError> {
    body.get("display_name")
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or(ApiError::Provider {
            service: SERVICE_GEOCODE,
            kind: ProviderErrorKind::Malformed,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_search_hit_accepts_string_coordinates() {
        let body = json!([{ "lat": "48.8584", "lon": "2.2945" }]);
        let coords = parse_search_hit(&body).unwrap();
        assert!((coords.lat - 48.8584).abs() < 1e-9);
        assert!((coords.lng - 2.2945).abs() < 1e-9);
    }

    #[test]
    fn parse_search_hit_accepts_numeric_coordinates() {
        let body = json!([{ "lat": 35.0116, "lon": 135.7681 }]);
        let coords = parse_search_hit(&body).unwrap();
        assert!((coords.lat - 35.0116).abs() < 1e-9);
    }

    #[test]
    fn empty_result_list_is_not_found() {
        let err = parse_search_hit(&json!([])).unwrap_err();
        assert!(matches!(
            err,
            ApiError::Provider { kind: ProviderErrorKind::NotFound, .. }
        ));
    }

    #[test]
    fn garbage_hit_is_malformed() {
        let err = parse_search_hit(&json!([{ "lat": "not-a-number" }])).unwrap_err();
        assert!(matches!(
            err,
            ApiError::Provider { kind: ProviderErrorKind::Malformed, .. }
        ));
    }

    #[test]
    fn display_name_extraction() {
        let body = json!({ "display_name": "Tour Eiffel, Paris, France" });
        assert_eq!(parse_display_name(&body).unwrap(), "Tour Eiffel, Paris, France");
        assert!(parse_display_name(&json!({})).is_err());
    }
}
