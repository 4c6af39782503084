//! Current-conditions gateway (AccuWeather-style two-step protocol).
//!
//! The provider resolves coordinates to an opaque location key first,
//! then serves conditions for that key. The key rarely changes for a
//! given point, so it gets its own cache entry; the two fresh calls are
//! separated by a configured delay to satisfy the provider's spacing
//! window.

use super::ApiContext;
use crate::cache::coord_key;
use crate::config::SERVICE_WEATHER;
use crate::error::{ApiError, ProviderErrorKind};
use crate::trip::{Coordinates, WeatherSnapshot};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct WeatherConfig {
    pub api_key: String,
    pub base_url: String,
    /// Delay between the location-key call and the conditions call.
    pub step_delay: Duration,
}

impl WeatherConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: "https://dataservice.accuweather.com".to_string(),
            step_delay: Duration::from_millis(3000),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_step_delay(mut self, delay: Duration) -> Self {
        self.step_delay = delay;
        self
    }
}

pub struct WeatherGateway {
    ctx: Arc<ApiContext>,
    cfg: WeatherConfig,
}

impl WeatherGateway {
    pub fn new(ctx: Arc<ApiContext>, cfg: WeatherConfig) -> Self {
        Self { ctx, cfg }
    }

    /// Current conditions at `coords`.
    pub async fn current(&self, coords: Coordinates) -> Result<WeatherSnapshot, ApiError> {
        let cache_key = coord_key("weather", coords.lat, coords.lng);
        if let Some(hit) = self.ctx.cache.get::<WeatherSnapshot>(&cache_key) {
            tracing::debug!(%cache_key, "weather cache hit");
            return Ok(hit);
        }

        if !coords.is_valid() {
            return Err(ApiError::Validation(format!(
                "coordinates out of range: {}, {}",
                coords.lat, coords.lng
            )));
        }
        if self.cfg.api_key.trim().is_empty() {
            return Err(ApiError::Validation("weather API key not configured".into()));
        }

        let location_key = self.location_key(coords).await?;
        let snapshot = self.conditions(&location_key).await?;

        self.ctx.cache.insert(&cache_key, &snapshot);
        Ok(snapshot)
    }

    /// Step one: coordinates → provider location key. Cached on its own
    /// since the mapping is effectively static. When fetched fresh, the
    /// follow-up conditions call waits out the spacing window.
    async fn location_key(&self, coords: Coordinates) -> Result<String, ApiError> {
        let cache_key = coord_key("weather-lockey", coords.lat, coords.lng);
        if let Some(hit) = self.ctx.cache.get::<String>(&cache_key) {
            return Ok(hit);
        }

        self.ctx.admit(SERVICE_WEATHER).await?;
        let url = format!("{}/locations/v1/cities/geoposition/search", self.cfg.base_url);
        let query = [
            ("apikey", self.cfg.api_key.clone()),
            ("q", format!("{},{}", coords.lat, coords.lng)),
        ];
        let body = self
            .ctx
            .governor
            .run(|| self.ctx.http.get_json(SERVICE_WEATHER, &url, &query))
            .await?;

        let key = body
            .get("Key")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or(ApiError::Provider {
                service: SERVICE_WEATHER,
                kind: ProviderErrorKind::Malformed,
            })?;

        self.ctx.cache.insert(&cache_key, &key);
        self.ctx.sleeper.sleep(self.cfg.step_delay).await;
        Ok(key)
    }

    /// Step two: location key → normalized snapshot.
    async fn conditions(&self, location_key: &str) -> Result<WeatherSnapshot, ApiError> {
        self.ctx.admit(SERVICE_WEATHER).await?;
        let url = format!("{}/currentconditions/v1/{}", self.cfg.base_url, location_key);
        let query =
            [("apikey", self.cfg.api_key.clone()), ("details", "true".to_string())];
        let body = self
            .ctx
            .governor
            .run(|| self.ctx.http.get_json(SERVICE_WEATHER, &url, &query))
            .await?;

        let current = body.get(0).ok_or(ApiError::Provider {
            service: SERVICE_WEATHER,
            kind: ProviderErrorKind::Malformed,
        })?;
        normalize(current)
    }
}

fn normalize(current: &Value) -> Result<WeatherSnapshot, ApiError> {
    let condition = current
        .get("WeatherText")
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or(ApiError::Provider {
            service: SERVICE_WEATHER,
            kind: ProviderErrorKind::Malformed,
        })?;

    Ok(WeatherSnapshot {
        description: current
            .get("WeatherText")
            .and_then(Value::as_str)
            .map(|s| s.to_lowercase()),
        temperature_c: current
            .pointer("/Temperature/Metric/Value")
            .and_then(Value::as_f64),
        humidity_pct: current
            .get("RelativeHumidity")
            .and_then(Value::as_u64)
            .and_then(|h| u8::try_from(h).ok()),
        wind_kph: current.pointer("/Wind/Speed/Metric/Value").and_then(Value::as_f64),
        condition,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn normalize_full_payload() {
        let body = json!({
            "WeatherText": "Partly Cloudy",
            "RelativeHumidity": 64,
            "Temperature": { "Metric": { "Value": 21.5 } },
            "Wind": { "Speed": { "Metric": { "Value": 12.3 } } },
        });

        let snap = normalize(&body).unwrap();
        assert_eq!(snap.condition, "Partly Cloudy");
        assert_eq!(snap.description.as_deref(), Some("partly cloudy"));
        assert_eq!(snap.temperature_c, Some(21.5));
        assert_eq!(snap.humidity_pct, Some(64));
        assert_eq!(snap.wind_kph, Some(12.3));
    }

    #[test]
    fn normalize_tolerates_missing_details() {
        let body = json!({ "WeatherText": "Rain" });
        let snap = normalize(&body).unwrap();
        assert_eq!(snap.condition, "Rain");
        assert_eq!(snap.temperature_c, None);
        assert_eq!(snap.humidity_pct, None);
    }

    #[test]
    fn normalize_requires_condition_text() {
        let body = json!({ "RelativeHumidity": 50 });
        let err = normalize(&body).unwrap_err();
        assert!(matches!(
            err,
            ApiError::Provider { kind: ProviderErrorKind::Malformed, .. }
        ));
    }
}
