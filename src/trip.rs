//! Trip domain types.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// WGS84 point. Validity is checked at the gateway and repository edges,
/// not enforced by construction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }

    /// Identity for "the same place": 3-decimal rounding, ~110 m.
    pub fn location_id(&self) -> String {
        format!("loc_{}_{}", round3(self.lat), round3(self.lng))
    }

    /// Human-readable fallback when no geocoder could name this point.
    pub fn display(&self) -> String {
        format!("{:.4}, {:.4}", self.lat, self.lng)
    }
}

fn round3(v: f64) -> i64 {
    (v * 1000.0).round() as i64
}

/// Weather at the time a trip was logged; optional decoration, captured
/// once at creation and never refreshed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherSnapshot {
    pub condition: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature_c: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub humidity_pct: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wind_kph: Option<f64>,
}

/// A logged visit. `trip_date` is the calendar day the trip happened,
/// which the user may backdate; `created_at_ms` is when the record was
/// written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trip {
    pub id: String,
    pub user_id: String,
    pub coords: Coordinates,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// 1..=5 once set.
    pub rating: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trip_date: Option<NaiveDate>,
    pub created_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weather: Option<WeatherSnapshot>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub companions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_hours: Option<f32>,
}

/// Media captured on the device, not yet uploaded. The device capability
/// wrapper hands us bytes plus a name; everything else is its problem.
#[derive(Debug, Clone)]
pub struct MediaSource {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// What the log-trip flow submits. Location and a non-zero rating are
/// mandatory; everything else is optional color.
#[derive(Debug, Clone, Default)]
pub struct TripDraft {
    pub coords: Option<Coordinates>,
    pub address: Option<String>,
    pub photo: Option<MediaSource>,
    pub audio: Option<MediaSource>,
    pub description: Option<String>,
    pub rating: u8,
    pub trip_date: Option<NaiveDate>,
    pub weather: Option<WeatherSnapshot>,
    pub tags: Vec<String>,
    pub companions: Vec<String>,
    pub duration_hours: Option<f32>,
}

/// Aggregate of every rating ever given to one rounded location, from any
/// trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationRating {
    pub id: String,
    pub ratings: Vec<u8>,
    pub average: f64,
    pub count: usize,
}

impl LocationRating {
    pub fn new(id: String) -> Self {
        Self { id, ratings: Vec::new(), average: 0.0, count: 0 }
    }

    /// Append and recompute; average stays mean(ratings) and count stays
    /// len(ratings) by construction.
    pub fn record(&mut self, rating: u8) {
        self.ratings.push(rating);
        self.count = self.ratings.len();
        let sum: u32 = self.ratings.iter().map(|&r| u32::from(r)).sum();
        self.average = f64::from(sum) / self.count as f64;
    }
}
