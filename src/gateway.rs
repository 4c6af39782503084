//! Gateway functions over the external HTTP APIs.
//!
//! One submodule per capability: current weather, nearby activities,
//! forward/reverse geocoding. Every gateway follows the same shape:
//! cache probe, input validation, limiter admission, governed HTTP call,
//! provider-error mapping, fallback where one exists, normalization,
//! cache fill.
//!
//! Gateways are long-lived service objects sharing one [`ApiContext`];
//! nothing here is a global (construct once at startup, inject
//! everywhere).

use crate::cache::ResponseCache;
use crate::clock::Clock;
use crate::governor::Governor;
use crate::http::HttpClient;
use crate::limiter::{Decision, RateLimiter};
use crate::sleeper::Sleeper;
use std::sync::Arc;

pub mod geocode;
pub mod places;
pub mod weather;

pub use geocode::{GeocodeConfig, GeocodeGateway};
pub use places::{CategorySpec, PlacesConfig, PlacesGateway};
pub use weather::{WeatherConfig, WeatherGateway};

/// Shared plumbing for all gateways.
pub struct ApiContext {
    pub http: HttpClient,
    pub limiter: Arc<RateLimiter>,
    pub governor: Arc<Governor>,
    pub cache: Arc<ResponseCache>,
    pub sleeper: Arc<dyn Sleeper>,
    pub clock: Arc<dyn Clock>,
}

impl ApiContext {
    /// Limiter admission mapped into the gateway error taxonomy.
    pub(crate) async fn admit(
        &self,
        service: &'static str,
    ) -> Result<(), crate::error::ApiError> {
        match self.limiter.check_admission(service).await {
            Decision::Allowed { .. } => Ok(()),
            Decision::Denied { wait, reason } => {
                tracing::debug!(service, ?wait, reason, "limiter denied outbound call");
                Err(crate::error::ApiError::RateLimited { service, wait })
            }
        }
    }
}
