#![forbid(unsafe_code)]
#![deny(warnings)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # Wayfarer 🧭
//!
//! The client core of the Wayfarer trip journal: every piece of logic
//! that sits between the screens and the outside world.
//!
//! ## What lives here
//!
//! - **Rate limiting** with persisted sliding windows per external service
//! - **Request queueing** that caps concurrent calls per API client, FIFO
//! - **Response caching**, byte-bounded with TTL expiry
//! - **Gateway functions** for weather, places, and geocoding, with
//!   provider fallback and normalization into domain types
//! - **A persistent activity cache** with freshness and
//!   never-downgrade-real-data rules
//! - **Statistics and achievements** recomputed as pure folds over trips
//! - **A trip repository** with media upload, retries, and subscriptions
//!
//! Screens, device capability prompts, and the backend product itself are
//! collaborators behind narrow traits; none of them live in this crate.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use wayfarer::{
//!     CoreConfig, Governor, ManualClock, MemoryWindowStore, RateLimiter, ResponseCache,
//!     default_service_limits,
//! };
//!
//! #[tokio::main]
//! async fn main() {
//!     let clock = Arc::new(ManualClock::new(1_700_000_000_000));
//!     let config = CoreConfig::default();
//!     let limiter = RateLimiter::new(
//!         default_service_limits(),
//!         Arc::new(MemoryWindowStore::new()),
//!         clock.clone(),
//!     );
//!     let governor = Governor::new(config.max_concurrent_requests);
//!     let cache = ResponseCache::new(config.cache_ttl, config.cache_max_bytes, clock);
//!
//!     assert!(limiter.check_admission("yelp").await.is_allowed());
//!     assert_eq!(governor.status().active, 0);
//!     assert!(cache.is_empty());
//! }
//! ```

pub mod activity;
pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod gateway;
pub mod governor;
pub mod http;
pub mod limiter;
pub mod repo;
pub mod retry;
pub mod sleeper;
pub mod stats;
pub mod store;
pub mod trip;

// Re-exports
pub use activity::{
    ActivityCache, ActivityRecord, Bucket, BucketKey, BucketMeta, PlaceDetails, StoreOutcome,
};
pub use cache::{coord_key, query_key, ResponseCache};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{default_service_limits, CoreConfig};
pub use error::{ApiError, ProviderErrorKind, StoreError};
pub use gateway::{
    ApiContext, CategorySpec, GeocodeConfig, GeocodeGateway, PlacesConfig, PlacesGateway,
    WeatherConfig, WeatherGateway,
};
pub use governor::{Governor, GovernorStatus};
pub use http::HttpClient;
pub use limiter::{
    Decision, DocumentWindowStore, MemoryWindowStore, RateLimiter, ServiceLimits, WindowRule,
    WindowStore,
};
pub use repo::{TripRepository, TripSubscription};
pub use retry::{RetryPolicy, RetryPolicyBuilder};
pub use sleeper::{InstantSleeper, Sleeper, TokioSleeper, TrackingSleeper};
pub use stats::{
    category_progress, compute_stats, compute_streaks, evaluate_achievements, AchievementDef,
    AchievementRule, AchievementStatus, CategoryProgress, Rarity, Season, StatsService, Streaks,
    UserStats,
};
pub use store::{
    sanitize_for_storage, AuthProvider, BlobStore, DocumentStore, MemoryAuth, MemoryBlobStore,
    MemoryDocumentStore, UserId,
};
pub use trip::{Coordinates, LocationRating, MediaSource, Trip, TripDraft, WeatherSnapshot};
