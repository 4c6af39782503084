//! Trip repository: CRUD over the user's trips with attached media.
//!
//! Every store mutation goes through the generic retry policy; reads that
//! power the UI (`list`, `subscribe`) never propagate errors, they
//! degrade to an empty list. Media blobs are uploaded before the trip
//! document is written and best-effort deleted after it is removed.
//!
//! The per-location rating aggregate is a secondary index: its update is
//! attempted after every successful create/update, and its failure is
//! logged, never surfaced; the trip itself is the source of truth.

use crate::clock::Clock;
use crate::error::StoreError;
use crate::retry::RetryPolicy;
use crate::store::{
    sanitize_for_storage, AuthProvider, BlobStore, DocumentStore, UserId,
};
use crate::trip::{Coordinates, LocationRating, Trip, TripDraft};
use std::sync::Arc;
use tokio::task::JoinHandle;

pub struct TripRepository {
    auth: Arc<dyn AuthProvider>,
    docs: Arc<dyn DocumentStore>,
    blobs: Arc<dyn BlobStore>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy<StoreError>,
}

/// Handle for an active trip subscription; dropping it (or calling
/// [`unsubscribe`]) stops the callbacks.
///
/// [`unsubscribe`]: TripSubscription::unsubscribe
pub struct TripSubscription {
    task: Option<JoinHandle<()>>,
}

impl TripSubscription {
    fn inert() -> Self {
        Self { task: None }
    }

    pub fn unsubscribe(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for TripSubscription {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl TripRepository {
    pub fn new(
        auth: Arc<dyn AuthProvider>,
        docs: Arc<dyn DocumentStore>,
        blobs: Arc<dyn BlobStore>,
        clock: Arc<dyn Clock>,
        retry: RetryPolicy<StoreError>,
    ) -> Self {
        Self { auth, docs, blobs, clock, retry }
    }

    // Trailing slash keeps "u1" from matching "u10" documents.
    fn trips_prefix(user: &UserId) -> String {
        format!("trips/{}/", user.as_str())
    }

    fn trip_path(user: &UserId, trip_id: &str) -> String {
        format!("trips/{}/{}", user.as_str(), trip_id)
    }

    fn rating_path(location_id: &str) -> String {
        format!("location_ratings/{location_id}")
    }

    /// Validate, upload media, write the trip, then update the location
    /// rating aggregate (best effort).
    pub async fn create(&self, draft: TripDraft) -> Result<Trip, StoreError> {
        let user = self.auth.current_user().ok_or(StoreError::Unauthenticated)?;

        let coords = draft
            .coords
            .ok_or_else(|| StoreError::InvalidArgument("a trip needs a location".into()))?;
        if !coords.is_valid() {
            return Err(StoreError::InvalidArgument(format!(
                "coordinates out of range: {}, {}",
                coords.lat, coords.lng
            )));
        }
        if !(1..=5).contains(&draft.rating) {
            return Err(StoreError::InvalidArgument(format!(
                "rating must be 1-5, got {}",
                draft.rating
            )));
        }

        let now = self.clock.now_millis();
        let photo_url = match &draft.photo {
            Some(media) => Some(
                self.upload_media(&user, "photos", &media.file_name, media.bytes.clone())
                    .await?,
            ),
            None => None,
        };
        let audio_url = match &draft.audio {
            Some(media) => Some(
                self.upload_media(&user, "audio", &media.file_name, media.bytes.clone())
                    .await?,
            ),
            None => None,
        };

        let mut trip = Trip {
            id: String::new(),
            user_id: user.as_str().to_string(),
            coords,
            address: draft.address,
            photo_url,
            audio_url,
            description: draft.description,
            rating: draft.rating,
            trip_date: draft.trip_date,
            created_at_ms: now,
            weather: draft.weather,
            tags: draft.tags,
            companions: draft.companions,
            duration_hours: draft.duration_hours,
        };

        let value = serde_json::to_value(&trip)
            .map_err(|e| StoreError::InvalidArgument(e.to_string()))?;
        let prefix = Self::trips_prefix(&user);
        let docs = self.docs.clone();
        let id = self
            .retry
            .execute(|| {
                let docs = docs.clone();
                let prefix = prefix.clone();
                let value = sanitize_for_storage(value.clone());
                async move { docs.add(&prefix, value).await }
            })
            .await?;
        trip.id = id.clone();

        // The document carries its own id for straightforward decoding.
        let path = Self::trip_path(&user, &id);
        let value = serde_json::to_value(&trip)
            .map_err(|e| StoreError::InvalidArgument(e.to_string()))?;
        let docs = self.docs.clone();
        self.retry
            .execute(|| {
                let docs = docs.clone();
                let path = path.clone();
                let value = sanitize_for_storage(value.clone());
                async move { docs.write(&path, value).await }
            })
            .await?;

        if let Err(e) = self.record_location_rating(coords, trip.rating).await {
            tracing::warn!(trip_id = %trip.id, error = %e, "location rating aggregate update failed");
        }

        tracing::info!(trip_id = %trip.id, "trip created");
        Ok(trip)
    }

    /// All trips for the current user, newest first. Never errors: no
    /// user or a failed read yields an empty list.
    pub async fn list(&self) -> Vec<Trip> {
        let Some(user) = self.auth.current_user() else {
            return Vec::new();
        };

        let prefix = Self::trips_prefix(&user);
        let docs = self.docs.clone();
        let result = self
            .retry
            .execute(|| {
                let docs = docs.clone();
                let prefix = prefix.clone();
                async move { docs.list(&prefix).await }
            })
            .await;

        let documents = match result {
            Ok(documents) => documents,
            Err(e) => {
                tracing::warn!(error = %e, "trip list unavailable; rendering empty");
                return Vec::new();
            }
        };

        let mut trips: Vec<Trip> = documents
            .into_iter()
            .filter_map(|(path, value)| match serde_json::from_value(value) {
                Ok(trip) => Some(trip),
                Err(e) => {
                    tracing::warn!(path, error = %e, "skipping malformed trip document");
                    None
                }
            })
            .collect();
        trips.sort_by(|a, b| b.created_at_ms.cmp(&a.created_at_ms));
        trips
    }

    /// Change a trip's star rating; appends to the location aggregate.
    pub async fn update_rating(&self, trip_id: &str, rating: u8) -> Result<Trip, StoreError> {
        let user = self.auth.current_user().ok_or(StoreError::Unauthenticated)?;
        if !(1..=5).contains(&rating) {
            return Err(StoreError::InvalidArgument(format!(
                "rating must be 1-5, got {rating}"
            )));
        }

        let mut trip = self.get(&user, trip_id).await?;
        trip.rating = rating;

        let path = Self::trip_path(&user, trip_id);
        let value = serde_json::to_value(&trip)
            .map_err(|e| StoreError::InvalidArgument(e.to_string()))?;
        let docs = self.docs.clone();
        self.retry
            .execute(|| {
                let docs = docs.clone();
                let path = path.clone();
                let value = sanitize_for_storage(value.clone());
                async move { docs.write(&path, value).await }
            })
            .await?;

        if let Err(e) = self.record_location_rating(trip.coords, rating).await {
            tracing::warn!(trip_id, error = %e, "location rating aggregate update failed");
        }
        Ok(trip)
    }

    /// Remove a trip; its media blobs are deleted best-effort first.
    pub async fn delete(&self, trip_id: &str) -> Result<(), StoreError> {
        let user = self.auth.current_user().ok_or(StoreError::Unauthenticated)?;
        let trip = self.get(&user, trip_id).await?;

        for url in [&trip.photo_url, &trip.audio_url].into_iter().flatten() {
            if let Err(e) = self.blobs.delete(url).await {
                tracing::warn!(url, error = %e, "orphaned media blob");
            }
        }

        let path = Self::trip_path(&user, trip_id);
        let docs = self.docs.clone();
        self.retry
            .execute(|| {
                let docs = docs.clone();
                let path = path.clone();
                async move { docs.delete(&path).await }
            })
            .await?;
        tracing::info!(trip_id, "trip deleted");
        Ok(())
    }

    /// Push the full re-sorted trip list to `callback` on every store
    /// change for the current user. Unauthenticated: one immediate empty
    /// callback, no watching.
    pub fn subscribe<F>(self: &Arc<Self>, callback: F) -> TripSubscription
    where
        F: Fn(Vec<Trip>) + Send + Sync + 'static,
    {
        let Some(user) = self.auth.current_user() else {
            callback(Vec::new());
            return TripSubscription::inert();
        };

        let prefix = Self::trips_prefix(&user);
        let mut events = self.docs.watch(&prefix);
        let repo = self.clone();
        let task = tokio::spawn(async move {
            callback(repo.list().await);
            loop {
                match events.recv().await {
                    Ok(event) if event.path.starts_with(&prefix) => {
                        callback(repo.list().await);
                    }
                    Ok(_) => {}
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {
                        // Dropped notifications are fine; the next refresh
                        // reads the whole list anyway.
                        callback(repo.list().await);
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        TripSubscription { task: Some(task) }
    }

    /// The aggregate of all ratings at a rounded location, shared across
    /// trips.
    pub async fn location_rating(&self, coords: Coordinates) -> Option<LocationRating> {
        let path = Self::rating_path(&coords.location_id());
        match self.docs.read(&path).await {
            Ok(Some(value)) => serde_json::from_value(value).ok(),
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(path, error = %e, "location rating unavailable");
                None
            }
        }
    }

    async fn get(&self, user: &UserId, trip_id: &str) -> Result<Trip, StoreError> {
        let path = Self::trip_path(user, trip_id);
        let value = self
            .docs
            .read(&path)
            .await?
            .ok_or_else(|| StoreError::NotFound(path.clone()))?;
        serde_json::from_value(value)
            .map_err(|e| StoreError::InvalidArgument(format!("trip at {path}: {e}")))
    }

    async fn upload_media(
        &self,
        user: &UserId,
        kind: &str,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<String, StoreError> {
        let path = format!(
            "{kind}/{}/{}_{file_name}",
            user.as_str(),
            self.clock.now_millis()
        );
        let blobs = self.blobs.clone();
        self.retry
            .execute(|| {
                let blobs = blobs.clone();
                let path = path.clone();
                let bytes = bytes.clone();
                async move { blobs.upload(&path, bytes).await }
            })
            .await
    }

    async fn record_location_rating(
        &self,
        coords: Coordinates,
        rating: u8,
    ) -> Result<(), StoreError> {
        let location_id = coords.location_id();
        let path = Self::rating_path(&location_id);

        let mut aggregate = match self.docs.read(&path).await? {
            Some(value) => serde_json::from_value(value)
                .unwrap_or_else(|_| LocationRating::new(location_id.clone())),
            None => LocationRating::new(location_id.clone()),
        };
        aggregate.record(rating);

        let value = serde_json::to_value(&aggregate)
            .map_err(|e| StoreError::InvalidArgument(e.to_string()))?;
        self.docs.write(&path, sanitize_for_storage(value)).await
    }
}
