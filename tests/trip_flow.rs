//! End-to-end flow over in-memory stores: log trips, derive stats and
//! achievements, cache activity listings.

mod common;

use chrono::NaiveDate;
use std::sync::Arc;
use std::time::Duration;
use wayfarer::{
    ActivityCache, ActivityRecord, BucketKey, Clock, Coordinates, InstantSleeper, ManualClock,
    MediaSource, MemoryAuth, MemoryBlobStore, MemoryDocumentStore, RetryPolicy, StatsService,
    StoreError, StoreOutcome, TripDraft, TripRepository,
};

use common::test_helpers::TEST_EPOCH_MS;

struct App {
    repo: Arc<TripRepository>,
    stats: StatsService,
    activities: ActivityCache,
    clock: Arc<ManualClock>,
    auth: Arc<MemoryAuth>,
}

fn app() -> App {
    let auth = Arc::new(MemoryAuth::signed_in("traveler"));
    let docs = Arc::new(MemoryDocumentStore::new());
    let blobs = Arc::new(MemoryBlobStore::new());
    let clock = Arc::new(ManualClock::new(TEST_EPOCH_MS));
    let retry = RetryPolicy::builder()
        .max_retries(2)
        .base_delay(Duration::from_millis(1))
        .jitter(Duration::ZERO)
        .should_retry(StoreError::is_transient)
        .with_sleeper(InstantSleeper)
        .build();

    let repo = Arc::new(TripRepository::new(
        auth.clone(),
        docs.clone(),
        blobs,
        clock.clone(),
        retry,
    ));
    let stats = StatsService::new(repo.clone(), clock.clone());
    let activities = ActivityCache::new(
        docs,
        clock.clone(),
        Duration::from_secs(3 * 3600),
        Duration::from_secs(48 * 3600),
        60,
    );
    App { repo, stats, activities, clock, auth }
}

fn draft_at(lat: f64, lng: f64, rating: u8, date: (i32, u32, u32)) -> TripDraft {
    TripDraft {
        coords: Some(Coordinates::new(lat, lng)),
        rating,
        trip_date: NaiveDate::from_ymd_opt(date.0, date.1, date.2),
        ..TripDraft::default()
    }
}

fn listing(id: &str) -> ActivityRecord {
    ActivityRecord {
        id: id.into(),
        title: format!("Listing {id}"),
        url: format!("https://example.com/{id}"),
        description: None,
        image_url: None,
        classification: Some("museums".into()),
        rating: 4.0,
        price_tier: None,
        address: None,
        place: None,
    }
}

#[tokio::test]
async fn logged_trips_fold_into_stats_and_achievements() {
    let app = app();
    // ManualClock starts on 2023-11-14; backdate a three-day run ending
    // "today".
    let today = app.clock.today();
    let dates = [
        today - chrono::Days::new(2),
        today - chrono::Days::new(1),
        today,
    ];

    for (i, date) in dates.iter().enumerate() {
        let mut draft = draft_at(48.85 + i as f64, 2.29, 5, (2000, 1, 1));
        draft.trip_date = Some(*date);
        draft.audio = Some(MediaSource { file_name: format!("{i}.m4a"), bytes: vec![0] });
        app.repo.create(draft).await.unwrap();
    }

    let stats = app.stats.user_stats().await;
    assert_eq!(stats.total_trips, 3);
    assert_eq!(stats.average_rating, 5.0);
    assert_eq!(stats.audio_count, 3);
    assert_eq!(stats.unique_locations, 3);
    assert_eq!(stats.streaks.current, 3);
    assert_eq!(stats.streaks.longest, 3);

    let achievements = app.stats.achievements().await;
    let by_id = |id: &str| achievements.iter().find(|a| a.def.id == id).unwrap();
    assert!(by_id("first-steps").unlocked);
    assert!(by_id("warming-up").unlocked, "3-day current streak");
    assert!(!by_id("wanderer").unlocked);
    assert!(stats.achievement_points > 0);
}

#[tokio::test]
async fn stats_render_safely_with_no_user_or_broken_store() {
    let app = app();
    app.repo.create(draft_at(48.85, 2.29, 4, (2024, 1, 1))).await.unwrap();

    app.auth.sign_out();
    let stats = app.stats.user_stats().await;
    assert_eq!(stats, wayfarer::UserStats::default());

    let progress = app.stats.progress().await;
    assert!(progress.iter().all(|p| p.unlocked == 0));
}

#[tokio::test]
async fn rating_updates_flow_through_to_location_aggregates() {
    let app = app();
    let trip = app.repo.create(draft_at(48.8584, 2.2945, 4, (2024, 1, 1))).await.unwrap();
    app.repo.create(draft_at(48.85843, 2.29452, 2, (2024, 1, 2))).await.unwrap();

    let aggregate = app.repo.location_rating(trip.coords).await.unwrap();
    assert_eq!(aggregate.count, 2);
    assert_eq!(aggregate.average, 3.0);
    assert_eq!(aggregate.ratings, vec![4, 2]);
}

#[tokio::test]
async fn activity_buckets_share_the_document_store_with_trips() {
    let app = app();
    let key = BucketKey::new("France", "museums");

    let outcome = app
        .activities
        .store_records(&key, vec![listing("a"), listing("b")], true, false)
        .await
        .unwrap();
    assert_eq!(outcome, StoreOutcome::Stored { kept: 2, dropped: 0 });

    let bucket = app.activities.load(&key).await.unwrap().unwrap();
    assert!(!app.activities.needs_fresh_data(Some(&bucket)));

    app.clock.advance(Duration::from_secs(4 * 3600));
    assert!(app.activities.needs_fresh_data(Some(&bucket)));

    // Trips are untouched by an activity-cache clear.
    app.repo.create(draft_at(48.85, 2.29, 5, (2024, 1, 1))).await.unwrap();
    app.activities.clear_all().await.unwrap();
    assert!(app.activities.load(&key).await.unwrap().is_none());
    assert_eq!(app.repo.list().await.len(), 1);
}
