//! In-memory store implementations.
//!
//! These back the unit and integration tests and double as the offline
//! fallback. Failure injection (`poison`) lets tests exercise the
//! degraded paths without a real backend.

use super::{AuthProvider, BlobStore, DocumentStore, StoreEvent, UserId};
use crate::error::StoreError;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tokio::sync::broadcast;

/// Fixed-identity auth provider.
#[derive(Debug, Default)]
pub struct MemoryAuth {
    user: Mutex<Option<UserId>>,
}

impl MemoryAuth {
    pub fn signed_in(user: impl Into<String>) -> Self {
        Self { user: Mutex::new(Some(UserId(user.into()))) }
    }

    pub fn signed_out() -> Self {
        Self::default()
    }

    pub fn sign_in(&self, user: impl Into<String>) {
        *self.user.lock().unwrap() = Some(UserId(user.into()));
    }

    pub fn sign_out(&self) {
        *self.user.lock().unwrap() = None;
    }
}

impl AuthProvider for MemoryAuth {
    fn current_user(&self) -> Option<UserId> {
        self.user.lock().unwrap().clone()
    }
}

/// BTreeMap-backed document store with broadcast change notifications.
pub struct MemoryDocumentStore {
    docs: Mutex<BTreeMap<String, Value>>,
    poison: Mutex<Option<StoreError>>,
    next_id: AtomicU64,
    events: broadcast::Sender<StoreEvent>,
}

impl Default for MemoryDocumentStore {
    fn default() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            docs: Mutex::new(BTreeMap::new()),
            poison: Mutex::new(None),
            next_id: AtomicU64::new(1),
            events,
        }
    }
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent operation fail with `err` until [`heal`].
    ///
    /// [`heal`]: MemoryDocumentStore::heal
    pub fn poison(&self, err: StoreError) {
        *self.poison.lock().unwrap() = Some(err);
    }

    pub fn heal(&self) {
        *self.poison.lock().unwrap() = None;
    }

    pub fn len(&self) -> usize {
        self.docs.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.lock().unwrap().is_empty()
    }

    fn check_poison(&self) -> Result<(), StoreError> {
        match self.poison.lock().unwrap().as_ref() {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn notify(&self, path: &str) {
        // Nobody listening is fine.
        let _ = self.events.send(StoreEvent { path: path.to_string() });
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn read(&self, path: &str) -> Result<Option<Value>, StoreError> {
        self.check_poison()?;
        Ok(self.docs.lock().unwrap().get(path).cloned())
    }

    async fn write(&self, path: &str, value: Value) -> Result<(), StoreError> {
        self.check_poison()?;
        if contains_null_field(&value) {
            return Err(StoreError::InvalidArgument(format!(
                "document at {path} contains null fields; sanitize before writing"
            )));
        }
        self.docs.lock().unwrap().insert(path.to_string(), value);
        self.notify(path);
        Ok(())
    }

    async fn add(&self, prefix: &str, value: Value) -> Result<String, StoreError> {
        self.check_poison()?;
        let id = format!("d{:06}", self.next_id.fetch_add(1, Ordering::SeqCst));
        let path = format!("{}/{}", prefix.trim_end_matches('/'), id);
        self.write(&path, value).await?;
        Ok(id)
    }

    async fn delete(&self, path: &str) -> Result<(), StoreError> {
        self.check_poison()?;
        self.docs.lock().unwrap().remove(path);
        self.notify(path);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<(String, Value)>, StoreError> {
        self.check_poison()?;
        let docs = self.docs.lock().unwrap();
        Ok(docs
            .range(prefix.to_string()..)
            .take_while(|(path, _)| path.starts_with(prefix))
            .map(|(path, value)| (path.clone(), value.clone()))
            .collect())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<(), StoreError> {
        self.check_poison()?;
        let mut docs = self.docs.lock().unwrap();
        let doomed: Vec<String> = docs
            .range(prefix.to_string()..)
            .take_while(|(path, _)| path.starts_with(prefix))
            .map(|(path, _)| path.clone())
            .collect();
        for path in &doomed {
            docs.remove(path);
        }
        drop(docs);
        self.notify(prefix);
        Ok(())
    }

    fn watch(&self, _prefix: &str) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }
}

/// The store rejects documents with null fields outright; object maps
/// only, mirroring [`super::sanitize_for_storage`].
fn contains_null_field(value: &Value) -> bool {
    match value {
        Value::Object(map) => map.values().any(|v| v.is_null() || contains_null_field(v)),
        Value::Array(items) => items.iter().any(contains_null_field),
        _ => false,
    }
}

/// Map-backed blob store; URLs use a `mem://` scheme.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<BTreeMap<String, Vec<u8>>>,
    poison: Mutex<Option<StoreError>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn poison(&self, err: StoreError) {
        *self.poison.lock().unwrap() = Some(err);
    }

    pub fn heal(&self) {
        *self.poison.lock().unwrap() = None;
    }

    pub fn contains(&self, url: &str) -> bool {
        self.blobs.lock().unwrap().contains_key(url)
    }

    pub fn len(&self) -> usize {
        self.blobs.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.lock().unwrap().is_empty()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn upload(&self, path: &str, bytes: Vec<u8>) -> Result<String, StoreError> {
        if let Some(err) = self.poison.lock().unwrap().as_ref() {
            return Err(err.clone());
        }
        let url = format!("mem://{path}");
        self.blobs.lock().unwrap().insert(url.clone(), bytes);
        Ok(url)
    }

    async fn delete(&self, url: &str) -> Result<(), StoreError> {
        if let Some(err) = self.poison.lock().unwrap().as_ref() {
            return Err(err.clone());
        }
        match self.blobs.lock().unwrap().remove(url) {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound(url.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn write_read_round_trip() {
        let store = MemoryDocumentStore::new();
        store.write("trips/u1/t1", json!({"rating": 5})).await.unwrap();

        let value = store.read("trips/u1/t1").await.unwrap().unwrap();
        assert_eq!(value["rating"], 5);
        assert_eq!(store.read("trips/u1/t2").await.unwrap(), None);
    }

    #[tokio::test]
    async fn add_assigns_sequential_ids() {
        let store = MemoryDocumentStore::new();
        let a = store.add("trips/u1", json!({"n": 1})).await.unwrap();
        let b = store.add("trips/u1", json!({"n": 2})).await.unwrap();

        assert_ne!(a, b);
        assert!(store.read(&format!("trips/u1/{a}")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn list_is_prefix_scoped() {
        let store = MemoryDocumentStore::new();
        store.write("trips/u1/t1", json!(1)).await.unwrap();
        store.write("trips/u1/t2", json!(2)).await.unwrap();
        store.write("trips/u2/t1", json!(3)).await.unwrap();

        let listed = store.list("trips/u1").await.unwrap();
        assert_eq!(listed.len(), 2);

        store.delete_prefix("trips/u1").await.unwrap();
        assert!(store.list("trips/u1").await.unwrap().is_empty());
        assert_eq!(store.list("trips/u2").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn write_rejects_null_fields() {
        let store = MemoryDocumentStore::new();
        let err = store.write("t", json!({"photo": null})).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn poison_fails_everything_until_heal() {
        let store = MemoryDocumentStore::new();
        store.poison(StoreError::Unavailable("maintenance".into()));
        assert!(store.read("x").await.is_err());
        assert!(store.write("x", json!(1)).await.is_err());

        store.heal();
        assert!(store.write("x", json!(1)).await.is_ok());
    }

    #[tokio::test]
    async fn watch_sees_writes() {
        let store = MemoryDocumentStore::new();
        let mut rx = store.watch("trips/u1");
        store.write("trips/u1/t1", json!(1)).await.unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event.path, "trips/u1/t1");
    }

    #[tokio::test]
    async fn blob_upload_and_delete() {
        let blobs = MemoryBlobStore::new();
        let url = blobs.upload("photos/u1/t1.jpg", vec![1, 2, 3]).await.unwrap();
        assert!(url.starts_with("mem://"));
        assert!(blobs.contains(&url));

        blobs.delete(&url).await.unwrap();
        assert!(!blobs.contains(&url));
        assert!(matches!(blobs.delete(&url).await, Err(StoreError::NotFound(_))));
    }
}
