//! Collaborator interfaces for the managed backend.
//!
//! The core never speaks the backend's wire format. It sees three narrow
//! traits:
//! - [`AuthProvider`]: who (if anyone) is signed in.
//! - [`DocumentStore`]: a path-addressed JSON document store with change
//!   notifications.
//! - [`BlobStore`]: durable byte storage returning URLs.
//!
//! The store forbids JSON nulls inside documents, so every write goes
//! through [`sanitize_for_storage`] at the serialization boundary.

use crate::error::StoreError;
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast;

pub mod memory;

pub use memory::{MemoryAuth, MemoryBlobStore, MemoryDocumentStore};

/// Identity of the signed-in user. All trip paths are scoped by it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UserId(pub String);

impl UserId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

pub trait AuthProvider: Send + Sync {
    /// `None` means "nobody is signed in"; callers treat that as a normal
    /// state, never as an error.
    fn current_user(&self) -> Option<UserId>;
}

/// Change notification emitted by [`DocumentStore::watch`].
#[derive(Debug, Clone)]
pub struct StoreEvent {
    /// Path of the document that changed.
    pub path: String,
}

/// Path-addressed document store, schemaless enough to hold nested JSON.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn read(&self, path: &str) -> Result<Option<Value>, StoreError>;

    async fn write(&self, path: &str, value: Value) -> Result<(), StoreError>;

    /// Create a document under `prefix` with a store-assigned id; returns
    /// the new id.
    async fn add(&self, prefix: &str, value: Value) -> Result<String, StoreError>;

    async fn delete(&self, path: &str) -> Result<(), StoreError>;

    /// All documents whose path starts with `prefix`, as `(path, value)`.
    async fn list(&self, prefix: &str) -> Result<Vec<(String, Value)>, StoreError>;

    async fn delete_prefix(&self, prefix: &str) -> Result<(), StoreError>;

    /// Subscribe to changes under `prefix`. Lagged receivers drop events,
    /// which is fine for the one consumer (trip subscriptions) that always
    /// re-reads the full list per event.
    fn watch(&self, prefix: &str) -> broadcast::Receiver<StoreEvent>;
}

/// Durable blob storage with URL-addressed deletes.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn upload(&self, path: &str, bytes: Vec<u8>) -> Result<String, StoreError>;

    async fn delete(&self, url: &str) -> Result<(), StoreError>;
}

/// Recursively drop null entries from object maps.
///
/// Applied once, right before a document write. Array elements are
/// recursed into but not removed; a null inside an array is data, a null
/// value under an object key is an absent field.
pub fn sanitize_for_storage(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k, sanitize_for_storage(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(sanitize_for_storage).collect()),
        other => other,
    }
}
