//! Persistence backends for rate-limit window history.
//!
//! The limiter only needs load/save/clear of a timestamp list per
//! service. [`MemoryWindowStore`] keeps it in-process;
//! [`DocumentWindowStore`] parks it in the generic document store so
//! quotas survive restarts.

use crate::error::StoreError;
use crate::store::DocumentStore;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[async_trait]
pub trait WindowStore: Send + Sync {
    async fn load(&self, service: &str) -> Result<Option<Vec<u64>>, StoreError>;

    async fn save(&self, service: &str, history: &[u64]) -> Result<(), StoreError>;

    async fn clear(&self, service: &str) -> Result<(), StoreError>;
}

/// Process-local window store, also the test double.
#[derive(Debug, Default)]
pub struct MemoryWindowStore {
    histories: Mutex<HashMap<String, Vec<u64>>>,
    poison: Mutex<Option<StoreError>>,
}

impl MemoryWindowStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent operation fail with `err`.
    pub fn poison(&self, err: StoreError) {
        *self.poison.lock().unwrap() = Some(err);
    }

    fn check_poison(&self) -> Result<(), StoreError> {
        match self.poison.lock().unwrap().as_ref() {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl WindowStore for MemoryWindowStore {
    async fn load(&self, service: &str) -> Result<Option<Vec<u64>>, StoreError> {
        self.check_poison()?;
        Ok(self.histories.lock().unwrap().get(service).cloned())
    }

    async fn save(&self, service: &str, history: &[u64]) -> Result<(), StoreError> {
        self.check_poison()?;
        self.histories.lock().unwrap().insert(service.to_string(), history.to_vec());
        Ok(())
    }

    async fn clear(&self, service: &str) -> Result<(), StoreError> {
        self.check_poison()?;
        self.histories.lock().unwrap().remove(service);
        Ok(())
    }
}

/// Window store backed by the generic document store, one document per
/// service at `rate_limits/{service}`.
pub struct DocumentWindowStore {
    docs: Arc<dyn DocumentStore>,
}

impl DocumentWindowStore {
    pub fn new(docs: Arc<dyn DocumentStore>) -> Self {
        Self { docs }
    }

    fn path(service: &str) -> String {
        format!("rate_limits/{service}")
    }
}

#[async_trait]
impl WindowStore for DocumentWindowStore {
    async fn load(&self, service: &str) -> Result<Option<Vec<u64>>, StoreError> {
        let Some(value) = self.docs.read(&Self::path(service)).await? else {
            return Ok(None);
        };
        let history = serde_json::from_value(value).map_err(|e| {
            StoreError::InvalidArgument(format!("rate-limit history for {service}: {e}"))
        })?;
        Ok(Some(history))
    }

    async fn save(&self, service: &str, history: &[u64]) -> Result<(), StoreError> {
        let value = serde_json::to_value(history)
            .map_err(|e| StoreError::InvalidArgument(e.to_string()))?;
        self.docs.write(&Self::path(service), value).await
    }

    async fn clear(&self, service: &str) -> Result<(), StoreError> {
        self.docs.delete(&Self::path(service)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryDocumentStore;

    #[tokio::test]
    async fn memory_store_round_trips() {
        let store = MemoryWindowStore::new();
        assert_eq!(store.load("yelp").await.unwrap(), None);

        store.save("yelp", &[1, 2, 3]).await.unwrap();
        assert_eq!(store.load("yelp").await.unwrap(), Some(vec![1, 2, 3]));

        store.clear("yelp").await.unwrap();
        assert_eq!(store.load("yelp").await.unwrap(), None);
    }

    #[tokio::test]
    async fn document_store_round_trips() {
        let docs = Arc::new(MemoryDocumentStore::new());
        let store = DocumentWindowStore::new(docs.clone());

        store.save("accuweather", &[10, 20]).await.unwrap();
        assert_eq!(store.load("accuweather").await.unwrap(), Some(vec![10, 20]));
        assert!(docs.read("rate_limits/accuweather").await.unwrap().is_some());

        store.clear("accuweather").await.unwrap();
        assert_eq!(store.load("accuweather").await.unwrap(), None);
    }

    #[tokio::test]
    async fn document_store_reports_malformed_history() {
        let docs = Arc::new(MemoryDocumentStore::new());
        docs.write("rate_limits/yelp", serde_json::json!({"not": "a list"})).await.unwrap();

        let store = DocumentWindowStore::new(docs);
        assert!(matches!(store.load("yelp").await, Err(StoreError::InvalidArgument(_))));
    }
}
