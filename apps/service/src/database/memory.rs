use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use super::repository::{Collection, Document, RecordStore, StoreError};

/// Volatile [`RecordStore`] for tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<Collection, BTreeMap<String, Document>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn list(&self, collection: Collection) -> Result<Vec<String>, StoreError> {
        let collections = self.collections.read().await;
        Ok(collections.get(&collection).map(|docs| docs.keys().cloned().collect()).unwrap_or_default())
    }

    async fn read(&self, collection: Collection, id: &str) -> Result<Document, StoreError> {
        let collections = self.collections.read().await;
        collections
            .get(&collection)
            .and_then(|docs| docs.get(id))
            .cloned()
            .ok_or_else(|| StoreError::NotFound { collection, id: id.to_string() })
    }

    async fn create(
        &self,
        collection: Collection,
        id: &str,
        body: Value,
    ) -> Result<(), StoreError> {
        if !body.is_object() {
            return Err(StoreError::NotAnObject);
        }
        let mut collections = self.collections.write().await;
        let docs = collections.entry(collection).or_default();
        if docs.contains_key(id) {
            return Err(StoreError::AlreadyExists { collection, id: id.to_string() });
        }
        docs.insert(id.to_string(), Document { version: 1, body });
        Ok(())
    }

    async fn update(
        &self,
        collection: Collection,
        id: &str,
        body: Value,
        expected_version: u64,
    ) -> Result<u64, StoreError> {
        if !body.is_object() {
            return Err(StoreError::NotAnObject);
        }
        let mut collections = self.collections.write().await;
        let doc = collections
            .get_mut(&collection)
            .and_then(|docs| docs.get_mut(id))
            .ok_or_else(|| StoreError::NotFound { collection, id: id.to_string() })?;

        if doc.version != expected_version {
            return Err(StoreError::Conflict {
                collection,
                id: id.to_string(),
                expected: expected_version,
                found: doc.version,
            });
        }
        doc.version += 1;
        doc.body = body;
        Ok(doc.version)
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<(), StoreError> {
        let mut collections = self.collections.write().await;
        collections
            .get_mut(&collection)
            .and_then(|docs| docs.remove(id))
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound { collection, id: id.to_string() })
    }
}
