use std::fmt;

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use thiserror::Error;

/// Named groups of records; each id is unique within its collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Checks,
    Users,
    Tokens,
}

impl Collection {
    pub const ALL: [Collection; 3] = [Collection::Checks, Collection::Users, Collection::Tokens];

    pub fn as_str(self) -> &'static str {
        match self {
            Collection::Checks => "checks",
            Collection::Users => "users",
            Collection::Tokens => "tokens",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{collection}/{id} not found")]
    NotFound { collection: Collection, id: String },

    #[error("{collection}/{id} already exists")]
    AlreadyExists { collection: Collection, id: String },

    #[error("{collection}/{id} changed underneath us (expected version {expected}, found {found})")]
    Conflict { collection: Collection, id: String, expected: u64, found: u64 },

    #[error("invalid record id {0:?}")]
    InvalidId(String),

    #[error("record is not a JSON object")]
    NotAnObject,

    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("record (de)serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

/// A stored JSON document together with the version it was read at.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub version: u64,
    pub body: Value,
}

/// Keyed document persistence with optimistic versioning.
///
/// `create` stores version 1. `update` only succeeds when the caller passes the
/// version it read, and returns the new version; otherwise it fails with
/// [`StoreError::Conflict`] and leaves the stored document untouched.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn list(&self, collection: Collection) -> Result<Vec<String>, StoreError>;

    async fn read(&self, collection: Collection, id: &str) -> Result<Document, StoreError>;

    async fn create(&self, collection: Collection, id: &str, body: Value)
    -> Result<(), StoreError>;

    async fn update(
        &self,
        collection: Collection,
        id: &str,
        body: Value,
        expected_version: u64,
    ) -> Result<u64, StoreError>;

    async fn delete(&self, collection: Collection, id: &str) -> Result<(), StoreError>;
}

/// A typed record that lives in one collection.
pub trait Record: Serialize + DeserializeOwned + Send + Sync {
    const COLLECTION: Collection;
}

/// A typed record and the store version it was read at.
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<T> {
    pub version: u64,
    pub record: T,
}

/// Typed access on top of any [`RecordStore`].
#[async_trait]
pub trait RecordStoreExt: RecordStore {
    async fn fetch<T: Record>(&self, id: &str) -> Result<Versioned<T>, StoreError> {
        let document = self.read(T::COLLECTION, id).await?;
        let record = serde_json::from_value(document.body)?;
        Ok(Versioned { version: document.version, record })
    }

    async fn insert<T: Record>(&self, id: &str, record: &T) -> Result<(), StoreError> {
        let body = serde_json::to_value(record)?;
        self.create(T::COLLECTION, id, body).await
    }

    /// Write `current.record` back, guarded by `current.version`.
    async fn save<T: Record>(&self, id: &str, current: &Versioned<T>) -> Result<u64, StoreError> {
        let body = serde_json::to_value(&current.record)?;
        self.update(T::COLLECTION, id, body, current.version).await
    }

    async fn remove<T: Record>(&self, id: &str) -> Result<(), StoreError> {
        self.delete(T::COLLECTION, id).await
    }
}

impl<S: RecordStore + ?Sized> RecordStoreExt for S {}

/// Reject ids that could escape a collection directory.
pub(crate) fn ensure_valid_id(id: &str) -> Result<(), StoreError> {
    let valid = !id.is_empty()
        && !id.starts_with('.')
        && id.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));

    if valid { Ok(()) } else { Err(StoreError::InvalidId(id.to_string())) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_path_like_ids() {
        assert!(ensure_valid_id("abcDEF1234567890ghij").is_ok());
        assert!(ensure_valid_id("5551234567").is_ok());
        assert!(ensure_valid_id("").is_err());
        assert!(ensure_valid_id("../users/5551234567").is_err());
        assert!(ensure_valid_id(".hidden").is_err());
        assert!(ensure_valid_id("a/b").is_err());
    }

    #[test]
    fn store_error_display() {
        let err = StoreError::Conflict {
            collection: Collection::Checks,
            id: "abc".to_string(),
            expected: 2,
            found: 3,
        };
        assert_eq!(
            err.to_string(),
            "checks/abc changed underneath us (expected version 2, found 3)"
        );
        assert!(
            StoreError::NotFound { collection: Collection::Users, id: "x".into() }.is_not_found()
        );
    }
}
