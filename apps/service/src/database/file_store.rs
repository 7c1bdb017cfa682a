use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::repository::{Collection, Document, RecordStore, StoreError, ensure_valid_id};
use crate::keyed_lock::KeyedLocks;

const VERSION_KEY: &str = "version";
const EXTENSION: &str = "json";

/// One JSON document per record at `<root>/<collection>/<id>.json`.
///
/// The record version is stored inline under `"version"`; documents written
/// without one read back as version 0. Writes for a given record are
/// serialized in-process and land through a temp file plus rename.
#[derive(Debug)]
pub struct FileStore {
    root: PathBuf,
    locks: KeyedLocks,
}

impl FileStore {
    /// Open a store rooted at `root`, creating collection directories as needed.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        for collection in Collection::ALL {
            fs::create_dir_all(root.join(collection.as_str())).await?;
        }
        debug!(root = %root.display(), "Record store opened");
        Ok(Self { root, locks: KeyedLocks::new() })
    }

    fn path(&self, collection: Collection, id: &str) -> Result<PathBuf, StoreError> {
        ensure_valid_id(id)?;
        Ok(self.root.join(collection.as_str()).join(format!("{id}.{EXTENSION}")))
    }

    fn lock_key(collection: Collection, id: &str) -> String {
        format!("{collection}/{id}")
    }

    async fn read_document(
        &self,
        collection: Collection,
        id: &str,
        path: &Path,
    ) -> Result<Document, StoreError> {
        let raw = match fs::read(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StoreError::NotFound { collection, id: id.to_string() });
            }
            Err(e) => return Err(e.into()),
        };
        split_version(serde_json::from_slice(&raw)?)
    }

    async fn write_atomically(path: &Path, body: &[u8]) -> Result<(), StoreError> {
        let tmp = path.with_extension(format!("{EXTENSION}.tmp"));
        fs::write(&tmp, body).await?;
        fs::rename(&tmp, path).await?;
        Ok(())
    }
}

fn split_version(value: Value) -> Result<Document, StoreError> {
    let Value::Object(mut body) = value else {
        return Err(StoreError::NotAnObject);
    };
    let version = body.remove(VERSION_KEY).and_then(|v| v.as_u64()).unwrap_or(0);
    Ok(Document { version, body: Value::Object(body) })
}

fn with_version(body: Value, version: u64) -> Result<Vec<u8>, StoreError> {
    let Value::Object(mut body) = body else {
        return Err(StoreError::NotAnObject);
    };
    body.insert(VERSION_KEY.to_string(), Value::from(version));
    Ok(serde_json::to_vec(&Value::Object(body))?)
}

#[async_trait]
impl RecordStore for FileStore {
    async fn list(&self, collection: Collection) -> Result<Vec<String>, StoreError> {
        let dir = self.root.join(collection.as_str());
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(id) = name.strip_suffix(".json") {
                ids.push(id.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }

    async fn read(&self, collection: Collection, id: &str) -> Result<Document, StoreError> {
        let path = self.path(collection, id)?;
        self.read_document(collection, id, &path).await
    }

    async fn create(
        &self,
        collection: Collection,
        id: &str,
        body: Value,
    ) -> Result<(), StoreError> {
        let path = self.path(collection, id)?;
        let bytes = with_version(body, 1)?;
        let _guard = self.locks.lock(&Self::lock_key(collection, id)).await;

        let mut file = match fs::OpenOptions::new().write(true).create_new(true).open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(StoreError::AlreadyExists { collection, id: id.to_string() });
            }
            Err(e) => return Err(e.into()),
        };
        file.write_all(&bytes).await?;
        file.flush().await?;
        Ok(())
    }

    async fn update(
        &self,
        collection: Collection,
        id: &str,
        body: Value,
        expected_version: u64,
    ) -> Result<u64, StoreError> {
        let path = self.path(collection, id)?;
        let _guard = self.locks.lock(&Self::lock_key(collection, id)).await;

        let current = self.read_document(collection, id, &path).await?;
        if current.version != expected_version {
            return Err(StoreError::Conflict {
                collection,
                id: id.to_string(),
                expected: expected_version,
                found: current.version,
            });
        }

        let next = expected_version + 1;
        Self::write_atomically(&path, &with_version(body, next)?).await?;
        Ok(next)
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<(), StoreError> {
        let path = self.path(collection, id)?;
        let _guard = self.locks.lock(&Self::lock_key(collection, id)).await;

        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(StoreError::NotFound { collection, id: id.to_string() })
            }
            Err(e) => Err(e.into()),
        }
    }
}
