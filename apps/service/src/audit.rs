//! Per-check audit log.
//!
//! Every evaluation appends one JSON line to `<dir>/<checkId>.log`. Rotation
//! moves the active stream into `<dir>/<checkId>_<epochMs>.gz.b64` (gzip, then
//! base64) and truncates it. Append and rotation of one check share a lock, so
//! a line is never lost between the read and the truncate.

use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use thiserror::Error;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::keyed_lock::KeyedLocks;
use crate::monitoring::types::LogRecord;

const ACTIVE_EXT: &str = ".log";
const ARCHIVE_EXT: &str = ".gz.b64";

#[derive(Debug, Error)]
pub enum AuditLogError {
    #[error("{}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },

    #[error("log {0} does not exist")]
    NotFound(String),

    #[error("invalid log name {0:?}")]
    InvalidName(String),

    #[error("archive {0} already exists")]
    ArchiveExists(String),

    #[error("failed to encode log record: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("archive is not valid base64: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("compression failed: {0}")]
    Compression(io::Error),

    #[error("compression task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl AuditLogError {
    fn io(path: &Path) -> impl FnOnce(io::Error) -> Self + '_ {
        move |source| match source.kind() {
            io::ErrorKind::NotFound => Self::NotFound(display_name(path)),
            _ => Self::Io { path: path.to_path_buf(), source },
        }
    }
}

fn display_name(path: &Path) -> String {
    path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default()
}

/// Log and archive names are used as file names directly.
fn ensure_safe_name(name: &str) -> Result<(), AuditLogError> {
    let safe = !name.is_empty()
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if safe { Ok(()) } else { Err(AuditLogError::InvalidName(name.to_string())) }
}

/// gzip, then base64.
pub fn compress(text: &[u8]) -> Result<String, AuditLogError> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(text).map_err(AuditLogError::Compression)?;
    let gz = encoder.finish().map_err(AuditLogError::Compression)?;
    Ok(BASE64.encode(gz))
}

pub fn decompress(encoded: &str) -> Result<String, AuditLogError> {
    let gz = BASE64.decode(encoded.trim())?;
    let mut text = String::new();
    GzDecoder::new(gz.as_slice())
        .read_to_string(&mut text)
        .map_err(AuditLogError::Compression)?;
    Ok(text)
}

pub struct AuditLog {
    dir: PathBuf,
    locks: KeyedLocks,
}

impl AuditLog {
    /// Open the log directory, creating it if needed.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, AuditLogError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await.map_err(|source| AuditLogError::Io { path: dir.clone(), source })?;
        Ok(Self { dir, locks: KeyedLocks::new() })
    }

    fn active_path(&self, log_id: &str) -> Result<PathBuf, AuditLogError> {
        ensure_safe_name(log_id)?;
        Ok(self.dir.join(format!("{log_id}{ACTIVE_EXT}")))
    }

    fn archive_path(&self, archive_id: &str) -> Result<PathBuf, AuditLogError> {
        ensure_safe_name(archive_id)?;
        Ok(self.dir.join(format!("{archive_id}{ARCHIVE_EXT}")))
    }

    /// Append one record to the check's active stream, creating it if needed.
    pub async fn append(&self, check_id: &str, record: &LogRecord<'_>) -> Result<(), AuditLogError> {
        let path = self.active_path(check_id)?;
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let _guard = self.locks.lock(check_id).await;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(AuditLogError::io(&path))?;
        file.write_all(&line).await.map_err(AuditLogError::io(&path))?;
        file.flush().await.map_err(AuditLogError::io(&path))?;
        Ok(())
    }

    /// Names of active streams, plus archive names when `include_archives`.
    /// Extensions are stripped; the result is sorted.
    pub async fn list(&self, include_archives: bool) -> Result<Vec<String>, AuditLogError> {
        let mut entries = fs::read_dir(&self.dir).await.map_err(AuditLogError::io(&self.dir))?;
        let mut names = Vec::new();

        while let Some(entry) = entries.next_entry().await.map_err(AuditLogError::io(&self.dir))? {
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else { continue };

            if let Some(stem) = file_name.strip_suffix(ACTIVE_EXT) {
                names.push(stem.to_string());
            } else if let Some(stem) = file_name.strip_suffix(ARCHIVE_EXT) {
                if include_archives {
                    names.push(stem.to_string());
                }
            }
        }

        names.sort();
        Ok(names)
    }

    /// Archive names only.
    pub async fn archives(&self) -> Result<Vec<String>, AuditLogError> {
        let active = self.list(false).await?;
        let mut all = self.list(true).await?;
        all.retain(|name| !active.contains(name));
        Ok(all)
    }

    /// Contents of an active stream.
    pub async fn read(&self, log_id: &str) -> Result<String, AuditLogError> {
        let path = self.active_path(log_id)?;
        fs::read_to_string(&path).await.map_err(AuditLogError::io(&path))
    }

    /// Original text of an archive.
    pub async fn decompress(&self, archive_id: &str) -> Result<String, AuditLogError> {
        let path = self.archive_path(archive_id)?;
        let encoded = fs::read_to_string(&path).await.map_err(AuditLogError::io(&path))?;
        Ok(tokio::task::spawn_blocking(move || decompress(&encoded)).await??)
    }

    /// Empty an active stream. Fails if the stream does not exist.
    #[cfg(test)]
    pub async fn truncate(&self, log_id: &str) -> Result<(), AuditLogError> {
        let path = self.active_path(log_id)?;
        let _guard = self.locks.lock(log_id).await;
        Self::truncate_file(&path).await
    }

    async fn truncate_file(path: &Path) -> Result<(), AuditLogError> {
        let file = OpenOptions::new().write(true).open(path).await.map_err(AuditLogError::io(path))?;
        file.set_len(0).await.map_err(AuditLogError::io(path))
    }

    /// Archive the active stream as `<logId>_<nowMs>` and truncate it.
    ///
    /// Returns the archive name, or `None` when the stream was empty and
    /// nothing was written.
    pub async fn rotate(&self, log_id: &str, now_ms: i64) -> Result<Option<String>, AuditLogError> {
        let path = self.active_path(log_id)?;
        let archive_id = format!("{log_id}_{now_ms}");
        let archive_path = self.archive_path(&archive_id)?;

        let _guard = self.locks.lock(log_id).await;

        let text = fs::read(&path).await.map_err(AuditLogError::io(&path))?;
        if text.is_empty() {
            debug!(log_id, "Active log empty, nothing to rotate");
            return Ok(None);
        }

        let encoded = tokio::task::spawn_blocking(move || compress(&text)).await??;

        let mut archive = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&archive_path)
            .await
            .map_err(|source| match source.kind() {
                io::ErrorKind::AlreadyExists => AuditLogError::ArchiveExists(archive_id.clone()),
                _ => AuditLogError::Io { path: archive_path.clone(), source },
            })?;
        archive.write_all(encoded.as_bytes()).await.map_err(AuditLogError::io(&archive_path))?;
        archive.flush().await.map_err(AuditLogError::io(&archive_path))?;

        Self::truncate_file(&path).await?;
        Ok(Some(archive_id))
    }
}
