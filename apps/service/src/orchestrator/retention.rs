//! Periodic housekeeping: expired login tokens and audit log rotation.
//!
//! Both passes work entity by entity. One unreadable token or one failed
//! rotation is logged and skipped; the pass carries on with the rest.

use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::audit::{AuditLog, AuditLogError};
use crate::database::{Collection, RecordStore, RecordStoreExt, StoreError, TokenRecord, Versioned};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TokenSweepReport {
    pub examined: usize,
    pub deleted: usize,
    pub failed: usize,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RotationReport {
    pub streams: usize,
    pub archived: usize,
    pub empty: usize,
    pub failed: usize,
}

enum TokenOutcome {
    Kept,
    Deleted,
    Failed,
}

pub struct RetentionCleanup {
    store: Arc<dyn RecordStore>,
    audit: Arc<AuditLog>,
}

impl RetentionCleanup {
    /// Create a new cleanup over the token collection and the audit log.
    pub fn new(store: Arc<dyn RecordStore>, audit: Arc<AuditLog>) -> Self {
        Self { store, audit }
    }

    /// Delete every token whose expiry is before `now_ms`.
    pub async fn clear_expired_tokens(&self, now_ms: i64) -> Result<TokenSweepReport, StoreError> {
        let ids = self.store.list(Collection::Tokens).await?;
        let outcomes = join_all(ids.iter().map(|id| self.clear_token(id, now_ms))).await;

        let mut report = TokenSweepReport { examined: ids.len(), ..Default::default() };
        for outcome in outcomes {
            match outcome {
                TokenOutcome::Kept => {}
                TokenOutcome::Deleted => report.deleted += 1,
                TokenOutcome::Failed => report.failed += 1,
            }
        }

        info!(examined = report.examined, deleted = report.deleted, failed = report.failed, "Token sweep finished");
        Ok(report)
    }

    async fn clear_token(&self, id: &str, now_ms: i64) -> TokenOutcome {
        let token: Versioned<TokenRecord> = match self.store.fetch(id).await {
            Ok(token) => token,
            // Deleted by someone else since the listing.
            Err(e) if e.is_not_found() => return TokenOutcome::Kept,
            Err(e) => {
                warn!(token_id = id, error = %e, "Failed to read token");
                return TokenOutcome::Failed;
            }
        };

        if !token.record.is_expired(now_ms) {
            return TokenOutcome::Kept;
        }

        match self.store.remove::<TokenRecord>(id).await {
            Ok(()) => {
                debug!(token_id = id, "Expired token deleted");
                TokenOutcome::Deleted
            }
            Err(e) if e.is_not_found() => TokenOutcome::Kept,
            Err(e) => {
                warn!(token_id = id, error = %e, "Failed to delete expired token");
                TokenOutcome::Failed
            }
        }
    }

    /// Archive and truncate every active audit stream.
    pub async fn rotate_logs(&self, now_ms: i64) -> Result<RotationReport, AuditLogError> {
        let streams = self.audit.list(false).await?;
        let results = join_all(streams.iter().map(|id| self.audit.rotate(id, now_ms))).await;

        let mut report = RotationReport { streams: streams.len(), ..Default::default() };
        for (id, result) in streams.iter().zip(results) {
            match result {
                Ok(Some(archive)) => {
                    debug!(log_id = %id, %archive, "Log rotated");
                    report.archived += 1;
                }
                Ok(None) => report.empty += 1,
                Err(e) => {
                    warn!(log_id = %id, error = %e, "Failed to rotate log");
                    report.failed += 1;
                }
            }
        }

        info!(archived = report.archived, empty = report.empty, failed = report.failed, "Log rotation finished");
        Ok(report)
    }
}
