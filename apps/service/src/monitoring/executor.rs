use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use super::checker::Prober;
use super::evaluator::{OutcomeEvaluator, Report};
use super::validation::{ValidationError, validate_check};
use crate::database::{CheckRecord, RecordStore, RecordStoreExt, StoreError, Versioned};

/// Why a check could not be probed. Either way the record is left untouched.
#[derive(Debug, Error)]
pub enum EvaluationError {
    #[error("failed to read check: {0}")]
    Store(#[from] StoreError),

    #[error("check failed validation: {0}")]
    Invalid(#[from] ValidationError),
}

/// Runs one check end to end: read, validate, probe, evaluate.
pub struct MonitoringExecutor {
    store: Arc<dyn RecordStore>,
    prober: Arc<dyn Prober>,
    evaluator: OutcomeEvaluator,
}

impl MonitoringExecutor {
    /// Create a new executor.
    pub fn new(store: Arc<dyn RecordStore>, prober: Arc<dyn Prober>, evaluator: OutcomeEvaluator) -> Self {
        Self { store, prober, evaluator }
    }

    /// Read, validate, probe and evaluate one check.
    ///
    /// An invalid check is rejected before any request is made and stays as it is on disk.
    pub async fn evaluate_check(&self, id: &str) -> Result<Report, EvaluationError> {
        let stored: Versioned<CheckRecord> = self.store.fetch(id).await?;
        let check = validate_check(&stored.record)?;

        let outcome = self.prober.probe(&check).await;
        let now = chrono::Utc::now().timestamp_millis();

        let report = self.evaluator.process(stored, &check, &outcome, now).await;
        debug!(check_id = id, ?report, "Check evaluated");
        Ok(report)
    }
}
