use std::sync::Arc;

use tracing::{debug, warn};

use super::types::{CheckState, LogRecord, Outcome};
use super::validation::ValidCheck;
use crate::alerting::AlertDispatcher;
use crate::audit::AuditLog;
use crate::database::{CheckRecord, RecordStore, RecordStoreExt, Versioned};

/// What an outcome means for its check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evaluation {
    pub state: CheckState,
    pub alert: bool,
}

/// Up iff the probe got a response whose code is listed as a success. An alert
/// is due only when the check has been evaluated before and the state flipped.
pub fn evaluate(check: &ValidCheck, outcome: &Outcome) -> Evaluation {
    let up = !outcome.errored
        && outcome.response_code.is_some_and(|code| check.success_codes.contains(&code));
    let state = if up { CheckState::Up } else { CheckState::Down };
    let alert = check.last_checked.is_some() && state != check.state;
    Evaluation { state, alert }
}

/// Everything that happened while processing one outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Report {
    pub evaluation: Evaluation,
    pub logged: bool,
    pub persisted: bool,
    pub alerted: bool,
}

/// Applies an outcome: audit line, state write-back, then the alert.
pub struct OutcomeEvaluator {
    store: Arc<dyn RecordStore>,
    audit: Arc<AuditLog>,
    alerts: Arc<AlertDispatcher>,
}

impl OutcomeEvaluator {
    /// Create a new evaluator writing to `store` and `audit` and alerting through `alerts`.
    pub fn new(store: Arc<dyn RecordStore>, audit: Arc<AuditLog>, alerts: Arc<AlertDispatcher>) -> Self {
        Self { store, audit, alerts }
    }

    /// `stored` is the record `check` was validated from, at the version it was
    /// read. Failures are logged and reported, never returned.
    pub async fn process(
        &self,
        mut stored: Versioned<CheckRecord>,
        check: &ValidCheck,
        outcome: &Outcome,
        now_ms: i64,
    ) -> Report {
        let evaluation = evaluate(check, outcome);

        let record = LogRecord {
            check,
            outcome,
            state: evaluation.state,
            alert_triggered: evaluation.alert,
            timestamp: now_ms,
        };
        let logged = match self.audit.append(&check.id, &record).await {
            Ok(()) => true,
            Err(e) => {
                warn!(check_id = %check.id, error = %e, "Failed to append audit record");
                false
            }
        };

        stored.record.state = Some(evaluation.state.as_str().to_string());
        stored.record.last_checked = Some(now_ms);
        let persisted = match self.store.save(&check.id, &stored).await {
            Ok(version) => {
                debug!(check_id = %check.id, state = %evaluation.state, version, "Check state saved");
                true
            }
            Err(e) => {
                warn!(check_id = %check.id, error = %e, "Failed to save check state, will retry next sweep");
                false
            }
        };

        let mut alerted = false;
        if evaluation.alert && persisted {
            let updated = ValidCheck { state: evaluation.state, last_checked: Some(now_ms), ..check.clone() };
            match self.alerts.dispatch(&updated).await {
                Ok(()) => alerted = true,
                Err(e) => warn!(check_id = %check.id, error = %e, "Failed to send alert"),
            }
        }

        Report { evaluation, logged, persisted, alerted }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::memory::MemoryStore;
    use crate::monitoring::validation::validate_check;
    use crate::test_support::{RecordingSms, check_record};

    fn valid(state: CheckState, last_checked: Option<i64>) -> ValidCheck {
        let mut record = check_record("abcdefghij0123456789", "example.com");
        record.state = Some(state.as_str().into());
        record.last_checked = last_checked;
        validate_check(&record).unwrap()
    }

    #[test]
    fn success_code_decides_state() {
        let check = valid(CheckState::Down, None);
        assert_eq!(evaluate(&check, &Outcome::response(200)).state, CheckState::Up);
        assert_eq!(evaluate(&check, &Outcome::response(404)).state, CheckState::Down);
        assert_eq!(evaluate(&check, &Outcome::timed_out()).state, CheckState::Down);
        assert_eq!(evaluate(&check, &Outcome::failure("connection refused")).state, CheckState::Down);
    }

    #[test]
    fn first_evaluation_never_alerts() {
        for state in [CheckState::Up, CheckState::Down] {
            let check = valid(state, None);
            for outcome in [Outcome::response(200), Outcome::response(500), Outcome::timed_out()] {
                assert!(!evaluate(&check, &outcome).alert);
            }
        }
    }

    #[test]
    fn alert_only_on_change() {
        let up = valid(CheckState::Up, Some(1));
        assert!(!evaluate(&up, &Outcome::response(200)).alert);
        assert!(evaluate(&up, &Outcome::response(503)).alert);

        let down = valid(CheckState::Down, Some(1));
        assert!(!evaluate(&down, &Outcome::timed_out()).alert);
        assert!(evaluate(&down, &Outcome::response(200)).alert);
    }

    struct Harness {
        _dir: tempfile::TempDir,
        store: Arc<MemoryStore>,
        audit: Arc<AuditLog>,
        sms: Arc<RecordingSms>,
        evaluator: OutcomeEvaluator,
    }

    async fn harness(sms: RecordingSms) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        let audit = Arc::new(AuditLog::open(dir.path()).await.unwrap());
        let sms = Arc::new(sms);
        let alerts = Arc::new(AlertDispatcher::new(sms.clone()));
        let evaluator = OutcomeEvaluator::new(store.clone(), audit.clone(), alerts);
        Harness { _dir: dir, store, audit, sms, evaluator }
    }

    async fn seed(h: &Harness, state: CheckState, last_checked: Option<i64>) -> (Versioned<CheckRecord>, ValidCheck) {
        let check = valid(state, last_checked);
        let mut record = check_record(&check.id, &check.url);
        record.state = Some(state.as_str().into());
        record.last_checked = last_checked;
        h.store.insert(&check.id, &record).await.unwrap();
        (h.store.fetch(&check.id).await.unwrap(), check)
    }

    #[tokio::test]
    async fn state_change_logs_persists_and_alerts_once() {
        let h = harness(RecordingSms::default()).await;
        let (stored, check) = seed(&h, CheckState::Up, Some(10)).await;

        let report = h.evaluator.process(stored, &check, &Outcome::response(500), 20).await;

        assert_eq!(report.evaluation, Evaluation { state: CheckState::Down, alert: true });
        assert!(report.logged && report.persisted && report.alerted);

        let saved: Versioned<CheckRecord> = h.store.fetch(&check.id).await.unwrap();
        assert_eq!(saved.record.state.as_deref(), Some("down"));
        assert_eq!(saved.record.last_checked, Some(20));

        let line: serde_json::Value =
            serde_json::from_str(h.audit.read(&check.id).await.unwrap().trim()).unwrap();
        assert_eq!(line["alertTriggered"], true);
        assert_eq!(line["resultingState"], "down");
        assert_eq!(line["checkSnapshot"]["state"], "up");

        let sent = h.sms.messages();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1, "Alert: Your check for GET http://example.com is currently down");
    }

    #[tokio::test]
    async fn first_evaluation_saves_without_alert() {
        let h = harness(RecordingSms::default()).await;
        let (stored, check) = seed(&h, CheckState::Down, None).await;

        let report = h.evaluator.process(stored, &check, &Outcome::response(200), 5).await;

        assert!(report.persisted);
        assert!(!report.evaluation.alert && !report.alerted);
        assert!(h.sms.messages().is_empty());
    }

    #[tokio::test]
    async fn conflicting_write_suppresses_alert() {
        let h = harness(RecordingSms::default()).await;
        let (mut stored, check) = seed(&h, CheckState::Up, Some(10)).await;
        stored.version += 1;

        let report = h.evaluator.process(stored, &check, &Outcome::timed_out(), 20).await;

        assert!(report.evaluation.alert);
        assert!(report.logged);
        assert!(!report.persisted && !report.alerted);
        assert!(h.sms.messages().is_empty());
        let saved: Versioned<CheckRecord> = h.store.fetch(&check.id).await.unwrap();
        assert_eq!(saved.record.state.as_deref(), Some("up"));
    }

    #[tokio::test]
    async fn failed_send_is_reported_not_raised() {
        let h = harness(RecordingSms::failing()).await;
        let (stored, check) = seed(&h, CheckState::Down, Some(10)).await;

        let report = h.evaluator.process(stored, &check, &Outcome::response(200), 20).await;

        assert!(report.persisted);
        assert!(!report.alerted);
        assert_eq!(h.sms.messages().len(), 1);
    }
}
