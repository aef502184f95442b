use chrono::Utc;
use tracing::{info, warn};
use voice_journal_schemas::{Log, LogId};

use crate::database::{self, Database};
use crate::error::Result;

/// Decides whether a pending log should get another analysis attempt
pub trait RetryPolicy: Send + Sync {
    fn should_retry(&self, log: &Log) -> bool;
}

/// Retry until `retry_count` reaches the limit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaxAttempts(pub u32);

impl Default for MaxAttempts {
    fn default() -> Self {
        MaxAttempts(3)
    }
}

impl RetryPolicy for MaxAttempts {
    fn should_retry(&self, log: &Log) -> bool {
        log.pending_analysis && log.retry_count < self.0
    }
}

/// Per-log bookkeeping of failed analysis attempts.
///
/// The ledger only records state; scheduling the next attempt is up to the
/// caller, driven by a [`RetryPolicy`].
pub struct RetryLedger<'a> {
    db: &'a Database,
}

impl<'a> RetryLedger<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Count a failed attempt against the log and keep it pending
    pub fn record_failure(&self, id: &LogId, message: &str) -> Result<Log> {
        let now = Utc::now().to_rfc3339();
        let log = self.db.with_transaction(|tx| {
            database::record_analysis_failure_impl(tx, id, message, &now)?;
            database::require_log(tx, id)
        })?;

        warn!(
            "Analysis failed for log {} (attempt {}): {}",
            id, log.retry_count, message
        );
        Ok(log)
    }

    /// Pending logs the policy still allows to retry, oldest first
    pub fn retry_candidates(&self, policy: &dyn RetryPolicy) -> Result<Vec<Log>> {
        let pending = self.db.with_connection(database::list_pending_logs_impl)?;
        Ok(pending.into_iter().filter(|log| policy.should_retry(log)).collect())
    }

    /// Pending logs the policy has given up on
    pub fn permanently_failed(&self, policy: &dyn RetryPolicy) -> Result<Vec<Log>> {
        let pending = self.db.with_connection(database::list_pending_logs_impl)?;
        Ok(pending.into_iter().filter(|log| !policy.should_retry(log)).collect())
    }

    /// Clear the attempt counter so the log is eligible again
    pub fn reset(&self, id: &LogId) -> Result<Log> {
        let now = Utc::now().to_rfc3339();
        let log = self.db.with_transaction(|tx| {
            database::reset_retries_impl(tx, id, &now)?;
            database::require_log(tx, id)
        })?;

        info!("Reset retry count for log {}", id);
        Ok(log)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageConfig;
    use crate::error::JournalError;
    use crate::storage::StorageCoordinator;
    use voice_journal_schemas::generate_log_id;

    fn store() -> StorageCoordinator {
        StorageCoordinator::new(Database::open_in_memory().unwrap(), StorageConfig::default())
    }

    #[test]
    fn test_max_attempts_default() {
        assert_eq!(MaxAttempts::default(), MaxAttempts(3));
    }

    #[test]
    fn test_failures_accumulate() {
        let store = store();
        let log = store.create_pending_log("retry me", None).unwrap();
        let ledger = RetryLedger::new(store.database());

        let after_one = ledger.record_failure(&log.id, "timeout").unwrap();
        assert_eq!(after_one.retry_count, 1);
        assert_eq!(after_one.last_error.as_deref(), Some("timeout"));
        assert!(after_one.pending_analysis);

        let after_two = ledger.record_failure(&log.id, "rate limited").unwrap();
        assert_eq!(after_two.retry_count, 2);
        assert_eq!(after_two.last_error.as_deref(), Some("rate limited"));
    }

    #[test]
    fn test_candidates_respect_policy() {
        let store = store();
        let ledger = RetryLedger::new(store.database());
        let fresh = store.create_pending_log("fresh", None).unwrap();
        let exhausted = store.create_pending_log("exhausted", None).unwrap();
        store.save_analysis_result("done", &[], None).unwrap();

        for _ in 0..3 {
            ledger.record_failure(&exhausted.id, "boom").unwrap();
        }

        let policy = MaxAttempts::default();
        let candidates = ledger.retry_candidates(&policy).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].id, fresh.id);

        let failed = ledger.permanently_failed(&policy).unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].id, exhausted.id);

        // A more lenient policy picks it up again
        let candidates = ledger.retry_candidates(&MaxAttempts(5)).unwrap();
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].id, fresh.id);
    }

    #[test]
    fn test_reset_restores_eligibility() {
        let store = store();
        let ledger = RetryLedger::new(store.database());
        let log = store.create_pending_log("flaky", None).unwrap();
        for _ in 0..3 {
            ledger.record_failure(&log.id, "boom").unwrap();
        }
        assert!(ledger.retry_candidates(&MaxAttempts(3)).unwrap().is_empty());

        let reset = ledger.reset(&log.id).unwrap();
        assert_eq!(reset.retry_count, 0);
        assert!(reset.last_error.is_none());
        assert!(reset.pending_analysis);
        assert_eq!(ledger.retry_candidates(&MaxAttempts(3)).unwrap().len(), 1);
    }

    #[test]
    fn test_success_clears_pending_state() {
        let store = store();
        let ledger = RetryLedger::new(store.database());
        let log = store.create_pending_log("eventually", None).unwrap();
        ledger.record_failure(&log.id, "first try").unwrap();

        let done = store.complete_analysis(&log.id, &[]).unwrap();
        assert!(!done.log.pending_analysis);
        assert!(done.log.last_error.is_none());
        assert_eq!(done.log.retry_count, 1);
        assert!(ledger.retry_candidates(&MaxAttempts::default()).unwrap().is_empty());
        assert!(ledger.permanently_failed(&MaxAttempts::default()).unwrap().is_empty());
    }

    #[test]
    fn test_late_failure_on_analyzed_log_is_rejected() {
        let store = store();
        let ledger = RetryLedger::new(store.database());
        let todo = crate::classifier::process_segment(
            &voice_journal_schemas::RawSegment {
                segment_type: "todo".to_string(),
                text: "Water the plants".to_string(),
                ..Default::default()
            },
            &crate::config::ExtractionConfig::default(),
        )
        .unwrap();
        let saved = store.save_analysis_result("done", &[todo], None).unwrap();

        let err = ledger.record_failure(&saved.log.id, "late timeout").unwrap_err();
        assert!(matches!(err, JournalError::Validation(_)));

        let after = store.database().get_log(&saved.log.id).unwrap().unwrap();
        assert!(!after.pending_analysis);
        assert_eq!(after.retry_count, 0);
        assert!(after.last_error.is_none());
        assert!(ledger.retry_candidates(&MaxAttempts::default()).unwrap().is_empty());
        assert_eq!(store.database().get_todos_by_log(&saved.log.id).unwrap().len(), 1);
    }

    #[test]
    fn test_unknown_log() {
        let store = store();
        let ledger = RetryLedger::new(store.database());
        let err = ledger.record_failure(&generate_log_id(), "x").unwrap_err();
        assert!(matches!(err, JournalError::NotFound { .. }));
        let err = ledger.reset(&generate_log_id()).unwrap_err();
        assert!(matches!(err, JournalError::NotFound { .. }));
    }
}
