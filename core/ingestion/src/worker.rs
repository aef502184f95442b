use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use voice_journal_schemas::LogId;

use crate::error::{JournalError, Result};
use crate::extractor::SegmentExtractor;
use crate::retry::RetryLedger;
use crate::storage::StorageCoordinator;

/// Result of one classifier run against a pending log
#[derive(Debug, Clone)]
pub enum AnalysisOutcome {
    /// Classifier answered; `payload` is its raw response
    Completed { log_id: LogId, payload: Value },
    /// Classifier call failed before producing a response
    Failed { log_id: LogId, error: String },
}

impl AnalysisOutcome {
    pub fn log_id(&self) -> &LogId {
        match self {
            AnalysisOutcome::Completed { log_id, .. } | AnalysisOutcome::Failed { log_id, .. } => {
                log_id
            }
        }
    }
}

/// Background worker that applies classifier outcomes to stored logs
pub struct AnalysisWorker {
    store: Arc<StorageCoordinator>,
    extractor: Arc<SegmentExtractor>,
    receiver: mpsc::UnboundedReceiver<AnalysisOutcome>,
}

impl AnalysisWorker {
    pub fn new(
        store: Arc<StorageCoordinator>,
        extractor: Arc<SegmentExtractor>,
        receiver: mpsc::UnboundedReceiver<AnalysisOutcome>,
    ) -> Self {
        Self {
            store,
            extractor,
            receiver,
        }
    }

    /// Process outcomes until every sender is dropped
    pub async fn run(mut self) {
        info!("Analysis worker started");

        while let Some(outcome) = self.receiver.recv().await {
            let log_id = outcome.log_id().clone();
            if let Err(e) = self.process_outcome(outcome) {
                error!("Failed to process outcome for log {}: {}", log_id, e);
            }
        }

        warn!("Analysis worker stopped - channel closed");
    }

    fn process_outcome(&self, outcome: AnalysisOutcome) -> Result<()> {
        let ledger = RetryLedger::new(self.store.database());

        match outcome {
            AnalysisOutcome::Failed { log_id, error } => {
                ledger.record_failure(&log_id, &error)?;
                Ok(())
            }
            AnalysisOutcome::Completed { log_id, payload } => {
                info!("Applying analysis to log {}", log_id);

                let result = match self.extractor.parse_and_extract(payload) {
                    Ok(result) => result,
                    Err(e) => {
                        // An unusable response counts as a failed attempt
                        ledger.record_failure(&log_id, &e.to_string())?;
                        return Err(e);
                    }
                };

                match self.store.complete_analysis(&log_id, &result.segments) {
                    Ok(saved) => {
                        info!(
                            "Stored {} segments for log {} ({} skipped, {} filtered)",
                            saved.segment_count(),
                            log_id,
                            result.skipped,
                            result.filtered
                        );
                        Ok(())
                    }
                    Err(e @ JournalError::NotFound { .. }) => Err(e),
                    Err(e) => {
                        ledger.record_failure(&log_id, &e.to_string())?;
                        Err(e)
                    }
                }
            }
        }
    }
}
