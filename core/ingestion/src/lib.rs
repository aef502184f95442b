pub mod api;
pub mod classifier;
pub mod config;
pub mod database;
pub mod error;
pub mod extractor;
pub mod retry;
pub mod storage;
pub mod worker;

pub use api::{router, AppState};
pub use classifier::{confidence_level, normalize_confidence, process_segment, validate_segment_type};
pub use config::{ExtractionConfig, ServiceConfig, StorageConfig};
pub use database::{Database, Table, TableCounts};
pub use error::{JournalError, Result};
pub use extractor::{
    calculate_stats, ClassifierResponse, ConfidenceCounts, ExtractionResult, ExtractionStats,
    SegmentExtractor, TypeCounts,
};
pub use retry::{MaxAttempts, RetryLedger, RetryPolicy};
pub use storage::{map_priority, SegmentBatch, StorageCoordinator};
pub use worker::{AnalysisOutcome, AnalysisWorker};
