use anyhow::Result;
use serde_json::json;
use std::sync::Arc;
use tempfile::NamedTempFile;
use tokio::sync::mpsc;
use voice_journal_ingestion::{
    AnalysisOutcome, AnalysisWorker, Database, JournalError, MaxAttempts, RetryLedger,
    SegmentExtractor, StorageConfig, StorageCoordinator, Table,
};
use voice_journal_schemas::{ConfidenceLevel, SegmentType};

fn open_store(file: &NamedTempFile) -> Result<StorageCoordinator> {
    Ok(StorageCoordinator::new(
        Database::new(file.path())?,
        StorageConfig::default(),
    ))
}

fn assert_no_rows(store: &StorageCoordinator) -> Result<()> {
    let db = store.database();
    for table in [
        Table::Logs,
        Table::Todos,
        Table::Ideas,
        Table::Learnings,
        Table::Accomplishments,
    ] {
        assert_eq!(db.count_rows(table)?, 0, "{} should be empty", table.as_str());
    }
    Ok(())
}

#[test]
fn test_classify_and_persist_end_to_end() -> Result<()> {
    println!("=== Classify and persist a mixed payload ===\n");

    let file = NamedTempFile::new()?;
    let store = open_store(&file)?;
    let extractor = SegmentExtractor::default();

    let payload = r#"{
        "transcript": "Finish the report. Idea for a garden app. Learned about lifetimes. Ran a 5k.",
        "segments": [
            {"type": "task", "text": "Finish the report", "confidence": 85, "priority": "high"},
            {"type": "idea", "text": "Garden app", "confidence": 0.4, "category": "side-project"},
            {"type": "note", "text": "Lifetimes tie borrows to scopes", "topic": "rust"},
            {"type": "accomplishment", "text": "Ran a 5k", "confidence": 0.95},
            {"type": "meeting", "text": "Standup at 10"},
            {"text": "no type at all"}
        ]
    }"#;

    let result = extractor.parse_and_extract(payload)?;
    assert_eq!(result.segments.len(), 4);
    assert_eq!(result.skipped, 2);
    assert_eq!(result.stats.needs_review, 1);

    let todo = &result.segments[0];
    assert_eq!(todo.segment_type, SegmentType::Todo);
    assert_eq!(todo.confidence, 0.85);
    assert_eq!(todo.confidence_level, ConfidenceLevel::High);
    assert!(!todo.needs_review);
    println!("✓ Classified 4 of 6 fragments");

    let transcript = result.transcript.as_deref().unwrap_or_default();
    let saved = store.save_analysis_result(transcript, &result.segments, Some("/rec/1.m4a"))?;

    assert_eq!(saved.segment_count(), result.segments.len());
    assert_eq!(saved.todos[0].priority.ordinal(), 1);
    assert_eq!(saved.ideas[0].tags, vec!["side-project".to_string()]);
    assert_eq!(saved.learnings[0].category.as_deref(), Some("rust"));
    assert!(saved.todos.iter().all(|t| t.log_id == saved.log.id));
    assert!(saved.ideas.iter().all(|i| i.log_id == saved.log.id));
    assert!(saved.learnings.iter().all(|l| l.log_id == saved.log.id));
    assert!(saved.accomplishments.iter().all(|a| a.log_id == saved.log.id));
    println!("✓ Saved log {} with {} segments", saved.log.id, saved.segment_count());

    // Reopen the file to make sure everything was committed
    drop(store);
    let store = open_store(&file)?;
    let loaded = store.get_log_with_segments(&saved.log.id)?.expect("log should exist");
    assert_eq!(loaded, saved);
    println!("✓ Read back after reopening");

    Ok(())
}

#[test]
fn test_rejected_transcript_leaves_store_empty() -> Result<()> {
    let file = NamedTempFile::new()?;
    let store = open_store(&file)?;
    let extractor = SegmentExtractor::default();

    let payload = json!({
        "transcript": "A".repeat(15_000),
        "segments": [{"type": "todo", "text": "x"}]
    });
    let result = extractor.parse_and_extract(payload)?;
    let transcript = result.transcript.clone().unwrap_or_default();

    let err = store
        .save_analysis_result(&transcript, &result.segments, None)
        .unwrap_err();
    assert!(matches!(err, JournalError::Validation(_)));
    assert_no_rows(&store)?;

    Ok(())
}

#[test]
fn test_delete_cascades_through_file_store() -> Result<()> {
    let file = NamedTempFile::new()?;
    let store = open_store(&file)?;
    let extractor = SegmentExtractor::default();

    let result = extractor.parse_and_extract(json!({
        "transcript": "two todos and an idea",
        "segments": [
            {"type": "todo", "text": "one"},
            {"type": "todo", "text": "two"},
            {"type": "idea", "text": "three"}
        ]
    }))?;
    let saved = store.save_analysis_result("two todos and an idea", &result.segments, None)?;

    store.delete_log(&saved.log.id)?;

    let db = store.database();
    assert!(db.get_todos_by_log(&saved.log.id)?.is_empty());
    assert!(db.get_ideas_by_log(&saved.log.id)?.is_empty());
    assert!(db.get_learnings_by_log(&saved.log.id)?.is_empty());
    assert!(db.get_accomplishments_by_log(&saved.log.id)?.is_empty());
    assert_no_rows(&store)?;

    Ok(())
}

#[tokio::test]
async fn test_concurrent_saves_lose_nothing() -> Result<()> {
    let file = NamedTempFile::new()?;
    let store = Arc::new(open_store(&file)?);

    let mut handles = Vec::new();
    for i in 0..50 {
        let store = store.clone();
        handles.push(tokio::task::spawn_blocking(move || {
            let extractor = SegmentExtractor::default();
            let result = extractor.parse_and_extract(json!({
                "transcript": format!("entry {}", i),
                "segments": [
                    {"type": "todo", "text": format!("todo {}", i)},
                    {"type": "learning", "text": format!("learning {}", i)}
                ]
            }))?;
            store
                .save_analysis_result(&format!("entry {}", i), &result.segments, None)
                .map_err(anyhow::Error::from)
        }));
    }

    for handle in handles {
        let saved = handle.await??;
        assert_eq!(saved.segment_count(), 2);
    }

    let db = store.database();
    assert_eq!(db.count_rows(Table::Logs)?, 50);
    assert_eq!(db.count_rows(Table::Todos)?, 50);
    assert_eq!(db.count_rows(Table::Learnings)?, 50);

    let all = store.get_all_logs_with_segments(None)?;
    assert!(all.iter().all(|l| l.segment_count() == 2));

    Ok(())
}

#[tokio::test]
async fn test_pending_log_retry_lifecycle() -> Result<()> {
    println!("=== Pending analysis with retries ===\n");

    let file = NamedTempFile::new()?;
    let store = Arc::new(open_store(&file)?);
    let policy = MaxAttempts(2);

    let log = store.create_pending_log("Remember to water the plants", None)?;

    let (tx, rx) = mpsc::unbounded_channel();
    let worker = AnalysisWorker::new(store.clone(), Arc::new(SegmentExtractor::default()), rx);
    let handle = tokio::spawn(worker.run());

    tx.send(AnalysisOutcome::Failed {
        log_id: log.id.clone(),
        error: "classifier unavailable".to_string(),
    })?;
    tx.send(AnalysisOutcome::Failed {
        log_id: log.id.clone(),
        error: "classifier unavailable".to_string(),
    })?;

    // Let the worker drain before inspecting the ledger
    tx.send(AnalysisOutcome::Completed {
        log_id: log.id.clone(),
        payload: json!({
            "segments": [{"type": "todo", "text": "Water the plants", "priority": "low"}]
        }),
    })?;
    drop(tx);
    handle.await?;

    let ledger = RetryLedger::new(store.database());
    assert!(ledger.retry_candidates(&policy)?.is_empty());
    assert!(ledger.permanently_failed(&policy)?.is_empty());

    let saved = store.get_log_with_segments(&log.id)?.expect("log should exist");
    assert!(!saved.log.pending_analysis);
    assert_eq!(saved.log.retry_count, 2);
    assert!(saved.log.last_error.is_none());
    assert_eq!(saved.todos.len(), 1);
    assert_eq!(saved.todos[0].priority.ordinal(), 3);
    println!("✓ Log analyzed after two failed attempts");

    Ok(())
}

#[test]
fn test_exhausted_logs_stop_being_candidates() -> Result<()> {
    let file = NamedTempFile::new()?;
    let store = open_store(&file)?;
    let ledger = RetryLedger::new(store.database());
    let policy = MaxAttempts::default();

    let log = store.create_pending_log("never works", None)?;
    for attempt in 1..=3 {
        assert_eq!(ledger.retry_candidates(&policy)?.len(), 1);
        let updated = ledger.record_failure(&log.id, "boom")?;
        assert_eq!(updated.retry_count, attempt);
    }

    assert!(ledger.retry_candidates(&policy)?.is_empty());
    assert_eq!(ledger.permanently_failed(&policy)?.len(), 1);

    Ok(())
}
