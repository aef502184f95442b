use chrono::Utc;
use rusqlite::Connection;
use tracing::{info, warn};
use voice_journal_schemas::{
    defaults, generate_accomplishment_id, generate_idea_id, generate_learning_id, generate_log_id,
    generate_todo_id, Accomplishment, Idea, Learning, Log, LogId, LogUpdate, LogWithSegments,
    Pagination, Priority, ProcessedSegment, SegmentType, Todo,
};

use crate::config::StorageConfig;
use crate::database::{self, Database};
use crate::error::{JournalError, Result};

/// Child rows derived from one classified batch, not yet written
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SegmentBatch {
    pub todos: Vec<Todo>,
    pub ideas: Vec<Idea>,
    pub learnings: Vec<Learning>,
    pub accomplishments: Vec<Accomplishment>,
}

impl SegmentBatch {
    /// Map processed segments onto entity rows owned by `log_id`
    pub fn from_segments(log_id: &LogId, segments: &[ProcessedSegment], created_at: &str) -> Self {
        let mut batch = SegmentBatch::default();

        for segment in segments {
            match segment.segment_type {
                SegmentType::Todo => batch.todos.push(Todo {
                    id: generate_todo_id(),
                    log_id: log_id.clone(),
                    text: segment.text.clone(),
                    completed: defaults::TODO_COMPLETED,
                    priority: map_priority(segment.priority.as_deref()),
                    due_date: segment.due_date.clone(),
                    confidence: Some(segment.confidence),
                    created_at: created_at.to_string(),
                }),
                SegmentType::Idea => batch.ideas.push(Idea {
                    id: generate_idea_id(),
                    log_id: log_id.clone(),
                    text: segment.text.clone(),
                    status: defaults::IDEA_STATUS,
                    tags: category_to_tags(segment.category.as_deref()),
                    created_at: created_at.to_string(),
                }),
                SegmentType::Learning => batch.learnings.push(Learning {
                    id: generate_learning_id(),
                    log_id: log_id.clone(),
                    text: segment.text.clone(),
                    category: segment.topic.clone().or_else(|| segment.category.clone()),
                    created_at: created_at.to_string(),
                }),
                SegmentType::Accomplishment => batch.accomplishments.push(Accomplishment {
                    id: generate_accomplishment_id(),
                    log_id: log_id.clone(),
                    text: segment.text.clone(),
                    impact: defaults::ACCOMPLISHMENT_IMPACT,
                    created_at: created_at.to_string(),
                }),
            }
        }

        batch
    }

    pub fn len(&self) -> usize {
        self.todos.len() + self.ideas.len() + self.learnings.len() + self.accomplishments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert_all(&self, conn: &Connection) -> Result<()> {
        for todo in &self.todos {
            database::insert_todo_impl(conn, todo)?;
        }
        for idea in &self.ideas {
            database::insert_idea_impl(conn, idea)?;
        }
        for learning in &self.learnings {
            database::insert_learning_impl(conn, learning)?;
        }
        for accomplishment in &self.accomplishments {
            database::insert_accomplishment_impl(conn, accomplishment)?;
        }
        Ok(())
    }

    fn into_hydrated(self, log: Log) -> LogWithSegments {
        LogWithSegments {
            log,
            todos: self.todos,
            ideas: self.ideas,
            learnings: self.learnings,
            accomplishments: self.accomplishments,
        }
    }
}

/// "high" / "medium" / "low" to the stored ordinal; absent or unknown labels
/// fall back to the default priority.
pub fn map_priority(label: Option<&str>) -> Priority {
    match label {
        None => defaults::TODO_PRIORITY,
        Some(label) => Priority::from_label(label).unwrap_or_else(|| {
            warn!("Unrecognized priority {:?}, using default", label);
            defaults::TODO_PRIORITY
        }),
    }
}

fn category_to_tags(category: Option<&str>) -> Vec<String> {
    category
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(|c| vec![c.to_string()])
        .unwrap_or_default()
}

/// Maps classified batches onto the relational model and owns the atomic
/// parent-plus-children write.
pub struct StorageCoordinator {
    db: Database,
    config: StorageConfig,
}

impl StorageCoordinator {
    pub fn new(db: Database, config: StorageConfig) -> Self {
        Self { db, config }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn validate_transcript(&self, transcript: &str) -> Result<()> {
        let length = transcript.chars().count();
        if length > self.config.max_transcript_length {
            return Err(JournalError::Validation(format!(
                "transcript is {} characters, maximum is {}",
                length, self.config.max_transcript_length
            )));
        }
        Ok(())
    }

    /// Persist a transcript and its classified segments as one unit.
    ///
    /// Either the log and every child row commit together or nothing does.
    pub fn save_analysis_result(
        &self,
        transcript: &str,
        segments: &[ProcessedSegment],
        audio_path: Option<&str>,
    ) -> Result<LogWithSegments> {
        self.validate_transcript(transcript)?;

        let mut log = new_log(transcript, audio_path);
        log.pending_analysis = false;
        let batch = SegmentBatch::from_segments(&log.id, segments, &log.created_at);

        self.db.with_transaction(|tx| {
            database::insert_log_impl(tx, &log)?;
            batch.insert_all(tx)
        })?;

        info!(
            "Saved log {} with {} todos, {} ideas, {} learnings, {} accomplishments",
            log.id,
            batch.todos.len(),
            batch.ideas.len(),
            batch.learnings.len(),
            batch.accomplishments.len()
        );

        Ok(batch.into_hydrated(log))
    }

    /// Store an entry whose analysis hasn't run yet
    pub fn create_pending_log(&self, transcript: &str, audio_path: Option<&str>) -> Result<Log> {
        self.validate_transcript(transcript)?;

        let log = new_log(transcript, audio_path);
        self.db.insert_log(&log)?;

        info!("Created pending log {}", log.id);
        Ok(log)
    }

    /// Replace a log's segments with a fresh analysis and mark it analyzed
    pub fn complete_analysis(
        &self,
        id: &LogId,
        segments: &[ProcessedSegment],
    ) -> Result<LogWithSegments> {
        let now = Utc::now().to_rfc3339();

        let (log, batch) = self.db.with_transaction(|tx| {
            database::require_log(tx, id)?;
            let removed = database::delete_segments_for_log_impl(tx, id)?;
            if removed > 0 {
                info!("Replacing {} existing segments of log {}", removed, id);
            }

            let batch = SegmentBatch::from_segments(id, segments, &now);
            batch.insert_all(tx)?;
            database::mark_analysis_succeeded_impl(tx, id, &now)?;

            let log = database::require_log(tx, id)?;
            Ok((log, batch))
        })?;

        info!("Analysis complete for log {} ({} segments)", id, batch.len());
        Ok(batch.into_hydrated(log))
    }

    /// Returns `None` for an unknown id
    pub fn get_log_with_segments(&self, id: &LogId) -> Result<Option<LogWithSegments>> {
        self.db.with_connection(|conn| match database::get_log_impl(conn, id)? {
            Some(log) => hydrate(conn, log).map(Some),
            None => Ok(None),
        })
    }

    pub fn get_all_logs_with_segments(
        &self,
        pagination: Option<Pagination>,
    ) -> Result<Vec<LogWithSegments>> {
        self.db.with_connection(|conn| {
            database::list_logs_impl(conn, pagination.unwrap_or_default())?
                .into_iter()
                .map(|log| hydrate(conn, log))
                .collect()
        })
    }

    pub fn update_log_summary(&self, id: &LogId, summary: &str) -> Result<Log> {
        self.db.update_log(
            id,
            &LogUpdate {
                summary: Some(summary.to_string()),
                ..Default::default()
            },
        )
    }

    /// Delete a log and, by cascade, all of its segments
    pub fn delete_log(&self, id: &LogId) -> Result<()> {
        self.db.delete_log(id)
    }
}

fn new_log(transcript: &str, audio_path: Option<&str>) -> Log {
    let now = Utc::now();
    let timestamp = now.to_rfc3339();
    Log {
        id: generate_log_id(),
        date: now.date_naive().to_string(),
        audio_path: audio_path.map(str::to_string),
        transcript: Some(transcript.to_string()),
        summary: None,
        pending_analysis: true,
        retry_count: 0,
        last_error: None,
        created_at: timestamp.clone(),
        updated_at: timestamp,
    }
}

fn hydrate(conn: &Connection, log: Log) -> Result<LogWithSegments> {
    Ok(LogWithSegments {
        todos: database::get_todos_by_log_impl(conn, &log.id)?,
        ideas: database::get_ideas_by_log_impl(conn, &log.id)?,
        learnings: database::get_learnings_by_log_impl(conn, &log.id)?,
        accomplishments: database::get_accomplishments_by_log_impl(conn, &log.id)?,
        log,
    })
}
