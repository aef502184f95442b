use chrono::Utc;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use serde::Serialize;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, error, info};
use voice_journal_schemas::{
    Accomplishment, AccomplishmentId, AccomplishmentUpdate, Idea, IdeaId, IdeaStatus, IdeaUpdate,
    Impact, Learning, LearningId, LearningUpdate, Log, LogId, LogUpdate, Pagination, Priority,
    Todo, TodoId, TodoUpdate,
};

use crate::error::{JournalError, Result};

/// Tables owned by the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Logs,
    Todos,
    Ideas,
    Learnings,
    Accomplishments,
}

impl Table {
    pub const CHILDREN: [Table; 4] = [
        Table::Todos,
        Table::Ideas,
        Table::Learnings,
        Table::Accomplishments,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Logs => "logs",
            Table::Todos => "todos",
            Table::Ideas => "ideas",
            Table::Learnings => "learnings",
            Table::Accomplishments => "accomplishments",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TableCounts {
    pub logs: usize,
    pub todos: usize,
    pub ideas: usize,
    pub learnings: usize,
    pub accomplishments: usize,
}

/// Embedded SQLite store. The connection is the only shared mutable resource;
/// every access goes through the mutex, so readers never see a transaction
/// mid-flight.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) the database file and apply the schema
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        let db = Self::from_connection(conn)?;

        info!("Database initialized");
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        // Cascades and FK checks are off by default in SQLite
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| JournalError::LockPoisoned)
    }

    /// Run `f` against the connection outside any explicit transaction
    pub fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.lock()?;
        f(&conn)
    }

    /// Run `f` inside a transaction: commit on `Ok`, roll back on `Err`
    pub fn with_transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Transaction) -> Result<T>,
    {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        match f(&tx) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback() {
                    error!("Rollback failed after {}: {}", e, rollback_err);
                } else {
                    debug!("Transaction rolled back: {}", e);
                }
                Err(e)
            }
        }
    }

    // ========== LOGS ==========

    pub fn insert_log(&self, log: &Log) -> Result<()> {
        self.with_connection(|conn| insert_log_impl(conn, log))
    }

    pub fn get_log(&self, id: &LogId) -> Result<Option<Log>> {
        self.with_connection(|conn| get_log_impl(conn, id))
    }

    /// Logs newest first
    pub fn list_logs(&self, pagination: Pagination) -> Result<Vec<Log>> {
        self.with_connection(|conn| list_logs_impl(conn, pagination))
    }

    pub fn update_log(&self, id: &LogId, update: &LogUpdate) -> Result<Log> {
        self.with_transaction(|tx| {
            let now = Utc::now().to_rfc3339();
            let changed = tx.execute(
                "UPDATE logs SET
                    transcript = COALESCE(?2, transcript),
                    summary = COALESCE(?3, summary),
                    audio_path = COALESCE(?4, audio_path),
                    updated_at = ?5
                 WHERE id = ?1",
                params![id.0, update.transcript, update.summary, update.audio_path, now],
            )?;
            if changed == 0 {
                return Err(JournalError::not_found("log", id.0.clone()));
            }
            require_log(tx, id)
        })
    }

    /// Delete a log; the schema's ON DELETE CASCADE removes its children in
    /// the same statement.
    pub fn delete_log(&self, id: &LogId) -> Result<()> {
        self.with_connection(|conn| delete_log_impl(conn, id))
    }

    pub fn count_rows(&self, table: Table) -> Result<usize> {
        self.with_connection(|conn| count_rows_impl(conn, table))
    }

    /// Row counts of every table, read under a single lock
    pub fn table_counts(&self) -> Result<TableCounts> {
        self.with_connection(|conn| {
            Ok(TableCounts {
                logs: count_rows_impl(conn, Table::Logs)?,
                todos: count_rows_impl(conn, Table::Todos)?,
                ideas: count_rows_impl(conn, Table::Ideas)?,
                learnings: count_rows_impl(conn, Table::Learnings)?,
                accomplishments: count_rows_impl(conn, Table::Accomplishments)?,
            })
        })
    }

    // ========== TODOS ==========

    pub fn insert_todo(&self, todo: &Todo) -> Result<()> {
        self.with_connection(|conn| insert_todo_impl(conn, todo))
    }

    pub fn get_todos_by_log(&self, log_id: &LogId) -> Result<Vec<Todo>> {
        self.with_connection(|conn| get_todos_by_log_impl(conn, log_id))
    }

    pub fn list_todos(&self) -> Result<Vec<Todo>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(&format!("{} ORDER BY rowid ASC", TODO_SELECT))?;
            let todos = stmt
                .query_map([], row_to_todo)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(todos)
        })
    }

    pub fn update_todo(&self, id: &TodoId, update: &TodoUpdate) -> Result<Todo> {
        self.with_transaction(|tx| {
            let mut todo = tx
                .query_row(&format!("{} WHERE id = ?1", TODO_SELECT), params![id.0], row_to_todo)
                .optional()?
                .ok_or_else(|| JournalError::not_found("todo", id.0.clone()))?;

            if let Some(ref text) = update.text {
                todo.text = text.clone();
            }
            if let Some(completed) = update.completed {
                todo.completed = completed;
            }
            if let Some(priority) = update.priority {
                todo.priority = priority;
            }
            if let Some(ref due_date) = update.due_date {
                todo.due_date = due_date.clone();
            }

            tx.execute(
                "UPDATE todos SET text = ?2, completed = ?3, priority = ?4, due_date = ?5
                 WHERE id = ?1",
                params![
                    todo.id.0,
                    todo.text,
                    todo.completed as i32,
                    todo.priority.ordinal(),
                    todo.due_date,
                ],
            )?;
            Ok(todo)
        })
    }

    pub fn delete_todo(&self, id: &TodoId) -> Result<()> {
        self.with_connection(|conn| delete_by_id(conn, Table::Todos, "todo", &id.0))
    }

    // ========== IDEAS ==========

    pub fn insert_idea(&self, idea: &Idea) -> Result<()> {
        self.with_connection(|conn| insert_idea_impl(conn, idea))
    }

    pub fn get_ideas_by_log(&self, log_id: &LogId) -> Result<Vec<Idea>> {
        self.with_connection(|conn| get_ideas_by_log_impl(conn, log_id))
    }

    pub fn list_ideas(&self) -> Result<Vec<Idea>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(&format!("{} ORDER BY rowid ASC", IDEA_SELECT))?;
            let ideas = stmt
                .query_map([], row_to_idea)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(ideas)
        })
    }

    pub fn update_idea(&self, id: &IdeaId, update: &IdeaUpdate) -> Result<Idea> {
        self.with_transaction(|tx| {
            let mut idea = tx
                .query_row(&format!("{} WHERE id = ?1", IDEA_SELECT), params![id.0], row_to_idea)
                .optional()?
                .ok_or_else(|| JournalError::not_found("idea", id.0.clone()))?;

            if let Some(ref text) = update.text {
                idea.text = text.clone();
            }
            if let Some(status) = update.status {
                idea.status = status;
            }
            if let Some(ref tags) = update.tags {
                idea.tags = tags.clone();
            }

            tx.execute(
                "UPDATE ideas SET text = ?2, status = ?3, tags = ?4 WHERE id = ?1",
                params![idea.id.0, idea.text, idea.status.as_str(), encode_tags(&idea.tags)?],
            )?;
            Ok(idea)
        })
    }

    pub fn delete_idea(&self, id: &IdeaId) -> Result<()> {
        self.with_connection(|conn| delete_by_id(conn, Table::Ideas, "idea", &id.0))
    }

    // ========== LEARNINGS ==========

    pub fn insert_learning(&self, learning: &Learning) -> Result<()> {
        self.with_connection(|conn| insert_learning_impl(conn, learning))
    }

    pub fn get_learnings_by_log(&self, log_id: &LogId) -> Result<Vec<Learning>> {
        self.with_connection(|conn| get_learnings_by_log_impl(conn, log_id))
    }

    pub fn list_learnings(&self) -> Result<Vec<Learning>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(&format!("{} ORDER BY rowid ASC", LEARNING_SELECT))?;
            let learnings = stmt
                .query_map([], row_to_learning)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(learnings)
        })
    }

    pub fn update_learning(&self, id: &LearningId, update: &LearningUpdate) -> Result<Learning> {
        self.with_transaction(|tx| {
            let mut learning = tx
                .query_row(
                    &format!("{} WHERE id = ?1", LEARNING_SELECT),
                    params![id.0],
                    row_to_learning,
                )
                .optional()?
                .ok_or_else(|| JournalError::not_found("learning", id.0.clone()))?;

            if let Some(ref text) = update.text {
                learning.text = text.clone();
            }
            if update.category.is_some() {
                learning.category = update.category.clone();
            }

            tx.execute(
                "UPDATE learnings SET text = ?2, category = ?3 WHERE id = ?1",
                params![learning.id.0, learning.text, learning.category],
            )?;
            Ok(learning)
        })
    }

    pub fn delete_learning(&self, id: &LearningId) -> Result<()> {
        self.with_connection(|conn| delete_by_id(conn, Table::Learnings, "learning", &id.0))
    }

    // ========== ACCOMPLISHMENTS ==========

    pub fn insert_accomplishment(&self, accomplishment: &Accomplishment) -> Result<()> {
        self.with_connection(|conn| insert_accomplishment_impl(conn, accomplishment))
    }

    pub fn get_accomplishments_by_log(&self, log_id: &LogId) -> Result<Vec<Accomplishment>> {
        self.with_connection(|conn| get_accomplishments_by_log_impl(conn, log_id))
    }

    pub fn list_accomplishments(&self) -> Result<Vec<Accomplishment>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(&format!("{} ORDER BY rowid ASC", ACCOMPLISHMENT_SELECT))?;
            let accomplishments = stmt
                .query_map([], row_to_accomplishment)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(accomplishments)
        })
    }

    pub fn update_accomplishment(
        &self,
        id: &AccomplishmentId,
        update: &AccomplishmentUpdate,
    ) -> Result<Accomplishment> {
        self.with_transaction(|tx| {
            let mut accomplishment = tx
                .query_row(
                    &format!("{} WHERE id = ?1", ACCOMPLISHMENT_SELECT),
                    params![id.0],
                    row_to_accomplishment,
                )
                .optional()?
                .ok_or_else(|| JournalError::not_found("accomplishment", id.0.clone()))?;

            if let Some(ref text) = update.text {
                accomplishment.text = text.clone();
            }
            if let Some(impact) = update.impact {
                accomplishment.impact = impact;
            }

            tx.execute(
                "UPDATE accomplishments SET text = ?2, impact = ?3 WHERE id = ?1",
                params![accomplishment.id.0, accomplishment.text, accomplishment.impact.as_str()],
            )?;
            Ok(accomplishment)
        })
    }

    pub fn delete_accomplishment(&self, id: &AccomplishmentId) -> Result<()> {
        self.with_connection(|conn| {
            delete_by_id(conn, Table::Accomplishments, "accomplishment", &id.0)
        })
    }
}

// ============================================================================
// Schema
// ============================================================================

/// Create all tables and indexes
fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS logs (
            id TEXT PRIMARY KEY,
            date TEXT NOT NULL,
            audio_path TEXT,
            transcript TEXT,
            summary TEXT,
            pending_analysis INTEGER NOT NULL DEFAULT 1,
            retry_count INTEGER NOT NULL DEFAULT 0,
            last_error TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS todos (
            id TEXT PRIMARY KEY,
            log_id TEXT NOT NULL,
            text TEXT NOT NULL,
            completed INTEGER NOT NULL DEFAULT 0,
            priority INTEGER NOT NULL DEFAULT 2 CHECK (priority BETWEEN 1 AND 3),
            due_date TEXT,
            confidence REAL,
            created_at TEXT NOT NULL,
            FOREIGN KEY (log_id) REFERENCES logs(id) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS ideas (
            id TEXT PRIMARY KEY,
            log_id TEXT NOT NULL,
            text TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'raw'
                CHECK (status IN ('raw', 'developing', 'actionable', 'archived')),
            tags TEXT NOT NULL DEFAULT '[]',
            created_at TEXT NOT NULL,
            FOREIGN KEY (log_id) REFERENCES logs(id) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS learnings (
            id TEXT PRIMARY KEY,
            log_id TEXT NOT NULL,
            text TEXT NOT NULL,
            category TEXT,
            created_at TEXT NOT NULL,
            FOREIGN KEY (log_id) REFERENCES logs(id) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS accomplishments (
            id TEXT PRIMARY KEY,
            log_id TEXT NOT NULL,
            text TEXT NOT NULL,
            impact TEXT NOT NULL DEFAULT 'medium'
                CHECK (impact IN ('low', 'medium', 'high')),
            created_at TEXT NOT NULL,
            FOREIGN KEY (log_id) REFERENCES logs(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_logs_created ON logs(created_at DESC);
        CREATE INDEX IF NOT EXISTS idx_logs_pending ON logs(pending_analysis);
        CREATE INDEX IF NOT EXISTS idx_todos_log ON todos(log_id);
        CREATE INDEX IF NOT EXISTS idx_ideas_log ON ideas(log_id);
        CREATE INDEX IF NOT EXISTS idx_learnings_log ON learnings(log_id);
        CREATE INDEX IF NOT EXISTS idx_accomplishments_log ON accomplishments(log_id);",
    )?;

    Ok(())
}

// ============================================================================
// Row operations shared by the gateway and transactional callers
// ============================================================================

const LOG_SELECT: &str = "SELECT id, date, audio_path, transcript, summary, pending_analysis,
        retry_count, last_error, created_at, updated_at
    FROM logs";

const TODO_SELECT: &str = "SELECT id, log_id, text, completed, priority, due_date, confidence,
        created_at
    FROM todos";

const IDEA_SELECT: &str = "SELECT id, log_id, text, status, tags, created_at FROM ideas";

const LEARNING_SELECT: &str = "SELECT id, log_id, text, category, created_at FROM learnings";

const ACCOMPLISHMENT_SELECT: &str =
    "SELECT id, log_id, text, impact, created_at FROM accomplishments";

pub(crate) fn insert_log_impl(conn: &Connection, log: &Log) -> Result<()> {
    conn.execute(
        "INSERT INTO logs (id, date, audio_path, transcript, summary, pending_analysis,
                           retry_count, last_error, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            log.id.0,
            log.date,
            log.audio_path,
            log.transcript,
            log.summary,
            log.pending_analysis as i32,
            log.retry_count,
            log.last_error,
            log.created_at,
            log.updated_at,
        ],
    )?;

    debug!("Inserted log: {}", log.id);
    Ok(())
}

pub(crate) fn get_log_impl(conn: &Connection, id: &LogId) -> Result<Option<Log>> {
    let log = conn
        .query_row(&format!("{} WHERE id = ?1", LOG_SELECT), params![id.0], row_to_log)
        .optional()?;
    Ok(log)
}

pub(crate) fn require_log(conn: &Connection, id: &LogId) -> Result<Log> {
    get_log_impl(conn, id)?.ok_or_else(|| JournalError::not_found("log", id.0.clone()))
}

pub(crate) fn list_logs_impl(conn: &Connection, pagination: Pagination) -> Result<Vec<Log>> {
    // SQLite treats a negative LIMIT as "no limit"
    let limit = pagination.limit.map(|l| l as i64).unwrap_or(-1);

    let mut stmt = conn.prepare(&format!(
        "{} ORDER BY created_at DESC, rowid DESC LIMIT ?1 OFFSET ?2",
        LOG_SELECT
    ))?;
    let logs = stmt
        .query_map(params![limit, pagination.offset as i64], row_to_log)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(logs)
}

/// Pending logs, oldest first
pub(crate) fn list_pending_logs_impl(conn: &Connection) -> Result<Vec<Log>> {
    let mut stmt = conn.prepare(&format!(
        "{} WHERE pending_analysis = 1 ORDER BY created_at ASC, rowid ASC",
        LOG_SELECT
    ))?;
    let logs = stmt
        .query_map([], row_to_log)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(logs)
}

pub(crate) fn mark_analysis_succeeded_impl(conn: &Connection, id: &LogId, now: &str) -> Result<()> {
    let changed = conn.execute(
        "UPDATE logs SET pending_analysis = 0, last_error = NULL, updated_at = ?2 WHERE id = ?1",
        params![id.0, now],
    )?;
    if changed == 0 {
        return Err(JournalError::not_found("log", id.0.clone()));
    }
    Ok(())
}

pub(crate) fn record_analysis_failure_impl(
    conn: &Connection,
    id: &LogId,
    message: &str,
    now: &str,
) -> Result<()> {
    // Only pending logs can fail; an analyzed log never re-enters the queue
    let changed = conn.execute(
        "UPDATE logs SET retry_count = retry_count + 1, last_error = ?2, updated_at = ?3
         WHERE id = ?1 AND pending_analysis = 1",
        params![id.0, message, now],
    )?;
    if changed == 0 {
        require_log(conn, id)?;
        return Err(JournalError::Validation(format!(
            "log {} is not pending analysis",
            id
        )));
    }
    Ok(())
}

pub(crate) fn reset_retries_impl(conn: &Connection, id: &LogId, now: &str) -> Result<()> {
    let changed = conn.execute(
        "UPDATE logs SET retry_count = 0, last_error = NULL, updated_at = ?2 WHERE id = ?1",
        params![id.0, now],
    )?;
    if changed == 0 {
        return Err(JournalError::not_found("log", id.0.clone()));
    }
    Ok(())
}

pub(crate) fn delete_log_impl(conn: &Connection, id: &LogId) -> Result<()> {
    let deleted = conn.execute("DELETE FROM logs WHERE id = ?1", params![id.0])?;
    if deleted == 0 {
        return Err(JournalError::not_found("log", id.0.clone()));
    }

    info!("Deleted log {} and its segments", id);
    Ok(())
}

fn count_rows_impl(conn: &Connection, table: Table) -> Result<usize> {
    let sql = format!("SELECT COUNT(*) FROM {}", table.as_str());
    let count: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
    Ok(count as usize)
}

/// Remove every child row of a log, leaving the log itself in place
pub(crate) fn delete_segments_for_log_impl(conn: &Connection, log_id: &LogId) -> Result<usize> {
    let mut removed = 0;
    for table in Table::CHILDREN {
        removed += conn.execute(
            &format!("DELETE FROM {} WHERE log_id = ?1", table.as_str()),
            params![log_id.0],
        )?;
    }
    Ok(removed)
}

fn delete_by_id(conn: &Connection, table: Table, entity: &'static str, id: &str) -> Result<()> {
    let deleted = conn.execute(
        &format!("DELETE FROM {} WHERE id = ?1", table.as_str()),
        params![id],
    )?;
    if deleted == 0 {
        return Err(JournalError::not_found(entity, id));
    }
    Ok(())
}

pub(crate) fn insert_todo_impl(conn: &Connection, todo: &Todo) -> Result<()> {
    conn.execute(
        "INSERT INTO todos (id, log_id, text, completed, priority, due_date, confidence, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            todo.id.0,
            todo.log_id.0,
            todo.text,
            todo.completed as i32,
            todo.priority.ordinal(),
            todo.due_date,
            todo.confidence,
            todo.created_at,
        ],
    )?;

    debug!("Inserted todo: {} (log: {})", todo.id, todo.log_id);
    Ok(())
}

pub(crate) fn get_todos_by_log_impl(conn: &Connection, log_id: &LogId) -> Result<Vec<Todo>> {
    let mut stmt = conn.prepare(&format!("{} WHERE log_id = ?1 ORDER BY rowid ASC", TODO_SELECT))?;
    let todos = stmt
        .query_map(params![log_id.0], row_to_todo)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(todos)
}

pub(crate) fn insert_idea_impl(conn: &Connection, idea: &Idea) -> Result<()> {
    conn.execute(
        "INSERT INTO ideas (id, log_id, text, status, tags, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            idea.id.0,
            idea.log_id.0,
            idea.text,
            idea.status.as_str(),
            encode_tags(&idea.tags)?,
            idea.created_at,
        ],
    )?;

    debug!("Inserted idea: {} (log: {})", idea.id, idea.log_id);
    Ok(())
}

pub(crate) fn get_ideas_by_log_impl(conn: &Connection, log_id: &LogId) -> Result<Vec<Idea>> {
    let mut stmt = conn.prepare(&format!("{} WHERE log_id = ?1 ORDER BY rowid ASC", IDEA_SELECT))?;
    let ideas = stmt
        .query_map(params![log_id.0], row_to_idea)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(ideas)
}

pub(crate) fn insert_learning_impl(conn: &Connection, learning: &Learning) -> Result<()> {
    conn.execute(
        "INSERT INTO learnings (id, log_id, text, category, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            learning.id.0,
            learning.log_id.0,
            learning.text,
            learning.category,
            learning.created_at,
        ],
    )?;

    debug!("Inserted learning: {} (log: {})", learning.id, learning.log_id);
    Ok(())
}

pub(crate) fn get_learnings_by_log_impl(conn: &Connection, log_id: &LogId) -> Result<Vec<Learning>> {
    let mut stmt =
        conn.prepare(&format!("{} WHERE log_id = ?1 ORDER BY rowid ASC", LEARNING_SELECT))?;
    let learnings = stmt
        .query_map(params![log_id.0], row_to_learning)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(learnings)
}

pub(crate) fn insert_accomplishment_impl(
    conn: &Connection,
    accomplishment: &Accomplishment,
) -> Result<()> {
    conn.execute(
        "INSERT INTO accomplishments (id, log_id, text, impact, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            accomplishment.id.0,
            accomplishment.log_id.0,
            accomplishment.text,
            accomplishment.impact.as_str(),
            accomplishment.created_at,
        ],
    )?;

    debug!(
        "Inserted accomplishment: {} (log: {})",
        accomplishment.id, accomplishment.log_id
    );
    Ok(())
}

pub(crate) fn get_accomplishments_by_log_impl(
    conn: &Connection,
    log_id: &LogId,
) -> Result<Vec<Accomplishment>> {
    let mut stmt = conn.prepare(&format!(
        "{} WHERE log_id = ?1 ORDER BY rowid ASC",
        ACCOMPLISHMENT_SELECT
    ))?;
    let accomplishments = stmt
        .query_map(params![log_id.0], row_to_accomplishment)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(accomplishments)
}

// ============================================================================
// Row mapping
// ============================================================================

fn row_to_log(row: &Row) -> rusqlite::Result<Log> {
    Ok(Log {
        id: LogId(row.get(0)?),
        date: row.get(1)?,
        audio_path: row.get(2)?,
        transcript: row.get(3)?,
        summary: row.get(4)?,
        pending_analysis: row.get::<_, i64>(5)? != 0,
        retry_count: row.get(6)?,
        last_error: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

fn row_to_todo(row: &Row) -> rusqlite::Result<Todo> {
    let ordinal: u8 = row.get(4)?;
    let priority = Priority::from_ordinal(ordinal)
        .ok_or_else(|| conversion_error(4, Type::Integer, format!("priority {}", ordinal)))?;

    Ok(Todo {
        id: TodoId(row.get(0)?),
        log_id: LogId(row.get(1)?),
        text: row.get(2)?,
        completed: row.get::<_, i64>(3)? != 0,
        priority,
        due_date: row.get(5)?,
        confidence: row.get(6)?,
        created_at: row.get(7)?,
    })
}

fn row_to_idea(row: &Row) -> rusqlite::Result<Idea> {
    let status_raw: String = row.get(3)?;
    let status = IdeaStatus::parse(&status_raw)
        .ok_or_else(|| conversion_error(3, Type::Text, format!("idea status {:?}", status_raw)))?;
    let tags_json: String = row.get(4)?;

    Ok(Idea {
        id: IdeaId(row.get(0)?),
        log_id: LogId(row.get(1)?),
        text: row.get(2)?,
        status,
        tags: decode_tags(&tags_json)?,
        created_at: row.get(5)?,
    })
}

fn row_to_learning(row: &Row) -> rusqlite::Result<Learning> {
    Ok(Learning {
        id: LearningId(row.get(0)?),
        log_id: LogId(row.get(1)?),
        text: row.get(2)?,
        category: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn row_to_accomplishment(row: &Row) -> rusqlite::Result<Accomplishment> {
    let impact_raw: String = row.get(3)?;
    let impact = Impact::parse(&impact_raw)
        .ok_or_else(|| conversion_error(3, Type::Text, format!("impact {:?}", impact_raw)))?;

    Ok(Accomplishment {
        id: AccomplishmentId(row.get(0)?),
        log_id: LogId(row.get(1)?),
        text: row.get(2)?,
        impact,
        created_at: row.get(4)?,
    })
}

// Tag lists cross the storage edge as a JSON array in a TEXT column; nothing
// above this module sees the encoded form.
fn encode_tags(tags: &[String]) -> Result<String> {
    Ok(serde_json::to_string(tags)?)
}

fn decode_tags(raw: &str) -> rusqlite::Result<Vec<String>> {
    serde_json::from_str(raw).map_err(json_error)
}

fn json_error(err: serde_json::Error) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(err))
}

fn conversion_error(column: usize, ty: Type, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, ty, message.into())
}
