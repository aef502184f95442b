use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

// ============================================================================
// ULID and ID Types
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LogId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TodoId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdeaId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LearningId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccomplishmentId(pub String);

impl fmt::Display for LogId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for TodoId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for IdeaId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for LearningId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for AccomplishmentId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Defaults
// ============================================================================

/// Every default the pipeline applies lives here so it can be audited in one place.
pub mod defaults {
    use super::{IdeaStatus, Impact, Priority};

    /// Confidence assumed when the classifier reports none.
    pub const NEUTRAL_CONFIDENCE: f64 = 0.5;
    /// Confidence strictly above this is `High`.
    pub const HIGH_CONFIDENCE_THRESHOLD: f64 = 0.8;
    /// Confidence at or above this (and not `High`) is `Medium`.
    pub const MEDIUM_CONFIDENCE_THRESHOLD: f64 = 0.5;
    /// Segments below this confidence are flagged for human review.
    pub const REVIEW_THRESHOLD: f64 = 0.5;
    /// Segments below this confidence are dropped from a batch.
    pub const MIN_CONFIDENCE: f64 = 0.0;
    /// Longest transcript accepted for storage, in characters.
    pub const MAX_TRANSCRIPT_LENGTH: usize = 10_000;

    pub const TODO_PRIORITY: Priority = Priority::Medium;
    pub const TODO_COMPLETED: bool = false;
    pub const IDEA_STATUS: IdeaStatus = IdeaStatus::Raw;
    pub const ACCOMPLISHMENT_IMPACT: Impact = Impact::Medium;
}

// ============================================================================
// Segment Classification
// ============================================================================

/// Canonical segment categories produced by the classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SegmentType {
    #[serde(rename = "todo")]
    Todo,
    #[serde(rename = "idea")]
    Idea,
    #[serde(rename = "learning")]
    Learning,
    #[serde(rename = "accomplishment")]
    Accomplishment,
}

impl SegmentType {
    pub const ALL: [SegmentType; 4] = [
        SegmentType::Todo,
        SegmentType::Idea,
        SegmentType::Learning,
        SegmentType::Accomplishment,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SegmentType::Todo => "todo",
            SegmentType::Idea => "idea",
            SegmentType::Learning => "learning",
            SegmentType::Accomplishment => "accomplishment",
        }
    }

    /// Position in the fixed presentation order (todos first)
    pub fn sort_rank(&self) -> u8 {
        match self {
            SegmentType::Todo => 0,
            SegmentType::Idea => 1,
            SegmentType::Learning => 2,
            SegmentType::Accomplishment => 3,
        }
    }
}

impl fmt::Display for SegmentType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConfidenceLevel {
    #[serde(rename = "high")]
    High,
    #[serde(rename = "medium")]
    Medium,
    #[serde(rename = "low")]
    Low,
}

impl ConfidenceLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceLevel::High => "high",
            ConfidenceLevel::Medium => "medium",
            ConfidenceLevel::Low => "low",
        }
    }
}

/// Todo priority, persisted and serialized as its ordinal (1 = high)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    pub fn ordinal(&self) -> u8 {
        match self {
            Priority::High => 1,
            Priority::Medium => 2,
            Priority::Low => 3,
        }
    }

    pub fn from_ordinal(ordinal: u8) -> Option<Self> {
        match ordinal {
            1 => Some(Priority::High),
            2 => Some(Priority::Medium),
            3 => Some(Priority::Low),
            _ => None,
        }
    }

    /// Parse the classifier's "high" / "medium" / "low" label
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "high" => Some(Priority::High),
            "medium" => Some(Priority::Medium),
            "low" => Some(Priority::Low),
            _ => None,
        }
    }
}

impl From<Priority> for u8 {
    fn from(priority: Priority) -> Self {
        priority.ordinal()
    }
}

impl TryFrom<u8> for Priority {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Priority::from_ordinal(value).ok_or_else(|| format!("invalid priority ordinal: {}", value))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdeaStatus {
    #[serde(rename = "raw")]
    Raw, // Just captured
    #[serde(rename = "developing")]
    Developing,
    #[serde(rename = "actionable")]
    Actionable,
    #[serde(rename = "archived")]
    Archived,
}

impl IdeaStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdeaStatus::Raw => "raw",
            IdeaStatus::Developing => "developing",
            IdeaStatus::Actionable => "actionable",
            IdeaStatus::Archived => "archived",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "raw" => Some(IdeaStatus::Raw),
            "developing" => Some(IdeaStatus::Developing),
            "actionable" => Some(IdeaStatus::Actionable),
            "archived" => Some(IdeaStatus::Archived),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Impact {
    #[serde(rename = "low")]
    Low,
    #[serde(rename = "medium")]
    Medium,
    #[serde(rename = "high")]
    High,
}

impl Impact {
    pub fn as_str(&self) -> &'static str {
        match self {
            Impact::Low => "low",
            Impact::Medium => "medium",
            Impact::High => "high",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "low" => Some(Impact::Low),
            "medium" => Some(Impact::Medium),
            "high" => Some(Impact::High),
            _ => None,
        }
    }
}

// ============================================================================
// Classifier Contract (transient, never persisted directly)
// ============================================================================

/// One fragment as emitted by the external classifier
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawSegment {
    #[serde(rename = "type")]
    pub segment_type: String,
    pub text: String,
    #[serde(default)]
    pub confidence: Option<f64>, // 0-1 or 0-100
    #[serde(default)]
    pub timestamp: Option<String>, // RFC3339
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default, alias = "dueDate")]
    pub due_date: Option<String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
}

/// A fragment after type resolution and confidence normalization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedSegment {
    #[serde(rename = "type")]
    pub segment_type: SegmentType,
    pub text: String,
    pub confidence: f64, // always within [0, 1]
    pub confidence_level: ConfidenceLevel,
    pub needs_review: bool,
    pub timestamp: String, // RFC3339
    pub priority: Option<String>,
    pub category: Option<String>,
    pub topic: Option<String>,
    pub due_date: Option<String>,
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
}

// ============================================================================
// Log Schema
// ============================================================================

/// A single journal entry; owns every segment extracted from it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Log {
    pub id: LogId,
    pub date: String, // YYYY-MM-DD
    pub audio_path: Option<String>,
    pub transcript: Option<String>,
    pub summary: Option<String>,
    pub pending_analysis: bool,
    pub retry_count: u32,
    pub last_error: Option<String>,
    pub created_at: String, // RFC3339
    pub updated_at: String, // RFC3339
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Todo {
    pub id: TodoId,
    pub log_id: LogId,
    pub text: String,
    pub completed: bool,
    pub priority: Priority,
    pub due_date: Option<String>,
    pub confidence: Option<f64>,
    pub created_at: String, // RFC3339
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Idea {
    pub id: IdeaId,
    pub log_id: LogId,
    pub text: String,
    pub status: IdeaStatus,
    pub tags: Vec<String>,
    pub created_at: String, // RFC3339
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Learning {
    pub id: LearningId,
    pub log_id: LogId,
    pub text: String,
    pub category: Option<String>,
    pub created_at: String, // RFC3339
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Accomplishment {
    pub id: AccomplishmentId,
    pub log_id: LogId,
    pub text: String,
    pub impact: Impact,
    pub created_at: String, // RFC3339
}

/// A log hydrated with all four child collections
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogWithSegments {
    #[serde(flatten)]
    pub log: Log,
    pub todos: Vec<Todo>,
    pub ideas: Vec<Idea>,
    pub learnings: Vec<Learning>,
    pub accomplishments: Vec<Accomplishment>,
}

impl LogWithSegments {
    pub fn segment_count(&self) -> usize {
        self.todos.len() + self.ideas.len() + self.learnings.len() + self.accomplishments.len()
    }
}

// ============================================================================
// API Request/Response Types
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: usize,
}

/// Partial update of a log's mutable content fields
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogUpdate {
    pub transcript: Option<String>,
    pub summary: Option<String>,
    pub audio_path: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TodoUpdate {
    pub text: Option<String>,
    pub completed: Option<bool>,
    pub priority: Option<Priority>,
    /// Absent leaves the due date alone; `null` clears it
    #[serde(
        default,
        deserialize_with = "deserialize_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub due_date: Option<Option<String>>,
}

/// Maps a present field (including `null`) to `Some`, so a missing field and
/// an explicit `null` stay distinguishable.
fn deserialize_present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdeaUpdate {
    pub text: Option<String>,
    pub status: Option<IdeaStatus>,
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LearningUpdate {
    pub text: Option<String>,
    pub category: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccomplishmentUpdate {
    pub text: Option<String>,
    pub impact: Option<Impact>,
}

// ============================================================================
// Helper Functions
// ============================================================================

pub fn generate_log_id() -> LogId {
    LogId(format!("log_{}", ulid::Ulid::new()))
}

pub fn generate_todo_id() -> TodoId {
    TodoId(format!("todo_{}", ulid::Ulid::new()))
}

pub fn generate_idea_id() -> IdeaId {
    IdeaId(format!("idea_{}", ulid::Ulid::new()))
}

pub fn generate_learning_id() -> LearningId {
    LearningId(format!("lrn_{}", ulid::Ulid::new()))
}

pub fn generate_accomplishment_id() -> AccomplishmentId {
    AccomplishmentId(format!("acc_{}", ulid::Ulid::new()))
}
