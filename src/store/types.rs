//! Record types for the feature backlog store

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Status of a feature in the backlog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureStatus {
    /// Waiting to be picked up by a session
    Pending,
    /// Claimed by the currently running session
    InProgress,
    /// All verification steps passed
    Completed,
    /// Retries exhausted
    Failed,
}

impl FeatureStatus {
    /// Completed and failed features are never drawn again by the batcher.
    pub fn is_terminal(&self) -> bool {
        matches!(self, FeatureStatus::Completed | FeatureStatus::Failed)
    }

    /// Parse the snake_case form used on the wire and in the CLI.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(FeatureStatus::Pending),
            "in_progress" => Some(FeatureStatus::InProgress),
            "completed" => Some(FeatureStatus::Completed),
            "failed" => Some(FeatureStatus::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for FeatureStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FeatureStatus::Pending => "pending",
            FeatureStatus::InProgress => "in_progress",
            FeatureStatus::Completed => "completed",
            FeatureStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// An atomic unit of work: one testable feature specification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feature {
    /// Globally unique id, assigned at ingest, never reassigned
    pub id: i64,
    /// Short human name
    pub name: String,
    /// Longer description of the work
    pub description: String,
    /// Category slug; ids within a category form a contiguous range
    pub category: String,
    /// Ordered human-readable verification steps
    pub steps: Vec<String>,
    pub status: FeatureStatus,
    pub retry_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Ingest-time shape of a feature, before status and timestamps exist
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureSpec {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub category: String,
    #[serde(default)]
    pub steps: Vec<String>,
}

impl FeatureSpec {
    pub fn into_feature(self, now: DateTime<Utc>) -> Feature {
        Feature {
            id: self.id,
            name: self.name,
            description: self.description,
            category: self.category,
            steps: self.steps,
            status: FeatureStatus::Pending,
            retry_count: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Scope of a note: exactly one of feature, category, or global
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoteScope {
    Feature(i64),
    Category(String),
    Global,
}

impl fmt::Display for NoteScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NoteScope::Feature(id) => write!(f, "feature {id}"),
            NoteScope::Category(c) => write!(f, "category {c}"),
            NoteScope::Global => f.write_str("global"),
        }
    }
}

/// Free-text context attached to a feature, a category, or the whole project
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Note {
    pub id: i64,
    /// Set iff the note is feature-scoped
    pub feature_id: Option<i64>,
    /// Set iff the note is category-scoped
    pub category: Option<String>,
    pub content: String,
    /// Session that wrote the note
    pub session_id: i64,
    pub created_at: DateTime<Utc>,
}

impl Note {
    pub fn scope(&self) -> NoteScope {
        match (self.feature_id, &self.category) {
            (Some(id), _) => NoteScope::Feature(id),
            (None, Some(c)) => NoteScope::Category(c.clone()),
            (None, None) => NoteScope::Global,
        }
    }
}

/// Status of one agent invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Running,
    Completed,
    Failed,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionStatus::Running => "running",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// One invocation of the agent subprocess, bracketed by open/close rows
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: i64,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub status: SessionStatus,
    pub features_attempted: u32,
    /// Verified completions: the delta in the completed count over the session
    pub features_completed: u32,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost_usd: f64,
    pub error_message: Option<String>,
}

/// Terminal stats written exactly once when a session closes
#[derive(Debug, Clone, Default)]
pub struct SessionOutcome {
    pub status: SessionStatus,
    pub features_attempted: u32,
    pub features_completed: u32,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost_usd: f64,
    pub error_message: Option<String>,
}

impl Default for SessionStatus {
    fn default() -> Self {
        SessionStatus::Completed
    }
}

impl SessionOutcome {
    /// Close a session that found no work to do.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: SessionStatus::Failed,
            error_message: Some(message.into()),
            ..Self::default()
        }
    }
}

/// Counts of features by status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub failed: usize,
}

impl StatusCounts {
    pub fn bump(&mut self, status: FeatureStatus) {
        match status {
            FeatureStatus::Pending => self.pending += 1,
            FeatureStatus::InProgress => self.in_progress += 1,
            FeatureStatus::Completed => self.completed += 1,
            FeatureStatus::Failed => self.failed += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.pending + self.in_progress + self.completed + self.failed
    }
}

impl fmt::Display for StatusCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "pending: {} | in_progress: {} | completed: {} | failed: {}",
            self.pending, self.in_progress, self.completed, self.failed
        )
    }
}

/// Kanban view of the backlog: global counts plus per-category breakdown
#[derive(Debug, Clone, Default)]
pub struct KanbanStats {
    pub totals: StatusCounts,
    pub by_category: BTreeMap<String, StatusCounts>,
}

impl KanbanStats {
    /// Render for humans; the per-category breakdown is optional.
    pub fn render(&self, by_category: bool) -> String {
        let mut out = format!("{} (total: {})", self.totals, self.totals.total());
        if by_category {
            for (category, counts) in &self.by_category {
                out.push_str(&format!("\n  {category}: {counts}"));
            }
        }
        out
    }
}

/// The whole persisted state: three relations plus id counters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateDocument {
    pub features: Vec<Feature>,
    pub notes: Vec<Note>,
    pub sessions: Vec<Session>,
    pub next_note_id: i64,
    pub next_session_id: i64,
}

impl StateDocument {
    pub fn feature(&self, id: i64) -> Option<&Feature> {
        self.features.iter().find(|f| f.id == id)
    }

    pub fn feature_mut(&mut self, id: i64) -> Option<&mut Feature> {
        self.features.iter_mut().find(|f| f.id == id)
    }
}
