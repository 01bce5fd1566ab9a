//! Persistent feature/note/session store
//!
//! Sole owner of on-disk state. Everything lives in one JSON document at
//! `<project>/.autonomous/state.json`; every operation acquires the lock
//! file, reloads the document, applies its change, and commits with a
//! temp-file rename before returning. The auxiliary tool-server process
//! opens the same path, so cross-process writes serialize on the lock.

mod lock;
mod types;

pub use lock::StoreLock;
pub use types::{
    Feature, FeatureSpec, FeatureStatus, KanbanStats, Note, NoteScope, Session, SessionOutcome,
    SessionStatus, StateDocument, StatusCounts,
};

use chrono::{Duration as ChronoDuration, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// A feature that reaches this many retries is failed permanently.
pub const MAX_RETRIES: u32 = 3;

/// How long an operation waits for the store lock before giving up.
const LOCK_TIMEOUT: Duration = Duration::from_secs(10);

const STATE_FILE: &str = "state.json";
const LOCK_FILE: &str = "state.lock";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no store at {0}; run `autodrive ingest` to create one")]
    Missing(PathBuf),

    #[error("feature {0} not found")]
    FeatureNotFound(i64),

    #[error("session {0} not found")]
    SessionNotFound(i64),

    #[error("store already contains {0} features; ingest runs once")]
    AlreadyIngested(usize),

    #[error("duplicate feature id {0} in ingest input")]
    DuplicateFeatureId(i64),

    #[error("could not acquire store lock at {path} within {timeout:?}")]
    LockTimeout { path: PathBuf, timeout: Duration },

    #[error("corrupt state document: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Handle to the on-disk store; cheap to clone
#[derive(Debug, Clone)]
pub struct Store {
    state_path: PathBuf,
    lock_path: PathBuf,
}

impl Store {
    /// Open an existing store. Fails if nothing has been ingested yet.
    pub fn open(state_dir: &Path) -> Result<Self, StoreError> {
        let store = Self::at(state_dir);
        if !store.state_path.exists() {
            return Err(StoreError::Missing(store.state_path));
        }
        Ok(store)
    }

    /// Open the store, creating the state directory and an empty document
    /// if nothing exists yet. Used by ingest.
    pub fn create(state_dir: &Path) -> Result<Self, StoreError> {
        fs::create_dir_all(state_dir)?;
        let store = Self::at(state_dir);
        if !store.state_path.exists() {
            store.write_document(&StateDocument::default())?;
        }
        Ok(store)
    }

    fn at(state_dir: &Path) -> Self {
        Self {
            state_path: state_dir.join(STATE_FILE),
            lock_path: state_dir.join(LOCK_FILE),
        }
    }

    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    // --- document plumbing ---

    fn read_document(&self) -> Result<StateDocument, StoreError> {
        let contents = match fs::read_to_string(&self.state_path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::Missing(self.state_path.clone()))
            }
            Err(e) => return Err(StoreError::Io(e)),
        };
        Ok(serde_json::from_str(&contents)?)
    }

    fn write_document(&self, doc: &StateDocument) -> Result<(), StoreError> {
        let tmp = self.state_path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(doc)?;
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.state_path)?;
        Ok(())
    }

    /// Read-only access. Rename commits are atomic, so readers never see a
    /// torn document and no lock is taken.
    fn with_doc<R>(&self, f: impl FnOnce(&StateDocument) -> R) -> Result<R, StoreError> {
        let doc = self.read_document()?;
        Ok(f(&doc))
    }

    /// Read-modify-write under the lock; commits before returning.
    fn with_doc_mut<R>(
        &self,
        f: impl FnOnce(&mut StateDocument) -> Result<R, StoreError>,
    ) -> Result<R, StoreError> {
        let _lock = StoreLock::acquire(&self.lock_path, LOCK_TIMEOUT)?;
        let mut doc = self.read_document()?;
        let result = f(&mut doc)?;
        self.write_document(&doc)?;
        Ok(result)
    }

    // --- features ---

    /// Insert the initial feature rows. Runs once, against an empty store.
    pub fn ingest(&self, specs: Vec<FeatureSpec>) -> Result<usize, StoreError> {
        self.with_doc_mut(|doc| {
            if !doc.features.is_empty() {
                return Err(StoreError::AlreadyIngested(doc.features.len()));
            }
            let now = Utc::now();
            let mut features: Vec<Feature> =
                specs.into_iter().map(|s| s.into_feature(now)).collect();
            features.sort_by_key(|f| f.id);
            for pair in features.windows(2) {
                if pair[0].id == pair[1].id {
                    return Err(StoreError::DuplicateFeatureId(pair[1].id));
                }
            }
            let count = features.len();
            doc.features = features;
            Ok(count)
        })
    }

    pub fn feature(&self, id: i64) -> Result<Feature, StoreError> {
        self.with_doc(|doc| doc.feature(id).cloned())?
            .ok_or(StoreError::FeatureNotFound(id))
    }

    /// Every feature, ordered by id ascending.
    pub fn all_features(&self) -> Result<Vec<Feature>, StoreError> {
        self.with_doc(|doc| doc.features.clone())
    }

    /// Features with the given status, ordered by id ascending.
    pub fn features_by_status(&self, status: FeatureStatus) -> Result<Vec<Feature>, StoreError> {
        self.with_doc(|doc| {
            doc.features
                .iter()
                .filter(|f| f.status == status)
                .cloned()
                .collect()
        })
    }

    /// Unconditionally set a feature's status, touching `updated_at`.
    pub fn set_status(&self, id: i64, status: FeatureStatus) -> Result<(), StoreError> {
        self.with_doc_mut(|doc| {
            let feature = doc.feature_mut(id).ok_or(StoreError::FeatureNotFound(id))?;
            feature.status = status;
            feature.updated_at = Utc::now();
            Ok(())
        })
    }

    /// Record a retry request: increment the counter and fail the feature
    /// once it reaches `max_retries`, otherwise return it to pending.
    ///
    /// Terminal features are left untouched; the current status and counter
    /// are returned unchanged. This is the only path into the failed state.
    pub fn retry(&self, id: i64, max_retries: u32) -> Result<(FeatureStatus, u32), StoreError> {
        self.with_doc_mut(|doc| {
            let feature = doc.feature_mut(id).ok_or(StoreError::FeatureNotFound(id))?;
            if feature.status.is_terminal() {
                return Ok((feature.status, feature.retry_count));
            }
            feature.retry_count += 1;
            feature.status = if feature.retry_count >= max_retries {
                FeatureStatus::Failed
            } else {
                FeatureStatus::Pending
            };
            feature.updated_at = Utc::now();
            Ok((feature.status, feature.retry_count))
        })
    }

    /// The next work unit: up to `limit` pending features from the category
    /// of the lowest-id pending feature, ascending. Empty iff no pending
    /// work exists anywhere.
    pub fn next_batch(&self, limit: usize) -> Result<Vec<Feature>, StoreError> {
        self.with_doc(|doc| {
            let first_pending = doc
                .features
                .iter()
                .filter(|f| f.status == FeatureStatus::Pending)
                .min_by_key(|f| f.id);
            let Some(first) = first_pending else {
                return Vec::new();
            };
            let mut batch: Vec<Feature> = doc
                .features
                .iter()
                .filter(|f| f.status == FeatureStatus::Pending && f.category == first.category)
                .cloned()
                .collect();
            batch.sort_by_key(|f| f.id);
            batch.truncate(limit);
            batch
        })
    }

    /// True iff at least one feature is pending or in progress.
    pub fn has_incomplete(&self) -> Result<bool, StoreError> {
        self.with_doc(|doc| {
            doc.features
                .iter()
                .any(|f| !f.status.is_terminal())
        })
    }

    /// Return every in-progress feature to pending. Startup recovery only;
    /// any row found here was left behind by a crashed session.
    pub fn reset_orphans(&self) -> Result<usize, StoreError> {
        self.with_doc_mut(|doc| {
            let now = Utc::now();
            let mut count = 0;
            for feature in &mut doc.features {
                if feature.status == FeatureStatus::InProgress {
                    feature.status = FeatureStatus::Pending;
                    feature.updated_at = now;
                    count += 1;
                }
            }
            Ok(count)
        })
    }

    /// Return in-progress features untouched for `hours` hours to pending.
    pub fn reset_stale(&self, hours: i64) -> Result<usize, StoreError> {
        self.with_doc_mut(|doc| {
            let cutoff = Utc::now() - ChronoDuration::hours(hours);
            let now = Utc::now();
            let mut count = 0;
            for feature in &mut doc.features {
                if feature.status == FeatureStatus::InProgress && feature.updated_at < cutoff {
                    feature.status = FeatureStatus::Pending;
                    feature.updated_at = now;
                    count += 1;
                }
            }
            Ok(count)
        })
    }

    pub fn kanban_stats(&self) -> Result<KanbanStats, StoreError> {
        self.with_doc(|doc| {
            let mut stats = KanbanStats::default();
            for feature in &doc.features {
                stats.totals.bump(feature.status);
                stats
                    .by_category
                    .entry(feature.category.clone())
                    .or_default()
                    .bump(feature.status);
            }
            stats
        })
    }

    // --- notes ---

    /// Insert a note. Scope validation happens at the tool surface.
    pub fn add_note(
        &self,
        scope: NoteScope,
        content: &str,
        session_id: i64,
    ) -> Result<Note, StoreError> {
        self.with_doc_mut(|doc| {
            let (feature_id, category) = match scope {
                NoteScope::Feature(id) => {
                    if doc.feature(id).is_none() {
                        return Err(StoreError::FeatureNotFound(id));
                    }
                    (Some(id), None)
                }
                NoteScope::Category(c) => (None, Some(c)),
                NoteScope::Global => (None, None),
            };
            doc.next_note_id += 1;
            let note = Note {
                id: doc.next_note_id,
                feature_id,
                category,
                content: content.to_string(),
                session_id,
                created_at: Utc::now(),
            };
            doc.notes.push(note.clone());
            Ok(note)
        })
    }

    /// Notes whose scope matches the given feature, the given category, or
    /// is global, newest first.
    pub fn notes_for(
        &self,
        feature_id: Option<i64>,
        category: Option<&str>,
    ) -> Result<Vec<Note>, StoreError> {
        self.with_doc(|doc| {
            let mut notes: Vec<Note> = doc
                .notes
                .iter()
                .filter(|n| match n.scope() {
                    NoteScope::Global => true,
                    NoteScope::Feature(id) => feature_id == Some(id),
                    NoteScope::Category(c) => category == Some(c.as_str()),
                })
                .cloned()
                .collect();
            notes.sort_by_key(|n| std::cmp::Reverse(n.id));
            notes
        })
    }

    // --- sessions ---

    /// Open a session row in status running.
    pub fn start_session(&self) -> Result<Session, StoreError> {
        self.with_doc_mut(|doc| {
            doc.next_session_id += 1;
            let session = Session {
                id: doc.next_session_id,
                started_at: Utc::now(),
                ended_at: None,
                status: SessionStatus::Running,
                features_attempted: 0,
                features_completed: 0,
                input_tokens: 0,
                output_tokens: 0,
                cost_usd: 0.0,
                error_message: None,
            };
            doc.sessions.push(session.clone());
            Ok(session)
        })
    }

    /// Close a session row. The terminal transition is written exactly once;
    /// closing an already-closed session changes nothing.
    pub fn end_session(&self, id: i64, outcome: SessionOutcome) -> Result<(), StoreError> {
        self.with_doc_mut(|doc| {
            let session = doc
                .sessions
                .iter_mut()
                .find(|s| s.id == id)
                .ok_or(StoreError::SessionNotFound(id))?;
            if session.ended_at.is_some() {
                tracing::debug!("session {} already closed; leaving it untouched", id);
                return Ok(());
            }
            session.ended_at = Some(Utc::now());
            session.status = outcome.status;
            session.features_attempted = outcome.features_attempted;
            session.features_completed = outcome.features_completed;
            session.input_tokens = outcome.input_tokens;
            session.output_tokens = outcome.output_tokens;
            session.cost_usd = outcome.cost_usd;
            session.error_message = outcome.error_message;
            Ok(())
        })
    }

    pub fn session(&self, id: i64) -> Result<Session, StoreError> {
        self.with_doc(|doc| doc.sessions.iter().find(|s| s.id == id).cloned())?
            .ok_or(StoreError::SessionNotFound(id))
    }

    pub fn sessions(&self) -> Result<Vec<Session>, StoreError> {
        self.with_doc(|doc| doc.sessions.clone())
    }
}
