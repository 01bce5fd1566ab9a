//! The operations the agent may invoke against the store
//!
//! Inputs are validated before the store is touched: unknown features, bad
//! status values, and empty note content come back as structured errors,
//! never as state changes. Results are human-readable strings, written for
//! the agent to read back.

use serde::Deserialize;
use serde_json::Value;

use super::ToolError;
use crate::store::{FeatureStatus, NoteScope, Store, MAX_RETRIES};

/// Default number of rows returned by `list_features`.
const LIST_LIMIT: usize = 10;

pub struct ToolSurface {
    store: Store,
    session_id: i64,
}

#[derive(Debug, Deserialize)]
struct FeatureStatusArgs {
    id: i64,
    status: String,
}

#[derive(Debug, Deserialize)]
struct FeatureNoteArgs {
    id: i64,
    content: String,
}

#[derive(Debug, Deserialize)]
struct CategoryNoteArgs {
    category: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct GlobalNoteArgs {
    content: String,
}

#[derive(Debug, Default, Deserialize)]
struct GetNotesArgs {
    id: Option<i64>,
    category: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct GetStatsArgs {
    #[serde(default)]
    by_category: bool,
}

#[derive(Debug, Default, Deserialize)]
struct ListFeaturesArgs {
    status: Option<String>,
    limit: Option<usize>,
}

impl ToolSurface {
    pub fn new(store: Store, session_id: i64) -> Self {
        Self { store, session_id }
    }

    /// Route one named operation. The only write path from the agent into
    /// the store.
    pub fn dispatch(&self, tool: &str, args: Value) -> Result<String, ToolError> {
        // Tolerate MCP-style prefixes on tool names.
        let name = tool.rsplit("__").next().unwrap_or(tool);
        match name {
            "feature_status" => {
                let args: FeatureStatusArgs = parse_args(args)?;
                self.feature_status(args.id, &args.status)
            }
            "feature_note" => {
                let args: FeatureNoteArgs = parse_args(args)?;
                self.feature_note(args.id, &args.content)
            }
            "category_note" => {
                let args: CategoryNoteArgs = parse_args(args)?;
                self.category_note(&args.category, &args.content)
            }
            "global_note" => {
                let args: GlobalNoteArgs = parse_args(args)?;
                self.global_note(&args.content)
            }
            "get_notes" => {
                let args: GetNotesArgs = parse_args(args)?;
                self.get_notes(args.id, args.category.as_deref())
            }
            "get_stats" => {
                let args: GetStatsArgs = parse_args(args)?;
                self.get_stats(args.by_category)
            }
            "list_features" => {
                let args: ListFeaturesArgs = parse_args(args)?;
                self.list_features(args.status.as_deref(), args.limit)
            }
            other => Err(ToolError::UnknownTool(other.to_string())),
        }
    }

    /// Set a feature's status. A request for `pending` is a retry: the
    /// counter goes up and the feature fails permanently once it crosses
    /// the limit. Retries from a terminal state are rejected.
    pub fn feature_status(&self, id: i64, status: &str) -> Result<String, ToolError> {
        let requested = FeatureStatus::parse(status)
            .ok_or_else(|| ToolError::InvalidStatus(status.to_string()))?;
        let feature = self.store.feature(id)?;

        match requested {
            FeatureStatus::Pending => {
                if feature.status.is_terminal() {
                    return Err(ToolError::TerminalFeature {
                        id,
                        status: feature.status,
                    });
                }
                let (new_status, count) = self.store.retry(id, MAX_RETRIES)?;
                if new_status == FeatureStatus::Failed {
                    Ok(format!(
                        "Feature {} ({}) failed permanently after {} attempts",
                        id, feature.name, count
                    ))
                } else {
                    Ok(format!(
                        "Feature {} ({}) returned to pending (retry {} of {})",
                        id, feature.name, count, MAX_RETRIES
                    ))
                }
            }
            FeatureStatus::InProgress | FeatureStatus::Completed => {
                self.store.set_status(id, requested)?;
                Ok(format!("Feature {} ({}) marked {}", id, feature.name, requested))
            }
            FeatureStatus::Failed => Err(ToolError::InvalidStatus(status.to_string())),
        }
    }

    pub fn feature_note(&self, id: i64, content: &str) -> Result<String, ToolError> {
        let content = non_empty(content)?;
        let note = self
            .store
            .add_note(NoteScope::Feature(id), content, self.session_id)?;
        Ok(format!("Noted on feature {} (note {})", id, note.id))
    }

    pub fn category_note(&self, category: &str, content: &str) -> Result<String, ToolError> {
        let content = non_empty(content)?;
        if category.trim().is_empty() {
            return Err(ToolError::InvalidArgs("category must not be empty".into()));
        }
        let note = self.store.add_note(
            NoteScope::Category(category.to_string()),
            content,
            self.session_id,
        )?;
        Ok(format!("Noted on category {} (note {})", category, note.id))
    }

    pub fn global_note(&self, content: &str) -> Result<String, ToolError> {
        let content = non_empty(content)?;
        let note = self
            .store
            .add_note(NoteScope::Global, content, self.session_id)?;
        Ok(format!("Noted globally (note {})", note.id))
    }

    pub fn get_notes(
        &self,
        id: Option<i64>,
        category: Option<&str>,
    ) -> Result<String, ToolError> {
        let notes = self.store.notes_for(id, category)?;
        if notes.is_empty() {
            return Ok("No notes found".to_string());
        }
        let lines: Vec<String> = notes
            .iter()
            .map(|n| format!("[note {} | session {} | {}] {}", n.id, n.session_id, n.scope(), n.content))
            .collect();
        Ok(lines.join("\n"))
    }

    pub fn get_stats(&self, by_category: bool) -> Result<String, ToolError> {
        Ok(self.store.kanban_stats()?.render(by_category))
    }

    pub fn list_features(
        &self,
        status: Option<&str>,
        limit: Option<usize>,
    ) -> Result<String, ToolError> {
        let status = match status {
            Some(s) => FeatureStatus::parse(s)
                .ok_or_else(|| ToolError::InvalidStatus(s.to_string()))?,
            None => FeatureStatus::Pending,
        };
        let limit = limit.unwrap_or(LIST_LIMIT);
        let features = self.store.features_by_status(status)?;
        if features.is_empty() {
            return Ok(format!("No {status} features"));
        }

        let mut lines: Vec<String> = features
            .iter()
            .take(limit)
            .map(|f| {
                format!(
                    "#{} {} [{}] (retries: {})",
                    f.id, f.name, f.category, f.retry_count
                )
            })
            .collect();
        if features.len() > limit {
            lines.push(format!("... and {} more", features.len() - limit));
        }
        Ok(lines.join("\n"))
    }
}

fn parse_args<T: for<'de> Deserialize<'de>>(args: Value) -> Result<T, ToolError> {
    serde_json::from_value(args).map_err(|e| ToolError::InvalidArgs(e.to_string()))
}

fn non_empty(content: &str) -> Result<&str, ToolError> {
    if content.trim().is_empty() {
        Err(ToolError::EmptyContent)
    } else {
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::FeatureSpec;
    use serde_json::json;
    use tempfile::TempDir;

    fn surface() -> (TempDir, ToolSurface, Store) {
        let dir = TempDir::new().unwrap();
        let store = Store::create(dir.path()).unwrap();
        store
            .ingest(vec![
                FeatureSpec {
                    id: 1,
                    name: "login form".into(),
                    description: "build the login form".into(),
                    category: "auth".into(),
                    steps: vec!["submit valid credentials".into()],
                },
                FeatureSpec {
                    id: 2,
                    name: "logout".into(),
                    description: "add logout".into(),
                    category: "auth".into(),
                    steps: vec![],
                },
            ])
            .unwrap();
        (dir, ToolSurface::new(store.clone(), 5), store)
    }

    #[test]
    fn status_updates_flow_through_dispatch() {
        let (_dir, surface, store) = surface();
        let output = surface
            .dispatch("feature_status", json!({"id": 1, "status": "in_progress"}))
            .unwrap();
        assert!(output.contains("marked in_progress"));
        assert_eq!(store.feature(1).unwrap().status, FeatureStatus::InProgress);

        surface
            .dispatch("feature_status", json!({"id": 1, "status": "completed"}))
            .unwrap();
        assert_eq!(store.feature(1).unwrap().status, FeatureStatus::Completed);
    }

    #[test]
    fn mcp_prefixed_tool_names_are_routed() {
        let (_dir, surface, _store) = surface();
        let output = surface
            .dispatch(
                "mcp__features__feature_status",
                json!({"id": 2, "status": "in_progress"}),
            )
            .unwrap();
        assert!(output.contains("logout"));
    }

    #[test]
    fn pending_request_is_a_retry_with_counter_in_the_reply() {
        let (_dir, surface, store) = surface();
        let output = surface.feature_status(1, "pending").unwrap();
        assert!(output.contains("retry 1 of 3"));
        assert_eq!(store.feature(1).unwrap().retry_count, 1);
    }

    #[test]
    fn third_retry_reports_permanent_failure() {
        let (_dir, surface, store) = surface();
        surface.feature_status(1, "pending").unwrap();
        surface.feature_status(1, "pending").unwrap();
        let output = surface.feature_status(1, "pending").unwrap();
        assert!(output.contains("failed permanently after 3 attempts"));
        assert_eq!(store.feature(1).unwrap().status, FeatureStatus::Failed);
    }

    #[test]
    fn retry_from_terminal_state_is_rejected() {
        let (_dir, surface, store) = surface();
        store.set_status(1, FeatureStatus::Completed).unwrap();
        let err = surface.feature_status(1, "pending").unwrap_err();
        assert!(matches!(
            err,
            ToolError::TerminalFeature {
                id: 1,
                status: FeatureStatus::Completed
            }
        ));
        // Nothing changed.
        assert_eq!(store.feature(1).unwrap().retry_count, 0);
    }

    #[test]
    fn bad_inputs_produce_structured_errors_not_writes() {
        let (_dir, surface, store) = surface();
        assert!(matches!(
            surface.feature_status(99, "completed"),
            Err(ToolError::Store(crate::store::StoreError::FeatureNotFound(99)))
        ));
        assert!(matches!(
            surface.feature_status(1, "done"),
            Err(ToolError::InvalidStatus(_))
        ));
        assert!(matches!(
            surface.feature_status(1, "failed"),
            Err(ToolError::InvalidStatus(_))
        ));
        assert!(matches!(
            surface.feature_note(1, "   "),
            Err(ToolError::EmptyContent)
        ));
        assert!(matches!(
            surface.dispatch("feature_status", json!({"id": "one"})),
            Err(ToolError::InvalidArgs(_))
        ));
        assert!(matches!(
            surface.dispatch("launch_missiles", json!({})),
            Err(ToolError::UnknownTool(_))
        ));
        assert_eq!(store.feature(1).unwrap().status, FeatureStatus::Pending);
    }

    #[test]
    fn notes_carry_the_session_id_from_the_surface() {
        let (_dir, surface, store) = surface();
        surface.feature_note(1, "tricky selector").unwrap();
        surface.category_note("auth", "shared fixture broken").unwrap();
        surface.global_note("dev server needs warmup").unwrap();

        let notes = store.notes_for(Some(1), Some("auth")).unwrap();
        assert_eq!(notes.len(), 3);
        assert!(notes.iter().all(|n| n.session_id == 5));
    }

    #[test]
    fn get_notes_formats_scope_and_content() {
        let (_dir, surface, _store) = surface();
        surface.global_note("remember the port").unwrap();
        let output = surface.get_notes(None, None).unwrap();
        assert!(output.contains("global"));
        assert!(output.contains("remember the port"));

        assert_eq!(surface.get_notes(Some(2), None).unwrap().lines().count(), 1);
    }

    #[test]
    fn list_features_truncates_with_a_more_suffix() {
        let dir = TempDir::new().unwrap();
        let store = Store::create(dir.path()).unwrap();
        let specs: Vec<FeatureSpec> = (1..=12)
            .map(|id| FeatureSpec {
                id,
                name: format!("f{id}"),
                description: String::new(),
                category: "bulk".into(),
                steps: vec![],
            })
            .collect();
        store.ingest(specs).unwrap();
        let surface = ToolSurface::new(store, 1);

        let output = surface.list_features(None, None).unwrap();
        assert!(output.contains("#10"));
        assert!(!output.contains("#11 "));
        assert!(output.contains("... and 2 more"));

        let limited = surface.list_features(Some("pending"), Some(12)).unwrap();
        assert!(!limited.contains("more"));
    }

    #[test]
    fn get_stats_renders_totals() {
        let (_dir, surface, _store) = surface();
        let output = surface.get_stats(false).unwrap();
        assert!(output.contains("pending: 2"));
        let detailed = surface.get_stats(true).unwrap();
        assert!(detailed.contains("auth:"));
    }
}
