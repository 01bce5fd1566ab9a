//! Control tool surface
//!
//! The only write path from the agent into the store. Operations are
//! named, take a JSON argument object, and return either a human-readable
//! result or a structured error. The surface is served to the agent by the
//! hidden `tool-server` subcommand over stdin/stdout JSON lines, with the
//! active session id propagated through the child environment.

mod server;
mod surface;

pub use server::{serve, session_id_from_env};
pub use surface::ToolSurface;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::{FeatureStatus, StoreError};

/// Environment variable carrying the active session id into the agent.
pub const SESSION_ID_ENV: &str = "AUTODRIVE_SESSION_ID";

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown tool '{0}'")]
    UnknownTool(String),

    #[error("invalid arguments: {0}")]
    InvalidArgs(String),

    #[error("invalid status '{0}' (expected in_progress, completed, or pending)")]
    InvalidStatus(String),

    #[error("note content must not be empty")]
    EmptyContent,

    #[error("feature {id} is already {status}; it cannot be retried")]
    TerminalFeature { id: i64, status: FeatureStatus },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// One request line on the tool-server wire
#[derive(Debug, Deserialize)]
pub struct ToolRequest {
    pub tool: String,
    #[serde(default)]
    pub args: serde_json::Value,
}

/// One response line on the tool-server wire
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolResponse {
    Ok { output: String },
    Error { error: String },
}

impl ToolResponse {
    pub fn from_result(result: Result<String, ToolError>) -> Self {
        match result {
            Ok(output) => ToolResponse::Ok { output },
            Err(e) => ToolResponse::Error {
                error: e.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_parses_with_and_without_args() {
        let req: ToolRequest =
            serde_json::from_str(r#"{"tool":"get_stats","args":{"by_category":true}}"#).unwrap();
        assert_eq!(req.tool, "get_stats");
        assert_eq!(req.args["by_category"], true);

        let bare: ToolRequest = serde_json::from_str(r#"{"tool":"get_stats"}"#).unwrap();
        assert!(bare.args.is_null());
    }

    #[test]
    fn responses_serialize_with_a_status_tag() {
        let ok = serde_json::to_string(&ToolResponse::Ok {
            output: "done".into(),
        })
        .unwrap();
        assert!(ok.contains(r#""status":"ok""#));

        let err = serde_json::to_string(&ToolResponse::from_result(Err(
            ToolError::EmptyContent,
        )))
        .unwrap();
        assert!(err.contains(r#""status":"error""#));
        assert!(err.contains("must not be empty"));
    }
}
