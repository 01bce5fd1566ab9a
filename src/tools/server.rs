//! Stdio JSON-line tool server
//!
//! Run as an auxiliary subprocess next to the agent, sharing the store
//! path with the orchestrator. Requests arrive one JSON object per line on
//! stdin; each gets exactly one JSON response line on stdout. Malformed
//! requests produce error responses, never a dead server.

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use super::{ToolRequest, ToolResponse, ToolSurface, SESSION_ID_ENV};
use crate::store::Store;

/// The session id the orchestrator placed in the child environment.
/// Sessions opened by the orchestrator start at 1, so 0 marks notes
/// written outside any session.
pub fn session_id_from_env() -> i64 {
    std::env::var(SESSION_ID_ENV)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
}

/// Serve tool requests until stdin closes.
pub async fn serve(store: Store, session_id: i64) -> Result<()> {
    let surface = ToolSurface::new(store, session_id);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    tracing::info!("tool server ready (session {})", session_id);
    while let Some(line) = lines.next_line().await.context("reading tool request")? {
        if line.trim().is_empty() {
            continue;
        }
        let response = handle_line(&surface, &line);
        let mut payload = serde_json::to_string(&response)?;
        payload.push('\n');
        stdout
            .write_all(payload.as_bytes())
            .await
            .context("writing tool response")?;
        stdout.flush().await?;
    }
    Ok(())
}

fn handle_line(surface: &ToolSurface, line: &str) -> ToolResponse {
    match serde_json::from_str::<ToolRequest>(line) {
        Ok(request) => {
            tracing::debug!("tool request: {}", request.tool);
            ToolResponse::from_result(surface.dispatch(&request.tool, request.args))
        }
        Err(e) => ToolResponse::Error {
            error: format!("malformed request: {e}"),
        },
    }
}
