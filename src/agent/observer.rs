//! Session observation
//!
//! Watches the agent's event stream during one session: mirrors the
//! transcript into the session log, keeps the rolling list of feature ids
//! the agent *claims* to have completed, and captures the terminal result
//! event. Claims are informational only; reconciliation against the store
//! decides what actually happened.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Mutex;

use super::events::{self, AgentEvent, ContentBlock, ResultEvent};
use crate::session_log::SessionLog;
use crate::subprocess::{StreamProcessor, StreamSource};

pub struct SessionObserver {
    log: Mutex<SessionLog>,
    claimed: Mutex<Vec<i64>>,
    result: Mutex<Option<ResultEvent>>,
}

impl SessionObserver {
    pub fn new(log: SessionLog) -> Self {
        Self {
            log: Mutex::new(log),
            claimed: Mutex::new(Vec::new()),
            result: Mutex::new(None),
        }
    }

    /// Feed one parsed event through the observer.
    pub fn observe(&self, event: &AgentEvent) {
        match event {
            AgentEvent::SystemInit { session_id, model } => {
                self.log_line(&format!("agent session {session_id} started (model {model})"));
            }
            AgentEvent::Assistant { blocks } => {
                for block in blocks {
                    match block {
                        ContentBlock::Text(text) => {
                            for line in text.lines().filter(|l| !l.trim().is_empty()) {
                                self.log_line(&format!("agent: {line}"));
                            }
                        }
                        ContentBlock::ToolUse { name, input } => {
                            self.log_line(&format!("tool: {name} {input}"));
                            if let Some(id) = events::claimed_completion(name, input) {
                                self.claimed.lock().unwrap().push(id);
                            }
                        }
                    }
                }
            }
            AgentEvent::Result(result) => {
                self.log_line(&format!(
                    "result: {} ({} in / {} out, ${:.4})",
                    result.subtype, result.input_tokens, result.output_tokens, result.cost_usd
                ));
                *self.result.lock().unwrap() = Some(result.clone());
            }
            AgentEvent::Other { kind } => {
                tracing::trace!("unhandled agent event type: {}", kind);
            }
        }
    }

    /// Log a raw line that was not a recognizable event.
    pub fn observe_text(&self, line: &str, source: StreamSource) {
        match source {
            StreamSource::Stdout => self.log_line(line),
            StreamSource::Stderr => self.log_line(&format!("stderr: {line}")),
        }
    }

    /// Feature ids the agent claimed to complete, in claim order.
    pub fn claimed(&self) -> Vec<i64> {
        self.claimed.lock().unwrap().clone()
    }

    /// The terminal result event, if one was seen.
    pub fn result(&self) -> Option<ResultEvent> {
        self.result.lock().unwrap().clone()
    }

    pub fn write_stats(
        &self,
        attempted: usize,
        verified: u32,
        result: &ResultEvent,
    ) {
        let claimed = self.claimed.lock().unwrap().len();
        let mut log = self.log.lock().unwrap();
        if let Err(e) = log.stats_block(
            attempted,
            verified,
            claimed,
            result.input_tokens,
            result.output_tokens,
            result.cost_usd,
        ) {
            tracing::warn!("failed to write session stats block: {}", e);
        }
    }

    fn log_line(&self, text: &str) {
        let mut log = self.log.lock().unwrap();
        if let Err(e) = log.line(text) {
            tracing::warn!("failed to append to session log: {}", e);
        }
    }
}

/// Adapts the observer to the subprocess streaming seam: stdout lines are
/// parsed as events, everything else lands in the transcript as text.
pub struct AgentEventProcessor {
    observer: std::sync::Arc<SessionObserver>,
}

impl AgentEventProcessor {
    pub fn new(observer: std::sync::Arc<SessionObserver>) -> Self {
        Self { observer }
    }
}

#[async_trait]
impl StreamProcessor for AgentEventProcessor {
    async fn process_line(&self, line: &str, source: StreamSource) -> Result<()> {
        match source {
            StreamSource::Stdout => match events::parse_line(line) {
                Some(event) => self.observer.observe(&event),
                None => {
                    if !line.trim().is_empty() {
                        self.observer.observe_text(line, source);
                    }
                }
            },
            StreamSource::Stderr => self.observer.observe_text(line, source),
        }
        Ok(())
    }
}
