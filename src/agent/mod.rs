//! The agent boundary
//!
//! The agent is an opaque subprocess: it receives the assembled session
//! context on stdin, works inside the target project directory, and emits
//! the typed event stream parsed in [`events`]. The orchestrator only
//! depends on the [`AgentRunner`] trait so tests can substitute a scripted
//! agent for the real CLI.

pub mod events;
pub mod observer;

pub use events::{AgentEvent, ContentBlock, ResultEvent};
pub use observer::{AgentEventProcessor, SessionObserver};

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::subprocess::{run_streaming, ExitStatus, ProcessCommand};

/// Everything one agent invocation needs
#[derive(Debug, Clone)]
pub struct AgentInvocation {
    /// Assembled session context, delivered on stdin
    pub prompt: String,
    /// Child-process environment (`AUTODRIVE_*` variables)
    pub env: HashMap<String, String>,
    /// Target project directory the agent works in
    pub working_dir: PathBuf,
}

/// What came back from one agent invocation
#[derive(Debug, Clone)]
pub struct AgentOutcome {
    pub exit: ExitStatus,
    /// Terminal result event, absent if the agent died without emitting one
    pub result: Option<ResultEvent>,
    /// Feature ids the agent claimed to complete
    pub claimed: Vec<i64>,
    /// Last stderr lines, for failure diagnostics
    pub stderr_tail: Vec<String>,
}

/// Runs the agent subprocess for one session
#[async_trait]
pub trait AgentRunner: Send + Sync {
    async fn run(
        &self,
        invocation: AgentInvocation,
        observer: Arc<SessionObserver>,
    ) -> Result<AgentOutcome>;
}

/// Production runner: spawns the configured agent CLI and streams its
/// output through the observer.
pub struct CliAgentRunner {
    command: Vec<String>,
}

impl CliAgentRunner {
    /// `command` is the program followed by its arguments.
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }
}

#[async_trait]
impl AgentRunner for CliAgentRunner {
    async fn run(
        &self,
        invocation: AgentInvocation,
        observer: Arc<SessionObserver>,
    ) -> Result<AgentOutcome> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or(crate::subprocess::ProcessError::EmptyCommand)?;

        let command = ProcessCommand {
            program: program.clone(),
            args: args.to_vec(),
            env: invocation.env,
            working_dir: Some(invocation.working_dir),
            timeout: None,
            stdin: Some(invocation.prompt),
        };

        let processor: Arc<dyn crate::subprocess::StreamProcessor> =
            Arc::new(AgentEventProcessor::new(Arc::clone(&observer)));
        let output = run_streaming(command, vec![processor]).await?;

        Ok(AgentOutcome {
            exit: output.status,
            result: observer.result(),
            claimed: observer.claimed(),
            stderr_tail: output.stderr_tail,
        })
    }
}
