//! Orchestrator configuration

use std::path::PathBuf;
use std::time::Duration;

use crate::subprocess::ProcessError;

/// Default dev-server port handed to the agent.
pub const DEFAULT_PORT: u16 = 3000;

/// Sleep between iterations after a failure.
pub const FAILURE_BACKOFF: Duration = Duration::from_secs(5);

/// Consecutive iteration failures before the circuit breaker trips.
pub const MAX_CONSECUTIVE_FAILURES: u32 = 3;

/// Name of the state directory under the target project.
pub const STATE_DIR: &str = ".autonomous";

/// Environment variable names in the agent's child environment.
pub const PROJECT_DIR_ENV: &str = "AUTODRIVE_PROJECT_DIR";
pub const TEMPLATE_DIR_ENV: &str = "AUTODRIVE_TEMPLATE_DIR";
pub const PORT_ENV: &str = "AUTODRIVE_PORT";
pub const HEADLESS_ENV: &str = "AUTODRIVE_HEADLESS";

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// The project the agent works on
    pub project_dir: PathBuf,
    /// Prompt template directory exposed to the agent
    pub template_dir: PathBuf,
    /// Dev-server port; the serial outer loop is what keeps it exclusive
    pub port: u16,
    /// Run the agent's browser tooling headless
    pub headless: bool,
    /// Stop after this many iterations (None = run to completion)
    pub max_iterations: Option<u32>,
    /// Keep looping even after the breaker threshold
    pub force: bool,
    /// Agent launch command: program followed by arguments
    pub agent_command: Vec<String>,
    /// Sleep after a failed iteration before trying again
    pub failure_backoff: Duration,
}

impl OrchestratorConfig {
    pub fn new(project_dir: PathBuf) -> Self {
        let template_dir = project_dir.join("templates");
        Self {
            project_dir,
            template_dir,
            port: DEFAULT_PORT,
            headless: false,
            max_iterations: None,
            force: false,
            agent_command: default_agent_command(None),
            failure_backoff: FAILURE_BACKOFF,
        }
    }

    /// Where the store, lock, and session logs live.
    pub fn state_dir(&self) -> PathBuf {
        self.project_dir.join(STATE_DIR)
    }

    /// Override the agent command from a shell-style string.
    pub fn with_agent_command_line(mut self, line: &str) -> Result<Self, ProcessError> {
        let words =
            shell_words::split(line).map_err(|e| ProcessError::InvalidCommand(e.to_string()))?;
        if words.is_empty() {
            return Err(ProcessError::EmptyCommand);
        }
        self.agent_command = words;
        Ok(self)
    }
}

/// The stock agent invocation: the Claude CLI in print mode with a
/// streamed JSON event output.
pub fn default_agent_command(model: Option<&str>) -> Vec<String> {
    let mut command: Vec<String> = [
        "claude",
        "-p",
        "--output-format",
        "stream-json",
        "--verbose",
        "--dangerously-skip-permissions",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    if let Some(model) = model {
        command.push("--model".to_string());
        command.push(model.to_string());
    }
    command
}
