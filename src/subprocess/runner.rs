use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use super::error::ProcessError;

/// A fully-specified child process invocation
#[derive(Debug, Clone, Default)]
pub struct ProcessCommand {
    pub program: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub working_dir: Option<PathBuf>,
    pub timeout: Option<Duration>,
    pub stdin: Option<String>,
}

impl ProcessCommand {
    /// Split a shell-style command line into program and args.
    pub fn from_command_line(line: &str) -> Result<Self, ProcessError> {
        let words =
            shell_words::split(line).map_err(|e| ProcessError::InvalidCommand(e.to_string()))?;
        let mut iter = words.into_iter();
        let program = iter.next().ok_or(ProcessError::EmptyCommand)?;
        Ok(Self {
            program,
            args: iter.collect(),
            ..Self::default()
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Success,
    Error(i32),
    Signal(i32),
}

impl ExitStatus {
    pub fn success(&self) -> bool {
        matches!(self, ExitStatus::Success)
    }

    pub fn from_std(status: std::process::ExitStatus) -> Self {
        if status.success() {
            return ExitStatus::Success;
        }
        if let Some(code) = status.code() {
            return ExitStatus::Error(code);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = status.signal() {
                return ExitStatus::Signal(signal);
            }
        }
        ExitStatus::Error(1)
    }
}

impl std::fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitStatus::Success => f.write_str("exit 0"),
            ExitStatus::Error(code) => write!(f, "exit {code}"),
            ExitStatus::Signal(signal) => write!(f, "killed by signal {signal}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_line_splitting() {
        let cmd = ProcessCommand::from_command_line("claude -p --output-format stream-json")
            .unwrap();
        assert_eq!(cmd.program, "claude");
        assert_eq!(cmd.args, vec!["-p", "--output-format", "stream-json"]);
    }

    #[test]
    fn quoted_arguments_survive_splitting() {
        let cmd = ProcessCommand::from_command_line(r#"agent --flag "two words""#).unwrap();
        assert_eq!(cmd.args, vec!["--flag", "two words"]);
    }

    #[test]
    fn empty_command_line_is_rejected() {
        assert!(matches!(
            ProcessCommand::from_command_line(""),
            Err(ProcessError::EmptyCommand)
        ));
    }
}
