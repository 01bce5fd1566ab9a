//! Line-by-line subprocess streaming
//!
//! Spawns a child, writes the prompt to its stdin, and feeds each output
//! line through the attached processors while the process runs. The child
//! is spawned with kill-on-drop so cancelling the future tears it down.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::Command;

use super::runner::{ExitStatus, ProcessCommand};

/// Which pipe a line arrived on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamSource {
    Stdout,
    Stderr,
}

/// Processes stream output one line at a time
#[async_trait]
pub trait StreamProcessor: Send + Sync {
    async fn process_line(&self, line: &str, source: StreamSource) -> Result<()>;

    async fn on_complete(&self, _exit: ExitStatus) -> Result<()> {
        Ok(())
    }
}

/// Result of a streamed run
#[derive(Debug)]
pub struct StreamingOutput {
    pub status: ExitStatus,
    pub stderr_tail: Vec<String>,
    pub duration: Duration,
}

/// How many stderr lines to keep for error reporting.
const STDERR_TAIL: usize = 20;

/// Run a command, streaming stdout and stderr through `processors`.
pub async fn run_streaming(
    command: ProcessCommand,
    processors: Vec<Arc<dyn StreamProcessor>>,
) -> Result<StreamingOutput> {
    let start = Instant::now();

    let mut cmd = Command::new(&command.program);
    cmd.args(&command.args);
    for (key, value) in &command.env {
        cmd.env(key, value);
    }
    if let Some(dir) = &command.working_dir {
        cmd.current_dir(dir);
    }
    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    tracing::debug!(
        "spawning subprocess: {} {}",
        command.program,
        command.args.join(" ")
    );
    let mut child = cmd
        .spawn()
        .with_context(|| format!("failed to spawn {}", command.program))?;

    if let Some(stdin_data) = &command.stdin {
        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(stdin_data.as_bytes())
                .await
                .context("failed to write prompt to stdin")?;
            stdin.shutdown().await.context("failed to close stdin")?;
        }
    }

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow::anyhow!("failed to capture stdout"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow::anyhow!("failed to capture stderr"))?;

    let processors = Arc::new(processors);
    let stdout_procs = Arc::clone(&processors);
    let stderr_procs = Arc::clone(&processors);

    let stdout_task = tokio::spawn(async move {
        pump_lines(stdout, StreamSource::Stdout, &stdout_procs, 0).await
    });
    let stderr_task = tokio::spawn(async move {
        pump_lines(stderr, StreamSource::Stderr, &stderr_procs, STDERR_TAIL).await
    });

    let raw_status = if let Some(timeout) = command.timeout {
        match tokio::time::timeout(timeout, child.wait()).await {
            Ok(status) => status.context("failed to wait for subprocess")?,
            Err(_) => {
                child.kill().await.ok();
                anyhow::bail!("subprocess timed out after {:?}", timeout);
            }
        }
    } else {
        child.wait().await.context("failed to wait for subprocess")?
    };

    let (_, stderr_tail) = tokio::try_join!(stdout_task, stderr_task)
        .context("stream consumer task panicked")?;

    let status = ExitStatus::from_std(raw_status);
    for processor in processors.iter() {
        processor.on_complete(status).await?;
    }

    Ok(StreamingOutput {
        status,
        stderr_tail,
        duration: start.elapsed(),
    })
}

/// Feed lines from one pipe through the processors, keeping the last
/// `keep` lines for the caller.
async fn pump_lines(
    stream: impl AsyncRead + Unpin,
    source: StreamSource,
    processors: &[Arc<dyn StreamProcessor>],
    keep: usize,
) -> Vec<String> {
    let mut lines = BufReader::new(stream).lines();
    let mut tail: Vec<String> = Vec::new();

    while let Ok(Some(line)) = lines.next_line().await {
        if keep > 0 {
            if tail.len() == keep {
                tail.remove(0);
            }
            tail.push(line.clone());
        }
        for processor in processors {
            if let Err(e) = processor.process_line(&line, source).await {
                tracing::warn!("stream processor failed on {:?} line: {}", source, e);
            }
        }
    }
    tail
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Collector {
        lines: Mutex<Vec<(StreamSource, String)>>,
    }

    #[async_trait]
    impl StreamProcessor for Collector {
        async fn process_line(&self, line: &str, source: StreamSource) -> Result<()> {
            self.lines.lock().unwrap().push((source, line.to_string()));
            Ok(())
        }
    }

    #[tokio::test]
    async fn streams_stdout_lines_in_order() {
        let collector = Arc::new(Collector {
            lines: Mutex::new(Vec::new()),
        });
        let command = ProcessCommand {
            program: "sh".into(),
            args: vec!["-c".into(), "echo one; echo two".into()],
            ..ProcessCommand::default()
        };

        let processors: Vec<Arc<dyn StreamProcessor>> = vec![collector.clone()];
        let output = run_streaming(command, processors).await.unwrap();
        assert!(output.status.success());

        let lines = collector.lines.lock().unwrap();
        let stdout: Vec<&str> = lines
            .iter()
            .filter(|(s, _)| *s == StreamSource::Stdout)
            .map(|(_, l)| l.as_str())
            .collect();
        assert_eq!(stdout, vec!["one", "two"]);
    }

    #[tokio::test]
    async fn delivers_stdin_and_reports_exit_code() {
        let collector = Arc::new(Collector {
            lines: Mutex::new(Vec::new()),
        });
        let command = ProcessCommand {
            program: "sh".into(),
            args: vec!["-c".into(), "cat; exit 3".into()],
            stdin: Some("prompt text\n".into()),
            ..ProcessCommand::default()
        };

        let processors: Vec<Arc<dyn StreamProcessor>> = vec![collector.clone()];
        let output = run_streaming(command, processors).await.unwrap();
        assert_eq!(output.status, ExitStatus::Error(3));

        let lines = collector.lines.lock().unwrap();
        assert!(lines.iter().any(|(_, l)| l == "prompt text"));
    }

    #[tokio::test]
    async fn timeout_kills_the_child() {
        let command = ProcessCommand {
            program: "sleep".into(),
            args: vec!["5".into()],
            timeout: Some(Duration::from_millis(50)),
            ..ProcessCommand::default()
        };

        let result = run_streaming(command, vec![]).await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn keeps_only_the_stderr_tail() {
        let command = ProcessCommand {
            program: "sh".into(),
            args: vec!["-c".into(), "seq 1 30 >&2".into()],
            ..ProcessCommand::default()
        };

        let output = run_streaming(command, vec![]).await.unwrap();
        assert_eq!(output.stderr_tail.len(), STDERR_TAIL);
        assert_eq!(output.stderr_tail.last().map(String::as_str), Some("30"));
    }
}
