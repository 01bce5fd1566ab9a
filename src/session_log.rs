//! Per-session transcript logs
//!
//! One append-only text file per session at
//! `<project>/.autonomous/session-<NNN>.log`: the human-readable agent
//! transcript followed by a final stats block. Nothing in the core reads
//! these back; they exist for the operator.

use chrono::Utc;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

pub struct SessionLog {
    path: PathBuf,
    file: File,
}

impl SessionLog {
    pub fn create(state_dir: &Path, session_id: i64) -> std::io::Result<Self> {
        std::fs::create_dir_all(state_dir)?;
        let path = state_dir.join(format!("session-{session_id:03}.log"));
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one timestamped line.
    pub fn line(&mut self, text: &str) -> std::io::Result<()> {
        writeln!(self.file, "{} | {}", Utc::now().format("%H:%M:%S"), text)
    }

    /// Append the final stats block.
    pub fn stats_block(
        &mut self,
        attempted: usize,
        verified: u32,
        claimed: usize,
        input_tokens: u64,
        output_tokens: u64,
        cost_usd: f64,
    ) -> std::io::Result<()> {
        writeln!(self.file, "---")?;
        writeln!(self.file, "features attempted: {attempted}")?;
        writeln!(self.file, "features verified:  {verified}")?;
        writeln!(self.file, "features claimed:   {claimed}")?;
        writeln!(self.file, "tokens: {input_tokens} in / {output_tokens} out")?;
        writeln!(self.file, "cost: ${cost_usd:.4}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn log_file_is_named_after_the_session() {
        let dir = TempDir::new().unwrap();
        let log = SessionLog::create(dir.path(), 7).unwrap();
        assert!(log.path().ends_with("session-007.log"));
    }

    #[test]
    fn lines_and_stats_append() {
        let dir = TempDir::new().unwrap();
        let mut log = SessionLog::create(dir.path(), 1).unwrap();
        log.line("agent: starting feature #1").unwrap();
        log.stats_block(3, 2, 3, 1000, 500, 0.12).unwrap();

        let contents = std::fs::read_to_string(log.path()).unwrap();
        assert!(contents.contains("starting feature #1"));
        assert!(contents.contains("features verified:  2"));
        assert!(contents.contains("cost: $0.1200"));
    }

    #[test]
    fn reopening_appends_rather_than_truncates() {
        let dir = TempDir::new().unwrap();
        {
            let mut log = SessionLog::create(dir.path(), 2).unwrap();
            log.line("first").unwrap();
        }
        let mut log = SessionLog::create(dir.path(), 2).unwrap();
        log.line("second").unwrap();

        let contents = std::fs::read_to_string(log.path()).unwrap();
        assert!(contents.contains("first"));
        assert!(contents.contains("second"));
    }
}
