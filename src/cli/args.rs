//! CLI argument structures

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Drive an autonomous coding agent through a feature backlog
#[derive(Parser)]
#[command(name = "autodrive")]
#[command(about = "autodrive - drive a coding agent through a feature backlog", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Enable verbose output (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the orchestration loop until the backlog settles
    #[command(name = "run")]
    Run {
        /// Target project directory
        #[arg(default_value = ".")]
        project: PathBuf,

        /// Stop after this many sessions (default: run to completion)
        #[arg(short = 'n', long)]
        max_iterations: Option<u32>,

        /// Dev-server port handed to the agent
        #[arg(long, default_value_t = crate::config::DEFAULT_PORT)]
        port: u16,

        /// Model shorthand passed to the agent CLI
        #[arg(long)]
        model: Option<String>,

        /// Keep looping even after repeated session failures
        #[arg(long)]
        force: bool,

        /// Run the agent's browser tooling headless
        #[arg(long)]
        headless: bool,

        /// Override the agent launch command (shell-style string)
        #[arg(long, value_name = "COMMAND")]
        agent: Option<String>,
    },

    /// Load a JSON feature list into a fresh backlog
    #[command(name = "ingest")]
    Ingest {
        /// Feature list file: [{id, name, description, category, steps}]
        file: PathBuf,

        /// Target project directory
        #[arg(short = 'p', long, default_value = ".")]
        project: PathBuf,
    },

    /// Show backlog counts by status
    #[command(name = "stats")]
    Stats {
        /// Target project directory
        #[arg(short = 'p', long, default_value = ".")]
        project: PathBuf,

        /// Break the counts down per category
        #[arg(long)]
        by_category: bool,
    },

    /// Serve the agent-facing tool surface over stdin/stdout (internal)
    #[command(name = "tool-server", hide = true)]
    ToolServer {
        /// Target project directory
        #[arg(short = 'p', long, default_value = ".")]
        project: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_defaults() {
        let cli = Cli::parse_from(["autodrive", "run"]);
        let Commands::Run {
            project,
            max_iterations,
            port,
            force,
            ..
        } = cli.command
        else {
            panic!("expected run command");
        };
        assert_eq!(project, PathBuf::from("."));
        assert_eq!(max_iterations, None);
        assert_eq!(port, 3000);
        assert!(!force);
    }

    #[test]
    fn run_flags_parse() {
        let cli = Cli::parse_from([
            "autodrive", "run", "/tmp/app", "-n", "5", "--port", "4000", "--model", "sonnet",
            "--force", "--headless", "-vv",
        ]);
        assert_eq!(cli.verbose, 2);
        let Commands::Run {
            max_iterations,
            port,
            model,
            force,
            headless,
            ..
        } = cli.command
        else {
            panic!("expected run command");
        };
        assert_eq!(max_iterations, Some(5));
        assert_eq!(port, 4000);
        assert_eq!(model.as_deref(), Some("sonnet"));
        assert!(force);
        assert!(headless);
    }
}
