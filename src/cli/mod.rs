//! CLI routing

mod args;

pub use args::{Cli, Commands};

use std::path::Path;
use std::sync::Arc;

use crate::agent::CliAgentRunner;
use crate::config::{default_agent_command, OrchestratorConfig, STATE_DIR};
use crate::error::{Error, Result};
use crate::orchestrator::Orchestrator;
use crate::store::{FeatureSpec, Store};
use crate::{tools, validation};

/// Execute the parsed command.
pub async fn execute_command(command: Commands) -> Result<()> {
    match command {
        Commands::Run {
            project,
            max_iterations,
            port,
            model,
            force,
            headless,
            agent,
        } => {
            let project = canonical_project(&project)?;
            let mut config = OrchestratorConfig::new(project);
            config.max_iterations = max_iterations;
            config.port = port;
            config.force = force;
            config.headless = headless;
            config.agent_command = default_agent_command(model.as_deref());
            if let Some(line) = agent {
                config = config.with_agent_command_line(&line)?;
            }

            let runner = Arc::new(CliAgentRunner::new(config.agent_command.clone()));
            let orchestrator = Orchestrator::new(config, runner)?;
            orchestrator.run().await?;
            Ok(())
        }

        Commands::Ingest { file, project } => {
            let project = canonical_project(&project)?;
            let contents = std::fs::read_to_string(&file)?;
            let specs: Vec<FeatureSpec> = serde_json::from_str(&contents)?;

            // Catch fragmented categories at ingest time rather than on
            // the first run.
            let mut preview: Vec<_> = specs
                .iter()
                .cloned()
                .map(|s| s.into_feature(chrono::Utc::now()))
                .collect();
            preview.sort_by_key(|f| f.id);
            validation::ensure_category_contiguity(&preview)?;

            let store = Store::create(&project.join(STATE_DIR))?;
            let count = store.ingest(specs)?;
            println!("Ingested {count} features into {}", store.state_path().display());
            Ok(())
        }

        Commands::Stats {
            project,
            by_category,
        } => {
            let project = canonical_project(&project)?;
            let store = Store::open(&project.join(STATE_DIR))?;
            println!("{}", store.kanban_stats()?.render(by_category));
            Ok(())
        }

        Commands::ToolServer { project } => {
            let project = canonical_project(&project)?;
            let store = Store::open(&project.join(STATE_DIR))?;
            let session_id = tools::session_id_from_env();
            tools::serve(store, session_id).await.map_err(Error::Other)
        }
    }
}

fn canonical_project(path: &Path) -> Result<std::path::PathBuf> {
    let absolute = path
        .canonicalize()
        .map_err(|_| Error::Config(format!("directory not found: {}", path.display())))?;
    if !absolute.is_dir() {
        return Err(Error::Config(format!(
            "not a directory: {}",
            absolute.display()
        )));
    }
    Ok(absolute)
}
