//! One iteration of the outer loop
//!
//! Open a session row, select the batch, assemble context, invoke the
//! agent, reconcile what it claimed against what the store shows, close
//! the row. The verified count (the delta in completed features across
//! the session) is authoritative; the claimed count is logged when it
//! disagrees but never trusted.

use anyhow::{anyhow, bail, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::context::{self, SessionContext};
use crate::agent::{AgentInvocation, AgentRunner, SessionObserver};
use crate::batch::Batcher;
use crate::config::{
    OrchestratorConfig, HEADLESS_ENV, PORT_ENV, PROJECT_DIR_ENV, TEMPLATE_DIR_ENV,
};
use crate::session_log::SessionLog;
use crate::store::{NoteScope, SessionOutcome, SessionStatus, Store};
use crate::tools::SESSION_ID_ENV;

/// What one pass through the loop produced
#[derive(Debug)]
pub enum IterationOutcome {
    /// No pending work anywhere; the loop is done
    NoWork,
    Completed(IterationStats),
    Failed { session_id: i64, error: String },
}

#[derive(Debug, Clone)]
pub struct IterationStats {
    pub session_id: i64,
    pub attempted: usize,
    pub verified: u32,
    pub claimed: usize,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost_usd: f64,
}

pub struct SessionRunner {
    store: Store,
    batcher: Batcher,
    agent: Arc<dyn AgentRunner>,
    config: Arc<OrchestratorConfig>,
    active_session: Arc<Mutex<Option<i64>>>,
}

impl SessionRunner {
    pub fn new(store: Store, agent: Arc<dyn AgentRunner>, config: Arc<OrchestratorConfig>) -> Self {
        Self {
            batcher: Batcher::new(store.clone()),
            store,
            agent,
            config,
            active_session: Arc::new(Mutex::new(None)),
        }
    }

    /// The session currently open, if any. Used by the cancellation path
    /// to close the in-flight row when the process is interrupted.
    pub fn active_session(&self) -> Arc<Mutex<Option<i64>>> {
        Arc::clone(&self.active_session)
    }

    pub async fn run_iteration(&self) -> Result<IterationOutcome> {
        let session = self.store.start_session()?;
        *self.active_session.lock().unwrap() = Some(session.id);
        let outcome = self.iterate(session.id).await;
        *self.active_session.lock().unwrap() = None;
        outcome
    }

    async fn iterate(&self, session_id: i64) -> Result<IterationOutcome> {
        let pre = self.store.kanban_stats()?;
        let batch = self.batcher.next_batch()?;
        if batch.is_empty() {
            self.store.end_session(session_id, SessionOutcome::empty())?;
            return Ok(IterationOutcome::NoWork);
        }

        let settled = pre.totals.completed + pre.totals.failed;
        tracing::info!(
            "session {}: {}/{} settled, batch of {} from '{}', next #{} {}",
            session_id,
            settled,
            pre.totals.total(),
            batch.len(),
            batch[0].category,
            batch[0].id,
            batch[0].name
        );

        match self.drive(session_id, &batch, &pre).await {
            Ok((observer, result, claimed)) => {
                let post = self.store.kanban_stats()?;
                let verified =
                    post.totals.completed.saturating_sub(pre.totals.completed) as u32;
                if claimed.len() != verified as usize {
                    tracing::warn!(
                        "session {}: agent claimed {} completions ({:?}) but {} were verified",
                        session_id,
                        claimed.len(),
                        claimed,
                        verified
                    );
                }
                observer.write_stats(batch.len(), verified, &result);
                self.store.end_session(
                    session_id,
                    SessionOutcome {
                        status: SessionStatus::Completed,
                        features_attempted: batch.len() as u32,
                        features_completed: verified,
                        input_tokens: result.input_tokens,
                        output_tokens: result.output_tokens,
                        cost_usd: result.cost_usd,
                        error_message: None,
                    },
                )?;
                Ok(IterationOutcome::Completed(IterationStats {
                    session_id,
                    attempted: batch.len(),
                    verified,
                    claimed: claimed.len(),
                    input_tokens: result.input_tokens,
                    output_tokens: result.output_tokens,
                    cost_usd: result.cost_usd,
                }))
            }
            Err(e) => {
                let ids: Vec<i64> = batch.iter().map(|f| f.id).collect();
                let error = format!("{e:#}");
                let note = format!(
                    "Session {session_id} failed while working on {ids:?}. \
                     Error: {error}. See session log."
                );
                if let Err(note_err) = self.store.add_note(NoteScope::Global, &note, session_id) {
                    tracing::warn!("could not record failure note: {}", note_err);
                }
                if let Err(close_err) = self
                    .store
                    .end_session(session_id, SessionOutcome::failed(&error))
                {
                    tracing::warn!("could not close failed session: {}", close_err);
                }
                Ok(IterationOutcome::Failed { session_id, error })
            }
        }
    }

    /// Assemble context, invoke the agent, and insist on a successful
    /// terminal result. Any other ending is this iteration's failure.
    async fn drive(
        &self,
        session_id: i64,
        batch: &[crate::store::Feature],
        pre: &crate::store::KanbanStats,
    ) -> Result<(Arc<SessionObserver>, crate::agent::ResultEvent, Vec<i64>)> {
        let category = batch[0].category.as_str();
        let notes = self.store.notes_for(None, Some(category))?;
        let prompt = context::assemble(&SessionContext {
            batch,
            stats: pre,
            notes: &notes,
            port: self.config.port,
        });

        let log = SessionLog::create(&self.config.state_dir(), session_id)?;
        let observer = Arc::new(SessionObserver::new(log));

        let invocation = AgentInvocation {
            prompt,
            env: self.child_env(session_id),
            working_dir: self.config.project_dir.clone(),
        };

        let outcome = self
            .agent
            .run(invocation, Arc::clone(&observer))
            .await?;

        let Some(result) = outcome.result else {
            let mut message = format!("agent exited ({}) without a result event", outcome.exit);
            if let Some(last) = outcome.stderr_tail.last() {
                message.push_str(&format!("; last stderr: {last}"));
            }
            return Err(anyhow!(message));
        };
        if !result.success {
            bail!("agent reported terminal result '{}'", result.subtype);
        }
        if !outcome.exit.success() {
            bail!("agent subprocess ended with {}", outcome.exit);
        }

        Ok((observer, result, outcome.claimed))
    }

    fn child_env(&self, session_id: i64) -> HashMap<String, String> {
        let config = &self.config;
        HashMap::from([
            (
                PROJECT_DIR_ENV.to_string(),
                config.project_dir.display().to_string(),
            ),
            (SESSION_ID_ENV.to_string(), session_id.to_string()),
            (
                TEMPLATE_DIR_ENV.to_string(),
                config.template_dir.display().to_string(),
            ),
            (PORT_ENV.to_string(), config.port.to_string()),
            (
                HEADLESS_ENV.to_string(),
                if config.headless { "1" } else { "0" }.to_string(),
            ),
        ])
    }
}
