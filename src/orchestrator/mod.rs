//! The outer loop
//!
//! Validate the backlog, recover crashed state, then run sessions one at a
//! time until nothing incomplete remains, the iteration cap is hit, the
//! circuit breaker trips, or the process is interrupted. Sessions never
//! overlap; the serial loop is also what keeps the dev-server port
//! exclusive to one agent at a time.

pub mod breaker;
pub mod context;
pub mod runner;

pub use breaker::CircuitBreaker;
pub use runner::{IterationOutcome, IterationStats, SessionRunner};

use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::agent::AgentRunner;
use crate::config::{OrchestratorConfig, MAX_CONSECUTIVE_FAILURES};
use crate::error::Error;
use crate::store::{SessionOutcome, Store};
use crate::{recovery, validation};

/// How the outer loop ended. All of these are clean exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// No pending or in-progress feature remains
    Complete,
    IterationCapReached,
    BreakerTripped,
    Interrupted,
}

pub struct Orchestrator {
    store: Store,
    config: Arc<OrchestratorConfig>,
    agent: Arc<dyn AgentRunner>,
}

impl Orchestrator {
    /// Open the store under the configured project. Fails fast when
    /// nothing has been ingested.
    pub fn new(config: OrchestratorConfig, agent: Arc<dyn AgentRunner>) -> Result<Self, Error> {
        let store = Store::open(&config.state_dir())?;
        Ok(Self {
            store,
            config: Arc::new(config),
            agent,
        })
    }

    pub async fn run(&self) -> Result<RunOutcome, Error> {
        let features = self.store.all_features()?;
        if features.is_empty() {
            return Err(Error::Config(
                "the backlog is empty; ingest features before running".into(),
            ));
        }
        validation::ensure_category_contiguity(&features)?;
        recovery::run(&self.store)?;

        let runner = SessionRunner::new(
            self.store.clone(),
            Arc::clone(&self.agent),
            Arc::clone(&self.config),
        );
        let active_session = runner.active_session();
        let mut breaker = CircuitBreaker::new(MAX_CONSECUTIVE_FAILURES, self.config.force);

        let started = Instant::now();
        let mut iterations = 0u32;
        let mut total_cost = 0.0_f64;

        let outcome = loop {
            if let Some(max) = self.config.max_iterations {
                if iterations >= max {
                    tracing::info!("iteration cap of {} reached", max);
                    break RunOutcome::IterationCapReached;
                }
            }
            if breaker.is_tripped() {
                tracing::warn!(
                    "circuit breaker tripped after {} consecutive failures; \
                     fix the agent environment or rerun with --force",
                    breaker.failures()
                );
                break RunOutcome::BreakerTripped;
            }
            if !self.store.has_incomplete()? {
                break RunOutcome::Complete;
            }

            iterations += 1;
            let iteration = tokio::select! {
                iteration = runner.run_iteration() => iteration,
                _ = shutdown_signal() => {
                    self.close_interrupted(&active_session);
                    break RunOutcome::Interrupted;
                }
            };

            match iteration {
                Ok(IterationOutcome::NoWork) => break RunOutcome::Complete,
                Ok(IterationOutcome::Completed(stats)) => {
                    breaker.record_success();
                    total_cost += stats.cost_usd;
                    tracing::info!(
                        "session {} done: {}/{} verified, ${:.4}",
                        stats.session_id,
                        stats.verified,
                        stats.attempted,
                        stats.cost_usd
                    );
                }
                Ok(IterationOutcome::Failed { session_id, error }) => {
                    let failures = breaker.record_failure();
                    tracing::warn!(
                        "session {} failed ({}/{} consecutive): {}",
                        session_id,
                        failures,
                        MAX_CONSECUTIVE_FAILURES,
                        error
                    );
                    tokio::time::sleep(self.config.failure_backoff).await;
                }
                Err(e) => {
                    let failures = breaker.record_failure();
                    tracing::warn!(
                        "iteration error ({}/{} consecutive): {:#}",
                        failures,
                        MAX_CONSECUTIVE_FAILURES,
                        e
                    );
                    tokio::time::sleep(self.config.failure_backoff).await;
                }
            }
        };

        self.print_summary(outcome, iterations, total_cost, started.elapsed());
        Ok(outcome)
    }

    /// The cancellation path: close the in-flight session row; the agent
    /// subprocess dies with the dropped iteration future.
    fn close_interrupted(&self, active_session: &Arc<Mutex<Option<i64>>>) {
        tracing::warn!("interrupted; shutting down");
        let active = *active_session.lock().unwrap();
        if let Some(session_id) = active {
            if let Err(e) = self
                .store
                .end_session(session_id, SessionOutcome::failed("interrupted"))
            {
                tracing::warn!("could not close interrupted session {}: {}", session_id, e);
            }
        }
    }

    fn print_summary(
        &self,
        outcome: RunOutcome,
        iterations: u32,
        total_cost: f64,
        elapsed: std::time::Duration,
    ) {
        let stats = match self.store.kanban_stats() {
            Ok(stats) => stats,
            Err(e) => {
                tracing::warn!("could not read final stats: {}", e);
                return;
            }
        };

        println!();
        match outcome {
            RunOutcome::Complete => println!("Backlog settled."),
            RunOutcome::IterationCapReached => println!("Iteration cap reached."),
            RunOutcome::BreakerTripped => println!(
                "Stopped: {MAX_CONSECUTIVE_FAILURES} consecutive session failures. \
                 Investigate, then rerun (use --force to bypass the breaker)."
            ),
            RunOutcome::Interrupted => println!("Interrupted."),
        }
        println!(
            "  sessions: {} | completed: {}/{} | failed: {}",
            iterations,
            stats.totals.completed,
            stats.totals.total(),
            stats.totals.failed
        );
        println!(
            "  cost: ${:.2} | duration: {}s",
            total_cost,
            elapsed.as_secs()
        );
        println!("  session logs: {}", self.config.state_dir().display());

        let incomplete = stats.totals.pending + stats.totals.in_progress;
        if incomplete > 0 && outcome != RunOutcome::Complete {
            println!(
                "Incomplete - run again to continue: autodrive run {}",
                self.config.project_dir.display()
            );
        }
    }
}

/// Resolves when the process receives SIGINT or, on unix, SIGTERM.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = match signal(SignalKind::terminate()) {
            Ok(term) => term,
            Err(e) => {
                tracing::warn!("could not install SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
