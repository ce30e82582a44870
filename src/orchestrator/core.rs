//! Fan-out of bisection sessions over a shared worker pool.
//!
//! The orchestrator turns a batch of session specs into concurrent
//! sessions, tracks per-session status, and owns the two stop levers:
//! graceful (finish in-flight evaluations, start nothing new) and forceful
//! (abandon in-flight evaluations too).

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::Config;
use crate::data::Database;
use crate::eval::{BinaryProbe, Evaluator, OutcomeChecker};
use crate::search::BisectReport;
use crate::state::StateSpace;

use super::pool::WorkerPool;
use super::session::{BisectionSession, SessionError, SessionSpec};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Pending,
    Active,
    Done,
    Stopped,
    Failed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Pending => "pending",
            SessionStatus::Active => "active",
            SessionStatus::Done => "done",
            SessionStatus::Stopped => "stopped",
            SessionStatus::Failed => "failed",
        }
    }
}

/// How one session of a batch ended.
#[derive(Debug)]
pub struct SessionOutcome {
    pub session_id: Uuid,
    pub mech_group: String,
    pub status: SessionStatus,
    pub report: Option<BisectReport>,
    pub error: Option<String>,
}

/// Runs batches of bisection sessions against shared stores.
pub struct Orchestrator {
    db: Database,
    evaluator: Arc<dyn Evaluator>,
    probe: Arc<dyn BinaryProbe>,
    checker: Arc<dyn OutcomeChecker>,
    config: Config,
    pool: WorkerPool,
    graceful: CancellationToken,
    statuses: Arc<Mutex<HashMap<Uuid, SessionStatus>>>,
}

impl Orchestrator {
    pub fn new(
        db: Database,
        evaluator: Arc<dyn Evaluator>,
        probe: Arc<dyn BinaryProbe>,
        checker: Arc<dyn OutcomeChecker>,
        config: Config,
    ) -> Self {
        let pool = WorkerPool::new(config.workers);
        Self {
            db,
            evaluator,
            probe,
            checker,
            config,
            pool,
            graceful: CancellationToken::new(),
            statuses: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Run every job to completion and report how each ended.
    ///
    /// Outcomes come back in job order. A failure in one session never
    /// tears down its siblings.
    pub async fn run(&self, jobs: Vec<(SessionSpec, StateSpace)>) -> Vec<SessionOutcome> {
        let mut meta = Vec::with_capacity(jobs.len());
        let mut handles = Vec::with_capacity(jobs.len());

        for (spec, space) in jobs {
            let session = BisectionSession::new(
                spec,
                space,
                &self.db,
                self.evaluator.clone(),
                self.probe.clone(),
                self.checker.clone(),
                self.pool.clone(),
                self.graceful.child_token(),
                &self.config,
            );
            let id = session.id();
            let mech_group = session.spec().mech_group.clone();
            self.statuses.lock().insert(id, SessionStatus::Pending);

            let statuses = self.statuses.clone();
            handles.push(tokio::spawn(async move {
                statuses.lock().insert(id, SessionStatus::Active);
                session.run().await
            }));
            meta.push((id, mech_group));
        }

        let finished = futures::future::join_all(handles).await;
        let mut outcomes = Vec::with_capacity(finished.len());
        for ((id, mech_group), joined) in meta.into_iter().zip(finished) {
            let outcome = match joined {
                Ok(Ok(report)) => SessionOutcome {
                    session_id: id,
                    mech_group,
                    status: SessionStatus::Done,
                    report: Some(report),
                    error: None,
                },
                Ok(Err(SessionError::Stopped)) => SessionOutcome {
                    session_id: id,
                    mech_group,
                    status: SessionStatus::Stopped,
                    report: None,
                    error: None,
                },
                Ok(Err(err)) => {
                    tracing::error!(session = %id, error = %err, "bisection session failed");
                    SessionOutcome {
                        session_id: id,
                        mech_group,
                        status: SessionStatus::Failed,
                        report: None,
                        error: Some(err.to_string()),
                    }
                }
                Err(join_err) => {
                    tracing::error!(session = %id, error = %join_err, "bisection session panicked");
                    SessionOutcome {
                        session_id: id,
                        mech_group,
                        status: SessionStatus::Failed,
                        report: None,
                        error: Some(join_err.to_string()),
                    }
                }
            };
            self.statuses.lock().insert(id, outcome.status);
            outcomes.push(outcome);
        }
        outcomes
    }

    /// Stop accepting new evaluations; in-flight ones run to completion and
    /// their results are recorded.
    pub fn stop_gracefully(&self) {
        tracing::info!("graceful stop requested");
        self.graceful.cancel();
    }

    /// Stop everything, in-flight evaluations included.
    pub fn stop_forcefully(&self) {
        tracing::info!("forceful stop requested");
        self.graceful.cancel();
        self.pool.cancel_all();
    }

    pub fn status(&self, session_id: Uuid) -> Option<SessionStatus> {
        self.statuses.lock().get(&session_id).copied()
    }

    pub fn statuses(&self) -> HashMap<Uuid, SessionStatus> {
        self.statuses.lock().clone()
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }
}
