//! One bisection session.
//!
//! A session owns a single bracket search end to end: it rehydrates prior
//! results, then serves the engine's evaluation requests by consulting the
//! result store, claiming the evaluation, dispatching it through the worker
//! pool, and recording the outcome before the claim is released. Recording
//! before release is what makes results monotone for waiting sessions: once
//! a claim disappears, the result it guarded is already visible.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::Config;
use crate::data::{
    AvailabilityCache, AvailabilityStore, ClaimOutcome, ClaimStore, Database, RangeFilter,
    ResultStore, StoreError,
};
use crate::eval::{
    Automation, BinaryProbe, EvalKey, EvalRecord, EvalRequest, Evaluator, EvaluatorError,
    OutcomeChecker,
};
use crate::search::{
    BisectError, BisectReport, BisectionEngine, BoxError, Bracket, CandidateReport,
    StateEvaluator, TransitionDirection,
};
use crate::state::{Browser, State, StateSpace};

use super::pool::WorkerPool;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("Claim bookkeeping failed: {0}")]
    Claim(#[from] rusqlite::Error),
    #[error("No build at position {0} in this space")]
    MissingBoundary(u64),
    #[error("Gave up waiting for another session evaluating {fingerprint}")]
    ClaimPatienceExhausted { fingerprint: String },
    #[error(transparent)]
    Bisect(#[from] BisectError),
    #[error("Session stopped")]
    Stopped,
}

/// Everything that identifies one experiment run over one bracket.
#[derive(Debug, Clone)]
pub struct SessionSpec {
    pub collection: String,
    pub project: String,
    pub mech_group: String,
    pub automation: Automation,
    pub browser_config: String,
    pub cli_options: Vec<String>,
    pub extensions: Vec<String>,
    /// Per-experiment override of the configured visit duration.
    pub seconds_per_visit: Option<u64>,
    pub direction: TransitionDirection,
    pub lo_index: u64,
    pub hi_index: u64,
}

impl SessionSpec {
    pub fn new(
        collection: impl Into<String>,
        project: impl Into<String>,
        mech_group: impl Into<String>,
        direction: TransitionDirection,
        lo_index: u64,
        hi_index: u64,
    ) -> Self {
        Self {
            collection: collection.into(),
            project: project.into(),
            mech_group: mech_group.into(),
            automation: Automation::Terminal,
            browser_config: "default".to_string(),
            cli_options: Vec::new(),
            extensions: Vec::new(),
            seconds_per_visit: None,
            direction,
            lo_index,
            hi_index,
        }
    }

    pub fn with_automation(mut self, automation: Automation) -> Self {
        self.automation = automation;
        self
    }

    pub fn with_browser_config(mut self, browser_config: impl Into<String>) -> Self {
        self.browser_config = browser_config.into();
        self
    }

    pub fn with_cli_options(mut self, cli_options: Vec<String>) -> Self {
        self.cli_options = cli_options;
        self
    }

    pub fn with_extensions(mut self, extensions: Vec<String>) -> Self {
        self.extensions = extensions;
        self
    }

    pub fn with_seconds_per_visit(mut self, seconds_per_visit: u64) -> Self {
        self.seconds_per_visit = Some(seconds_per_visit);
        self
    }
}

/// Runs one bracket search against shared stores.
pub struct BisectionSession {
    id: Uuid,
    spec: SessionSpec,
    space: StateSpace,
    results: ResultStore,
    claims: ClaimStore,
    availability: AvailabilityCache,
    evaluator: Arc<dyn Evaluator>,
    checker: Arc<dyn OutcomeChecker>,
    pool: WorkerPool,
    graceful: CancellationToken,
    seconds_per_visit: u64,
    claim_poll: Duration,
    claim_patience: Duration,
    strict_clean: bool,
}

enum ClaimWait {
    Acquired,
    Cached(CandidateReport),
}

impl BisectionSession {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        mut spec: SessionSpec,
        space: StateSpace,
        db: &Database,
        evaluator: Arc<dyn Evaluator>,
        probe: Arc<dyn BinaryProbe>,
        checker: Arc<dyn OutcomeChecker>,
        pool: WorkerPool,
        graceful: CancellationToken,
        config: &Config,
    ) -> Self {
        // Option lists are identity; normalize once so every key and filter
        // this session builds agrees.
        spec.cli_options.sort();
        spec.extensions.sort();
        let seconds_per_visit = spec.seconds_per_visit.unwrap_or(config.seconds_per_visit);
        Self {
            id: Uuid::new_v4(),
            spec,
            space,
            results: ResultStore::new(db.connection()),
            claims: ClaimStore::new(db.connection()),
            availability: AvailabilityCache::new(AvailabilityStore::new(db.connection()), probe),
            evaluator,
            checker,
            pool,
            graceful,
            seconds_per_visit,
            claim_poll: Duration::from_millis(config.claim_poll_ms),
            claim_patience: Duration::from_millis(config.claim_patience_ms),
            strict_clean: config.strict_clean,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn spec(&self) -> &SessionSpec {
        &self.spec
    }

    pub async fn run(&self) -> Result<BisectReport, SessionError> {
        let lo = self
            .space
            .state_at(self.spec.lo_index)
            .ok_or(SessionError::MissingBoundary(self.spec.lo_index))?;
        let hi = self
            .space
            .state_at(self.spec.hi_index)
            .ok_or(SessionError::MissingBoundary(self.spec.hi_index))?;
        let bracket = Bracket::new(lo.clone(), hi.clone())?;

        let filter = RangeFilter {
            browser: self.space.browser(),
            state_type: self.space.state_type(),
            browser_config: self.spec.browser_config.clone(),
            cli_options: self.spec.cli_options.clone(),
            extensions: self.spec.extensions.clone(),
            mech_group: self.spec.mech_group.clone(),
            lo_revision: lo.revision_nb(),
            hi_revision: hi.revision_nb(),
        };
        let seeds = self
            .results
            .load_range(&self.spec.collection, &filter, self.checker.as_ref())?;
        tracing::info!(
            session = %self.id,
            collection = %self.spec.collection,
            mech_group = %self.spec.mech_group,
            lo = %lo,
            hi = %hi,
            seeds = seeds.len(),
            "starting bisection session"
        );

        let engine = BisectionEngine::new(&self.space, &self.availability, self)
            .with_strict_clean(self.strict_clean);
        let outcome = match engine.resolve(bracket, self.spec.direction, &seeds).await {
            Ok(report) => {
                tracing::info!(
                    session = %self.id,
                    lo = %report.lo,
                    hi = %report.hi,
                    gap = report.gap,
                    provisional = report.provisional,
                    "bisection session finished"
                );
                Ok(report)
            }
            // Errors from our own dispatch come back through the engine's
            // boxed seam; unbox them so callers see the session error.
            Err(BisectError::Evaluation(boxed)) => match boxed.downcast::<SessionError>() {
                Ok(session_error) => Err(*session_error),
                Err(other) => Err(SessionError::Bisect(BisectError::Evaluation(other))),
            },
            Err(err) => Err(err.into()),
        };

        // However the search ended, a finished session holds no claims.
        match self.claims.release_session(self.id) {
            Ok(0) => {}
            Ok(dropped) => tracing::warn!(
                session = %self.id,
                dropped,
                "swept claims left behind by the session"
            ),
            Err(err) => tracing::warn!(
                session = %self.id,
                error = %err,
                "failed to sweep session claims"
            ),
        }
        outcome
    }

    fn key_for(&self, state: &State) -> EvalKey {
        EvalKey::new(
            state.clone(),
            self.spec.automation,
            self.spec.browser_config.clone(),
            self.spec.cli_options.clone(),
            self.spec.extensions.clone(),
            self.spec.mech_group.clone(),
        )
    }

    fn report_from(&self, record: EvalRecord) -> CandidateReport {
        let outcome = self.checker.outcome(&record.result);
        CandidateReport::evaluated(record, outcome)
    }

    async fn evaluate_candidate(
        &self,
        state: &State,
        fresh: bool,
    ) -> Result<CandidateReport, SessionError> {
        let key = self.key_for(state);
        let fingerprint = key.fingerprint();
        match self.acquire_claim(&key, &fingerprint, fresh).await? {
            ClaimWait::Cached(report) => Ok(report),
            ClaimWait::Acquired => {
                let outcome = self.run_claimed(state, &key).await;
                // The claim falls regardless of how the run went; a failed
                // release must not mask the run's own result.
                if let Err(err) = self.claims.release(&fingerprint) {
                    tracing::warn!(
                        session = %self.id,
                        fingerprint = %fingerprint,
                        error = %err,
                        "failed to release claim"
                    );
                }
                outcome
            }
        }
    }

    /// Serve the evaluation from the store, claim it, or wait out whoever
    /// holds the claim.
    ///
    /// The store is consulted before every acquire attempt. Holders record
    /// their result before releasing, so a fallen claim means the result is
    /// already readable and the re-check cannot miss it.
    async fn acquire_claim(
        &self,
        key: &EvalKey,
        fingerprint: &str,
        fresh: bool,
    ) -> Result<ClaimWait, SessionError> {
        let deadline = Instant::now() + self.claim_patience;
        loop {
            if self.graceful.is_cancelled() {
                return Err(SessionError::Stopped);
            }
            if !fresh {
                if let Some(record) = self.results.get(&self.spec.collection, key)? {
                    tracing::debug!(
                        session = %self.id,
                        fingerprint = %fingerprint,
                        "serving stored result"
                    );
                    return Ok(ClaimWait::Cached(self.report_from(record)));
                }
            }
            match self.claims.try_acquire(fingerprint, self.id)? {
                ClaimOutcome::Acquired => return Ok(ClaimWait::Acquired),
                ClaimOutcome::Conflict => {
                    if Instant::now() >= deadline {
                        return Err(SessionError::ClaimPatienceExhausted {
                            fingerprint: fingerprint.to_string(),
                        });
                    }
                    tracing::debug!(
                        session = %self.id,
                        fingerprint = %fingerprint,
                        "evaluation claimed elsewhere, waiting"
                    );
                    tokio::time::sleep(jittered(self.claim_poll)).await;
                }
            }
        }
    }

    /// Dispatch one claimed evaluation and record whatever comes back.
    async fn run_claimed(
        &self,
        state: &State,
        key: &EvalKey,
    ) -> Result<CandidateReport, SessionError> {
        let request = EvalRequest::new(
            key.clone(),
            self.spec.project.clone(),
            self.seconds_per_visit,
        );
        match self.pool.run(self.evaluator.as_ref(), &request).await {
            Ok(record) => {
                let build_id = match state.browser() {
                    Browser::Firefox => self.availability.store().build_id(state)?,
                    Browser::Chromium => None,
                };
                self.results
                    .put(&self.spec.collection, key, &record, build_id.as_deref())?;
                tracing::debug!(
                    session = %self.id,
                    state = %state,
                    dirty = record.result.dirty,
                    "result recorded"
                );
                Ok(self.report_from(record))
            }
            Err(EvaluatorError::BinaryUnavailable { .. }) => {
                tracing::warn!(
                    session = %self.id,
                    state = %state,
                    "binary vanished during evaluation"
                );
                self.availability.mark_unavailable(state)?;
                Ok(CandidateReport::unavailable())
            }
            Err(EvaluatorError::Cancelled) => Err(SessionError::Stopped),
            Err(EvaluatorError::Failed(reason)) => {
                tracing::warn!(
                    session = %self.id,
                    state = %state,
                    reason = %reason,
                    "evaluation failed, excluding candidate"
                );
                Ok(CandidateReport::failed())
            }
        }
    }
}

#[async_trait]
impl StateEvaluator for BisectionSession {
    async fn evaluate(&self, state: &State, fresh: bool) -> Result<CandidateReport, BoxError> {
        self.evaluate_candidate(state, fresh)
            .await
            .map_err(|err| Box::new(err) as BoxError)
    }
}

/// Poll interval spread over half to one-and-a-half times the base, so
/// waiting sessions do not hammer the claim table in lockstep.
fn jittered(base: Duration) -> Duration {
    let millis = base.as_millis() as u64;
    if millis == 0 {
        return base;
    }
    let spread = millis / 2;
    Duration::from_millis(rand::rng().random_range(millis - spread..=millis + spread))
}
