//! Mock evaluator and probe for deterministic testing.
//!
//! Both mocks are scripted by closures over the candidate state, record
//! every call they receive, and never touch a real browser or archive.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::state::State;

use super::evaluator::{BinaryProbe, Evaluator, EvaluatorError, ProbeOutcome};
use super::record::{BinaryOrigin, EvalRecord, StateResult, VarEntry};
use super::request::EvalRequest;

/// Scripted behavior for one evaluation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockOutcome {
    /// Clean run that reproduced the behavior.
    Reproduced,
    /// Clean run without the behavior.
    Clean,
    /// Run that needed all retries; the record comes back dirty.
    Dirty { reproduced: bool },
    /// The binary vanished after the availability check.
    BinaryGone,
    /// Infrastructure failure with no usable record.
    Crashed,
}

type OutcomeScript = dyn Fn(&State, u32) -> MockOutcome + Send + Sync;

/// Evaluator that replays a script instead of driving a browser.
///
/// The script receives the candidate state and how many times that position
/// was evaluated before, so tests can make retries behave differently from
/// first attempts.
pub struct MockEvaluator {
    script: Arc<OutcomeScript>,
    delay: Duration,
    requests: Arc<Mutex<Vec<EvalRequest>>>,
    attempts: Arc<Mutex<HashMap<u64, u32>>>,
}

impl MockEvaluator {
    pub fn new(script: impl Fn(&State, u32) -> MockOutcome + Send + Sync + 'static) -> Self {
        Self {
            script: Arc::new(script),
            delay: Duration::ZERO,
            requests: Arc::new(Mutex::new(Vec::new())),
            attempts: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Script where the behavior is present from `threshold` upward.
    pub fn reproduced_from(threshold: u64) -> Self {
        Self::new(move |state, _| {
            if state.index() >= threshold {
                MockOutcome::Reproduced
            } else {
                MockOutcome::Clean
            }
        })
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn requests(&self) -> Vec<EvalRequest> {
        self.requests.lock().clone()
    }

    pub fn evaluation_count(&self) -> usize {
        self.requests.lock().len()
    }

    /// Positions evaluated, in call order.
    pub fn evaluated_indices(&self) -> Vec<u64> {
        self.requests
            .lock()
            .iter()
            .map(|request| request.state().index())
            .collect()
    }

    pub fn reset(&self) {
        self.requests.lock().clear();
        self.attempts.lock().clear();
    }

    fn record_for(state: &State, reproduced: bool, dirty: bool) -> EvalRecord {
        let mut request_vars = Vec::new();
        if reproduced {
            request_vars.push(VarEntry::new("reproduced", "OK"));
        }
        let result = StateResult::new(vec![], request_vars, vec![], dirty);
        // Version strings stay under the padding width.
        let browser_version = format!("{}.0.0.0", state.index() % 10_000);
        EvalRecord::new(browser_version, BinaryOrigin::Downloaded, result)
    }
}

#[async_trait]
impl Evaluator for MockEvaluator {
    async fn evaluate(&self, request: &EvalRequest) -> Result<EvalRecord, EvaluatorError> {
        self.requests.lock().push(request.clone());
        let state = request.state();
        let attempt = {
            let mut attempts = self.attempts.lock();
            let counter = attempts.entry(state.index()).or_insert(0);
            let attempt = *counter;
            *counter += 1;
            attempt
        };
        if self.delay > Duration::ZERO {
            tokio::time::sleep(self.delay).await;
        }
        match (self.script)(state, attempt) {
            MockOutcome::Reproduced => Ok(Self::record_for(state, true, false)),
            MockOutcome::Clean => Ok(Self::record_for(state, false, false)),
            MockOutcome::Dirty { reproduced } => Ok(Self::record_for(state, reproduced, true)),
            MockOutcome::BinaryGone => Err(EvaluatorError::BinaryUnavailable {
                state: state.to_string(),
            }),
            MockOutcome::Crashed => Err(EvaluatorError::Failed("scripted crash".to_string())),
        }
    }
}

type AvailabilityScript = dyn Fn(&State) -> bool + Send + Sync;

/// Probe that replays a script and counts how often it is consulted.
pub struct MockProbe {
    available: Arc<AvailabilityScript>,
    serve_build_ids: bool,
    probed: Arc<Mutex<Vec<u64>>>,
}

impl MockProbe {
    pub fn new(available: impl Fn(&State) -> bool + Send + Sync + 'static) -> Self {
        Self {
            available: Arc::new(available),
            serve_build_ids: false,
            probed: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn always_available() -> Self {
        Self::new(|_| true)
    }

    /// Attach a synthetic build id to every available verdict.
    pub fn with_build_ids(mut self) -> Self {
        self.serve_build_ids = true;
        self
    }

    pub fn probe_count(&self) -> usize {
        self.probed.lock().len()
    }

    /// Positions probed, in call order.
    pub fn probed_indices(&self) -> Vec<u64> {
        self.probed.lock().clone()
    }

    fn check(&self, state: &State) -> ProbeOutcome {
        self.probed.lock().push(state.index());
        if !(self.available)(state) {
            return ProbeOutcome::missing();
        }
        let outcome = ProbeOutcome::found(Some(format!("https://archive.test/{state}")));
        if self.serve_build_ids {
            outcome.with_build_id(format!("build-{}", state.index()))
        } else {
            outcome
        }
    }
}

#[async_trait]
impl BinaryProbe for MockProbe {
    async fn is_available(&self, state: &State) -> ProbeOutcome {
        self.check(state)
    }

    async fn is_available_online(&self, state: &State) -> ProbeOutcome {
        self.check(state)
    }
}
