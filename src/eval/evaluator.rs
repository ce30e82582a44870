//! Evaluation seams.
//!
//! The engine never drives a browser itself. It talks to three traits: an
//! [`Evaluator`] that runs one experiment against one build, a
//! [`BinaryProbe`] that answers whether a build can be obtained at all, and
//! an [`OutcomeChecker`] that turns a raw result into the boolean the
//! search narrows on.

use async_trait::async_trait;
use thiserror::Error;

use crate::state::State;

use super::record::{EvalRecord, StateResult};
use super::request::EvalRequest;

#[derive(Error, Debug)]
pub enum EvaluatorError {
    /// The binary vanished between the availability check and the run.
    #[error("No binary could be obtained for {state}")]
    BinaryUnavailable { state: String },
    /// Infrastructure failure; no usable record was produced.
    #[error("Evaluation failed: {0}")]
    Failed(String),
    #[error("Evaluation was cancelled")]
    Cancelled,
}

/// Runs one experiment against one browser build.
///
/// Implementations own binary acquisition and page driving. They retry
/// flaky runs internally, up to three attempts, and hand back a dirty
/// record rather than an error when no clean run could be obtained.
#[async_trait]
pub trait Evaluator: Send + Sync {
    async fn evaluate(&self, request: &EvalRequest) -> Result<EvalRecord, EvaluatorError>;
}

/// Verdict of one availability probe.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub available: bool,
    pub url: Option<String>,
    pub build_id: Option<String>,
}

impl ProbeOutcome {
    pub fn found(url: Option<String>) -> Self {
        Self {
            available: true,
            url,
            build_id: None,
        }
    }

    pub fn missing() -> Self {
        Self::default()
    }

    pub fn with_build_id(mut self, build_id: impl Into<String>) -> Self {
        self.build_id = Some(build_id.into());
        self
    }
}

/// Answers whether a binary exists for a build.
#[async_trait]
pub trait BinaryProbe: Send + Sync {
    /// Whether a binary can be obtained from anywhere.
    async fn is_available(&self, state: &State) -> ProbeOutcome;

    /// Whether the remote archive serves a binary right now, ignoring any
    /// local copies.
    async fn is_available_online(&self, state: &State) -> ProbeOutcome;
}

/// Turns a stored result into the boolean the search narrows on.
pub trait OutcomeChecker: Send + Sync {
    /// `None` when the run does not answer the question either way.
    fn outcome(&self, result: &StateResult) -> Option<bool>;
}

/// Default checker: the behavior is present when the page reported the
/// `reproduced=OK` marker.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReproducedChecker;

impl OutcomeChecker for ReproducedChecker {
    fn outcome(&self, result: &StateResult) -> Option<bool> {
        Some(result.reproduced())
    }
}
