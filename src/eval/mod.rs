//! Evaluation model: identities, payloads, results, and the seams the
//! search drives them through.

pub mod evaluator;
pub mod mock;
pub mod record;
pub mod request;

pub use evaluator::{
    BinaryProbe, Evaluator, EvaluatorError, OutcomeChecker, ProbeOutcome, ReproducedChecker,
};
pub use mock::{MockEvaluator, MockOutcome, MockProbe};
pub use record::{
    padded_version, BinaryOrigin, EvalRecord, RecordError, StateCondition, StateResult, VarEntry,
};
pub use request::{Automation, EvalKey, EvalRequest};
