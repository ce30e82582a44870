pub mod config;
pub mod data;
pub mod eval;
pub mod orchestrator;
pub mod search;
pub mod state;

pub use config::Config;
pub use data::{
    AvailabilityCache, AvailabilityStore, ClaimStore, Database, ResultStore, StoreError,
};
pub use eval::{
    Automation, BinaryProbe, EvalKey, EvalRecord, EvalRequest, Evaluator, EvaluatorError,
    OutcomeChecker, ReproducedChecker, StateResult,
};
pub use orchestrator::{
    BisectionSession, Orchestrator, SessionError, SessionOutcome, SessionSpec, SessionStatus,
    WorkerPool,
};
pub use search::{
    BisectError, BisectReport, BisectionEngine, Bracket, TransitionDirection,
};
pub use state::{Browser, ReleaseIndex, State, StateSpace, StateType};
