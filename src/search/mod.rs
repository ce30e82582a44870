//! Bracket bisection over ordered build histories.

mod bracket;
mod engine;

pub use bracket::{Bracket, TransitionDirection};
pub use engine::{
    BisectError, BisectReport, BisectionEngine, BoxError, CandidateReport, StateEvaluator,
};
