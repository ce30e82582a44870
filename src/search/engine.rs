//! Bracket narrowing over sparse build histories.
//!
//! The engine owns the search policy only. Evaluations, caching, claims,
//! and persistence live behind the [`StateEvaluator`] seam, so the policy
//! is the same whether results come from a store or a live browser.
//!
//! Each round targets the floor midpoint of the current bracket. When the
//! midpoint is unusable the engine walks outward, preferring the candidate
//! above the midpoint at each distance, until it finds an evaluable build
//! strictly inside the bracket. An interior with no evaluable build left
//! ends the search with a gap report instead of an error.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use thiserror::Error;

use crate::data::{AvailabilityCache, EvaluatedState, StoreError};
use crate::eval::{EvalRecord, StateCondition};
use crate::state::{State, StateSpace};

use super::bracket::{Bracket, TransitionDirection};

/// Boxed error for the evaluation seam. Callers surface their own error
/// types through it and can downcast them back out.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum BisectError {
    #[error("Invalid bracket: {0}")]
    InvalidBracket(String),
    #[error("Stored outcome at position {index} contradicts the {direction} transition")]
    BoundaryOutcome {
        index: u64,
        direction: TransitionDirection,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("Candidate evaluation failed: {0}")]
    Evaluation(#[source] BoxError),
}

/// What became of one requested candidate evaluation.
#[derive(Debug)]
pub struct CandidateReport {
    pub condition: StateCondition,
    pub outcome: Option<bool>,
    pub record: Option<EvalRecord>,
}

impl CandidateReport {
    /// A run that produced a record. Dirty records count as `Failed` for
    /// bookkeeping while their outcome stays usable.
    pub fn evaluated(record: EvalRecord, outcome: Option<bool>) -> Self {
        let condition = if record.result.dirty {
            StateCondition::Failed
        } else {
            StateCondition::Completed
        };
        Self {
            condition,
            outcome,
            record: Some(record),
        }
    }

    pub fn unavailable() -> Self {
        Self {
            condition: StateCondition::Unavailable,
            outcome: None,
            record: None,
        }
    }

    pub fn failed() -> Self {
        Self {
            condition: StateCondition::Failed,
            outcome: None,
            record: None,
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.record
            .as_ref()
            .map(|record| record.result.dirty)
            .unwrap_or(false)
    }
}

/// Produces candidate evaluations on demand.
///
/// `fresh` asks for a new run even when a stored result exists; it is only
/// set when the engine retries a dirty result under the strict-clean
/// policy.
#[async_trait]
pub trait StateEvaluator: Send + Sync {
    async fn evaluate(&self, state: &State, fresh: bool) -> Result<CandidateReport, BoxError>;
}

/// Final bracket of one search.
#[derive(Debug, Clone)]
pub struct BisectReport {
    pub lo: State,
    pub hi: State,
    /// Evaluator calls issued by this run, cached hits included.
    pub evaluations: u32,
    /// True when the interior was exhausted before reaching width one.
    pub gap: bool,
    /// Interior positions that could not be used: unavailable binaries,
    /// failed runs, and holes in the space.
    pub skipped: Vec<u64>,
    /// True when a dirty result took part in the narrowing.
    pub provisional: bool,
}

impl BisectReport {
    pub fn is_exact(&self) -> bool {
        !self.gap
    }
}

/// Narrows one bracket to the change point.
pub struct BisectionEngine<'a> {
    space: &'a StateSpace,
    availability: &'a AvailabilityCache,
    evaluator: &'a dyn StateEvaluator,
    strict_clean: bool,
}

impl<'a> BisectionEngine<'a> {
    pub fn new(
        space: &'a StateSpace,
        availability: &'a AvailabilityCache,
        evaluator: &'a dyn StateEvaluator,
    ) -> Self {
        Self {
            space,
            availability,
            evaluator,
            strict_clean: false,
        }
    }

    /// Repeat dirty evaluations once with a fresh run before narrowing on
    /// them. The repeat's record is used either way.
    pub fn with_strict_clean(mut self, strict_clean: bool) -> Self {
        self.strict_clean = strict_clean;
        self
    }

    pub async fn resolve(
        &self,
        bracket: Bracket,
        direction: TransitionDirection,
        seeds: &[EvaluatedState],
    ) -> Result<BisectReport, BisectError> {
        let mut lo = bracket.lo().clone();
        let mut hi = bracket.hi().clone();
        let mut unusable: BTreeMap<u64, StateCondition> = BTreeMap::new();
        let mut provisional = false;
        let mut evaluations = 0u32;

        self.apply_seeds(
            seeds,
            direction,
            &mut lo,
            &mut hi,
            &mut unusable,
            &mut provisional,
        )?;
        tracing::debug!(
            lo = lo.index(),
            hi = hi.index(),
            seeds = seeds.len(),
            direction = %direction,
            "starting bracket narrowing"
        );

        while hi.index() - lo.index() > 1 {
            let Some(candidate) = self.next_candidate(lo.index(), hi.index(), &unusable) else {
                let skipped = self.skipped_interior(lo.index(), hi.index(), &unusable);
                tracing::info!(
                    lo = lo.index(),
                    hi = hi.index(),
                    skipped = skipped.len(),
                    evaluations,
                    "interior exhausted, reporting gap"
                );
                return Ok(BisectReport {
                    lo,
                    hi,
                    evaluations,
                    gap: true,
                    skipped,
                    provisional,
                });
            };

            let verdict = self.availability.check(&candidate).await?;
            if !verdict.available {
                tracing::debug!(state = %candidate, "no binary for candidate, walking past");
                unusable.insert(candidate.index(), StateCondition::Unavailable);
                continue;
            }

            evaluations += 1;
            let mut report = self
                .evaluator
                .evaluate(&candidate, false)
                .await
                .map_err(BisectError::Evaluation)?;
            if self.strict_clean && report.is_dirty() {
                tracing::debug!(state = %candidate, "dirty result under strict-clean, repeating once");
                evaluations += 1;
                report = self
                    .evaluator
                    .evaluate(&candidate, true)
                    .await
                    .map_err(BisectError::Evaluation)?;
            }

            match (report.condition, report.outcome) {
                (StateCondition::Unavailable, _) => {
                    unusable.insert(candidate.index(), StateCondition::Unavailable);
                }
                (_, Some(outcome)) => {
                    if report.is_dirty() {
                        provisional = true;
                    }
                    if outcome == direction.lo_outcome() {
                        lo = candidate;
                    } else {
                        hi = candidate;
                    }
                    tracing::debug!(
                        lo = lo.index(),
                        hi = hi.index(),
                        outcome,
                        "bracket narrowed"
                    );
                }
                (condition, None) => {
                    tracing::debug!(
                        state = %candidate,
                        condition = condition.as_str(),
                        "candidate gave no usable outcome, excluding it"
                    );
                    unusable.insert(candidate.index(), StateCondition::Failed);
                }
            }
        }

        let skipped = self.skipped_interior(lo.index(), hi.index(), &unusable);
        tracing::info!(
            lo = lo.index(),
            hi = hi.index(),
            evaluations,
            provisional,
            "bracket resolved"
        );
        Ok(BisectReport {
            lo,
            hi,
            evaluations,
            gap: false,
            skipped,
            provisional,
        })
    }

    /// Fold prior results into the bracket before issuing any new work.
    fn apply_seeds(
        &self,
        seeds: &[EvaluatedState],
        direction: TransitionDirection,
        lo: &mut State,
        hi: &mut State,
        unusable: &mut BTreeMap<u64, StateCondition>,
        provisional: &mut bool,
    ) -> Result<(), BisectError> {
        let mut ordered: Vec<&EvaluatedState> = seeds.iter().collect();
        ordered.sort_by_key(|seed| seed.state.index());

        for seed in ordered {
            let index = seed.state.index();
            if index == lo.index() || index == hi.index() {
                // A stored boundary result must agree with the declared
                // direction; the boundary itself is never re-evaluated.
                let expected = if index == lo.index() {
                    direction.lo_outcome()
                } else {
                    direction.hi_outcome()
                };
                if let Some(outcome) = seed.outcome {
                    if outcome != expected {
                        return Err(BisectError::BoundaryOutcome { index, direction });
                    }
                }
                continue;
            }
            if index < lo.index() || index > hi.index() {
                continue;
            }
            match (seed.condition, seed.outcome) {
                (StateCondition::Unavailable, _) => {
                    unusable.insert(index, StateCondition::Unavailable);
                }
                (_, Some(outcome)) => {
                    if seed.result.dirty {
                        *provisional = true;
                    }
                    if outcome == direction.lo_outcome() {
                        *lo = seed.state.clone();
                    } else {
                        *hi = seed.state.clone();
                    }
                }
                (_, None) => {
                    unusable.insert(index, StateCondition::Failed);
                }
            }
        }
        Ok(())
    }

    /// Next evaluable candidate strictly inside the bracket: the floor
    /// midpoint first, then outward by distance, above before below.
    fn next_candidate(
        &self,
        lo: u64,
        hi: u64,
        unusable: &BTreeMap<u64, StateCondition>,
    ) -> Option<State> {
        let width = hi - lo;
        let mid = lo + width / 2;
        for offset in 0..width {
            let above = mid + offset;
            if above < hi && !unusable.contains_key(&above) {
                if let Some(state) = self.space.state_at(above) {
                    return Some(state);
                }
            }
            if offset > 0 {
                let below = mid.saturating_sub(offset);
                if below > lo && !unusable.contains_key(&below) {
                    if let Some(state) = self.space.state_at(below) {
                        return Some(state);
                    }
                }
            }
        }
        None
    }

    /// Interior positions with nothing left to evaluate: builds marked
    /// unusable during the search plus holes in the space itself.
    fn skipped_interior(
        &self,
        lo: u64,
        hi: u64,
        unusable: &BTreeMap<u64, StateCondition>,
    ) -> Vec<u64> {
        let present: BTreeSet<u64> = self
            .space
            .interior(lo, hi)
            .iter()
            .map(State::index)
            .collect();
        (lo + 1..hi)
            .filter(|index| unusable.contains_key(index) || !present.contains(index))
            .collect()
    }
}
