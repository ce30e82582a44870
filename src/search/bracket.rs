//! Search brackets.
//!
//! A [`Bracket`] is a pair of builds with opposite outcomes that encloses
//! the change point. It is only ever narrowed: a candidate whose outcome
//! matches a boundary replaces that boundary, so the enclosure invariant
//! holds from construction to the final report.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::state::State;

use super::engine::BisectError;

/// Which way the observed behavior flips across the bracket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionDirection {
    /// Absent at the low boundary, present at the high one.
    FalseToTrue,
    /// Present at the low boundary, gone at the high one.
    TrueToFalse,
}

impl TransitionDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransitionDirection::FalseToTrue => "false_to_true",
            TransitionDirection::TrueToFalse => "true_to_false",
        }
    }

    /// Outcome the low boundary is asserted to have.
    pub fn lo_outcome(&self) -> bool {
        matches!(self, TransitionDirection::TrueToFalse)
    }

    /// Outcome the high boundary is asserted to have.
    pub fn hi_outcome(&self) -> bool {
        !self.lo_outcome()
    }
}

impl fmt::Display for TransitionDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Two builds with opposite outcomes enclosing the change point.
#[derive(Debug, Clone)]
pub struct Bracket {
    lo: State,
    hi: State,
}

impl Bracket {
    pub fn new(lo: State, hi: State) -> Result<Self, BisectError> {
        if lo.browser() != hi.browser() {
            return Err(BisectError::InvalidBracket(
                "boundaries name different browsers".to_string(),
            ));
        }
        if lo.state_type() != hi.state_type() {
            return Err(BisectError::InvalidBracket(
                "boundaries sit on different axes".to_string(),
            ));
        }
        if lo.index() >= hi.index() {
            return Err(BisectError::InvalidBracket(format!(
                "low position {} must be below high position {}",
                lo.index(),
                hi.index()
            )));
        }
        Ok(Self { lo, hi })
    }

    pub fn lo(&self) -> &State {
        &self.lo
    }

    pub fn hi(&self) -> &State {
        &self.hi
    }

    pub fn width(&self) -> u64 {
        self.hi.index() - self.lo.index()
    }

    /// Floor midpoint on the position axis.
    pub fn midpoint_index(&self) -> u64 {
        self.lo.index() + self.width() / 2
    }

    /// A bracket of width one cannot be narrowed further.
    pub fn is_resolved(&self) -> bool {
        self.width() == 1
    }
}
