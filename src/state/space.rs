//! Candidate spaces.
//!
//! A [`StateSpace`] answers one question for the search: which build, if
//! any, sits at a given position. The revision space is dense over the
//! whole axis; the release space only has builds at published major
//! versions and never falls back to nearby revisions for the holes.

use std::collections::BTreeMap;

use super::build::{Browser, State, StateType};

/// Published releases of one browser, keyed by major version.
#[derive(Debug, Clone)]
pub struct ReleaseIndex {
    browser: Browser,
    by_major: BTreeMap<u64, u64>,
}

impl ReleaseIndex {
    pub fn new(browser: Browser, releases: impl IntoIterator<Item = (u64, u64)>) -> Self {
        Self {
            browser,
            by_major: releases.into_iter().collect(),
        }
    }

    pub fn browser(&self) -> Browser {
        self.browser
    }

    /// Revision the given major version was cut at.
    pub fn release_revision(&self, major_version: u64) -> Option<u64> {
        self.by_major.get(&major_version).copied()
    }
}

/// Ordered space of candidate builds.
#[derive(Debug, Clone)]
pub enum StateSpace {
    /// Every revision number is a candidate.
    Revisions { browser: Browser },
    /// Only published releases are candidates.
    Releases { index: ReleaseIndex },
}

impl StateSpace {
    pub fn revisions(browser: Browser) -> Self {
        StateSpace::Revisions { browser }
    }

    pub fn releases(index: ReleaseIndex) -> Self {
        StateSpace::Releases { index }
    }

    pub fn browser(&self) -> Browser {
        match self {
            StateSpace::Revisions { browser } => *browser,
            StateSpace::Releases { index } => index.browser(),
        }
    }

    pub fn state_type(&self) -> StateType {
        match self {
            StateSpace::Revisions { .. } => StateType::Revision,
            StateSpace::Releases { .. } => StateType::Version,
        }
    }

    /// The build at `index`, or `None` when the space has a hole there.
    pub fn state_at(&self, index: u64) -> Option<State> {
        match self {
            StateSpace::Revisions { browser } => Some(State::revision(*browser, index)),
            StateSpace::Releases { index: releases } => releases
                .release_revision(index)
                .map(|revision_nb| State::version(releases.browser(), index, revision_nb)),
        }
    }

    /// Builds strictly between two positions, ascending by index. Holes
    /// in a release space are absent rather than substituted.
    pub fn interior(&self, lo: u64, hi: u64) -> Vec<State> {
        if hi <= lo + 1 {
            return Vec::new();
        }
        match self {
            StateSpace::Revisions { browser } => (lo + 1..hi)
                .map(|index| State::revision(*browser, index))
                .collect(),
            StateSpace::Releases { index } => index
                .by_major
                .range(lo + 1..hi)
                .map(|(major, revision_nb)| State::version(index.browser, *major, *revision_nb))
                .collect(),
        }
    }
}
