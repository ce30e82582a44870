//! Evaluation identity and dispatch payloads.
//!
//! An [`EvalKey`] is the full identity of one evaluation: the build under
//! test plus every knob that could change its outcome. Two keys that differ
//! only in the order of their option lists are the same evaluation, so the
//! lists are normalized at construction and the fingerprint is computed
//! over a canonical rendering.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::state::State;

/// How the page visit is driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Automation {
    Selenium,
    Terminal,
}

impl Automation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Automation::Selenium => "selenium",
            Automation::Terminal => "terminal",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "selenium" => Some(Automation::Selenium),
            "terminal" => Some(Automation::Terminal),
            _ => None,
        }
    }
}

/// Full identity of one evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalKey {
    pub state: State,
    pub automation: Automation,
    pub browser_config: String,
    pub cli_options: Vec<String>,
    pub extensions: Vec<String>,
    pub mech_group: String,
}

impl EvalKey {
    pub fn new(
        state: State,
        automation: Automation,
        browser_config: impl Into<String>,
        mut cli_options: Vec<String>,
        mut extensions: Vec<String>,
        mech_group: impl Into<String>,
    ) -> Self {
        cli_options.sort();
        extensions.sort();
        Self {
            state,
            automation,
            browser_config: browser_config.into(),
            cli_options,
            extensions,
            mech_group: mech_group.into(),
        }
    }

    /// Stable hex digest of the canonical key rendering. Safe to use as a
    /// primary key for claims and result lookups.
    pub fn fingerprint(&self) -> String {
        let canonical = serde_json::json!({
            "automation": self.automation.as_str(),
            "browser_config": self.browser_config,
            "cli_options": self.cli_options,
            "extensions": self.extensions,
            "mech_group": self.mech_group,
            "state": self.state.to_record(),
        });
        format!("{:x}", Sha256::digest(canonical.to_string().as_bytes()))
    }
}

/// Everything a worker needs to run one evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalRequest {
    pub key: EvalKey,
    pub project: String,
    pub seconds_per_visit: u64,
}

impl EvalRequest {
    pub fn new(key: EvalKey, project: impl Into<String>, seconds_per_visit: u64) -> Self {
        Self {
            key,
            project: project.into(),
            seconds_per_visit,
        }
    }

    pub fn state(&self) -> &State {
        &self.key.state
    }

    /// JSON form handed to out-of-process workers.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(payload: &str) -> serde_json::Result<Self> {
        serde_json::from_str(payload)
    }
}
