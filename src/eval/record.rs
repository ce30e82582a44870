//! Evaluation outputs.
//!
//! A [`StateResult`] is the raw page-collector payload from one run; an
//! [`EvalRecord`] wraps it with the build metadata the run observed. The
//! `dirty` flag travels next to the payload, not inside it, matching the
//! stored column layout.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RecordError {
    #[error("Version '{0}' is too big to be padded")]
    UnpaddableVersion(String),
}

/// Where a candidate evaluation stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateCondition {
    Pending,
    InProgress,
    Completed,
    Failed,
    Unavailable,
}

impl StateCondition {
    pub fn as_str(&self) -> &'static str {
        match self {
            StateCondition::Pending => "pending",
            StateCondition::InProgress => "in_progress",
            StateCondition::Completed => "completed",
            StateCondition::Failed => "failed",
            StateCondition::Unavailable => "unavailable",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StateCondition::Completed | StateCondition::Failed | StateCondition::Unavailable
        )
    }
}

/// One variable the page or the browser log reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VarEntry {
    pub var: String,
    pub val: String,
}

impl VarEntry {
    pub fn new(var: impl Into<String>, val: impl Into<String>) -> Self {
        Self {
            var: var.into(),
            val: val.into(),
        }
    }
}

/// Collector payload of one evaluation run.
///
/// `dirty` marks a run that completed but left doubt, for instance after
/// exhausting retries. It is kept out of the serialized payload because the
/// store carries it as its own column.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateResult {
    #[serde(default)]
    pub requests: Vec<Value>,
    #[serde(rename = "req_vars", default)]
    pub request_vars: Vec<VarEntry>,
    #[serde(rename = "log_vars", default)]
    pub log_vars: Vec<VarEntry>,
    #[serde(skip)]
    pub dirty: bool,
}

impl StateResult {
    pub fn new(
        requests: Vec<Value>,
        request_vars: Vec<VarEntry>,
        log_vars: Vec<VarEntry>,
        dirty: bool,
    ) -> Self {
        Self {
            requests,
            request_vars,
            log_vars,
            dirty,
        }
    }

    /// Whether the run reported the `reproduced=OK` marker on either channel.
    pub fn reproduced(&self) -> bool {
        let marker = VarEntry::new("reproduced", "OK");
        self.request_vars.contains(&marker) || self.log_vars.contains(&marker)
    }
}

/// How the evaluated binary was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BinaryOrigin {
    /// Fetched from the public build archive.
    Downloaded,
    /// Built locally from source.
    Artisanal,
}

impl BinaryOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            BinaryOrigin::Downloaded => "downloaded",
            BinaryOrigin::Artisanal => "artisanal",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "downloaded" => Some(BinaryOrigin::Downloaded),
            "artisanal" => Some(BinaryOrigin::Artisanal),
            _ => None,
        }
    }
}

/// One completed evaluation with its observed build metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct EvalRecord {
    pub browser_version: String,
    pub binary_origin: BinaryOrigin,
    pub driver_version: Option<String>,
    pub result: StateResult,
}

impl EvalRecord {
    pub fn new(
        browser_version: impl Into<String>,
        binary_origin: BinaryOrigin,
        result: StateResult,
    ) -> Self {
        Self {
            browser_version: browser_version.into(),
            binary_origin,
            driver_version: None,
            result,
        }
    }

    pub fn with_driver_version(mut self, driver_version: impl Into<String>) -> Self {
        self.driver_version = Some(driver_version.into());
        self
    }

    pub fn padded_browser_version(&self) -> Result<String, RecordError> {
        padded_version(&self.browser_version)
    }
}

/// Zero-pad each dotted component to four characters so version strings
/// sort correctly under plain lexicographic comparison.
pub fn padded_version(version: &str) -> Result<String, RecordError> {
    let mut padded = Vec::new();
    for component in version.split('.') {
        if component.len() > 4 {
            return Err(RecordError::UnpaddableVersion(version.to_string()));
        }
        padded.push(format!("{component:0>4}"));
    }
    Ok(padded.join("."))
}
