//! Build identifiers.
//!
//! A [`State`] names one browser build inside an ordered history. Revision
//! states sit directly on the revision axis; version states name a release
//! whose major version doubles as its position. Two states are the same
//! build when their browser and position match, regardless of how they were
//! constructed.

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Value};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StateError {
    #[error("Unknown state type: {0}")]
    UnknownStateType(String),
    #[error("Unknown browser: {0}")]
    UnknownBrowser(String),
    #[error("Malformed state record: {0}")]
    MalformedRecord(String),
}

/// Browsers with build histories we can walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Browser {
    Chromium,
    Firefox,
}

impl Browser {
    pub fn as_str(&self) -> &'static str {
        match self {
            Browser::Chromium => "chromium",
            Browser::Firefox => "firefox",
        }
    }

    /// Strict: an unrecognized name is an error, not a default.
    pub fn parse(s: &str) -> Result<Self, StateError> {
        match s {
            "chromium" => Ok(Browser::Chromium),
            "firefox" => Ok(Browser::Firefox),
            other => Err(StateError::UnknownBrowser(other.to_string())),
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Browser::Chromium => "Chromium",
            Browser::Firefox => "Firefox",
        }
    }
}

impl fmt::Display for Browser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which axis a state is addressed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateType {
    Revision,
    Version,
}

impl StateType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StateType::Revision => "revision",
            StateType::Version => "version",
        }
    }

    pub fn parse(s: &str) -> Result<Self, StateError> {
        match s {
            "revision" => Ok(StateType::Revision),
            "version" => Ok(StateType::Version),
            other => Err(StateError::UnknownStateType(other.to_string())),
        }
    }
}

impl fmt::Display for StateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One browser build on an ordered axis.
#[derive(Debug, Clone)]
pub enum State {
    Revision {
        browser: Browser,
        revision_nb: u64,
    },
    Version {
        browser: Browser,
        major_version: u64,
        revision_nb: u64,
    },
}

impl State {
    pub fn revision(browser: Browser, revision_nb: u64) -> Self {
        State::Revision {
            browser,
            revision_nb,
        }
    }

    pub fn version(browser: Browser, major_version: u64, revision_nb: u64) -> Self {
        State::Version {
            browser,
            major_version,
            revision_nb,
        }
    }

    pub fn browser(&self) -> Browser {
        match self {
            State::Revision { browser, .. } | State::Version { browser, .. } => *browser,
        }
    }

    pub fn state_type(&self) -> StateType {
        match self {
            State::Revision { .. } => StateType::Revision,
            State::Version { .. } => StateType::Version,
        }
    }

    /// Position on the search axis. Revisions order by revision number,
    /// versions by major version.
    pub fn index(&self) -> u64 {
        match self {
            State::Revision { revision_nb, .. } => *revision_nb,
            State::Version { major_version, .. } => *major_version,
        }
    }

    /// Underlying revision, defined for both axes. For a version state this
    /// is the release revision it pins.
    pub fn revision_nb(&self) -> u64 {
        match self {
            State::Revision { revision_nb, .. } | State::Version { revision_nb, .. } => {
                *revision_nb
            }
        }
    }

    pub fn name(&self) -> String {
        self.index().to_string()
    }

    /// Portable record form, the shape rows and payloads carry.
    pub fn to_record(&self) -> Value {
        match self {
            State::Revision {
                browser,
                revision_nb,
            } => json!({
                "type": StateType::Revision.as_str(),
                "browser_name": browser.as_str(),
                "revision_number": revision_nb,
            }),
            State::Version {
                browser,
                major_version,
                revision_nb,
            } => json!({
                "type": StateType::Version.as_str(),
                "browser_name": browser.as_str(),
                "major_version": major_version,
                "revision_number": revision_nb,
            }),
        }
    }

    pub fn from_record(record: &Value) -> Result<Self, StateError> {
        if !record.is_object() {
            return Err(StateError::MalformedRecord("expected an object".to_string()));
        }
        let state_type = record_str(record, "type")?;
        let browser = Browser::parse(record_str(record, "browser_name")?)?;
        let revision_nb = record_u64(record, "revision_number")?;
        match state_type {
            "revision" => Ok(State::revision(browser, revision_nb)),
            "version" => {
                let major_version = record_u64(record, "major_version")?;
                Ok(State::version(browser, major_version, revision_nb))
            }
            other => Err(StateError::UnknownStateType(other.to_string())),
        }
    }
}

fn record_str<'a>(record: &'a Value, key: &str) -> Result<&'a str, StateError> {
    record
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| StateError::MalformedRecord(format!("missing field '{key}'")))
}

fn record_u64(record: &Value, key: &str) -> Result<u64, StateError> {
    record
        .get(key)
        .and_then(Value::as_u64)
        .ok_or_else(|| StateError::MalformedRecord(format!("missing field '{key}'")))
}

// Identity is position plus browser. A version state and a revision state
// never share a position space in practice, but the rule keeps lookups in
// evaluation tables honest.
impl PartialEq for State {
    fn eq(&self, other: &Self) -> bool {
        self.index() == other.index() && self.browser() == other.browser()
    }
}

impl Eq for State {}

impl Hash for State {
    fn hash<H: Hasher>(&self, hasher: &mut H) {
        self.index().hash(hasher);
        self.browser().hash(hasher);
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            State::Revision {
                browser,
                revision_nb,
            } => write!(f, "{}-r{}", browser, revision_nb),
            State::Version {
                browser,
                major_version,
                ..
            } => write!(f, "{}-v{}", browser, major_version),
        }
    }
}

impl Serialize for State {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_record().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for State {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let record = Value::deserialize(deserializer)?;
        State::from_record(&record).map_err(DeError::custom)
    }
}
