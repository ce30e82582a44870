//! Append-only store of evaluation outcomes.
//!
//! Rows are never updated or deleted. Point reads return the earliest row
//! for a key, so retries appended later can never change what an earlier
//! reader saw. Bulk rehydration deliberately ignores the automation field:
//! a result answers the same question no matter how the visit was driven.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use crate::eval::{
    BinaryOrigin, EvalKey, EvalRecord, OutcomeChecker, StateCondition, StateResult,
};
use crate::state::{Browser, State, StateType};

use super::StoreError;

/// A prior evaluation rehydrated from the store.
#[derive(Debug, Clone)]
pub struct EvaluatedState {
    pub state: State,
    pub condition: StateCondition,
    pub result: StateResult,
    pub outcome: Option<bool>,
}

/// Row filter for bulk rehydration over a revision range.
#[derive(Debug, Clone)]
pub struct RangeFilter {
    pub browser: Browser,
    pub state_type: StateType,
    pub browser_config: String,
    pub cli_options: Vec<String>,
    pub extensions: Vec<String>,
    pub mech_group: String,
    pub lo_revision: u64,
    pub hi_revision: u64,
}

/// Data access for the `results` table.
#[derive(Clone)]
pub struct ResultStore {
    conn: Arc<Mutex<Connection>>,
}

impl ResultStore {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// Append one result. Firefox rows carry the build id recorded by the
    /// availability probe; without one the binary counts as locally built.
    pub fn put(
        &self,
        collection: &str,
        key: &EvalKey,
        record: &EvalRecord,
        build_id: Option<&str>,
    ) -> Result<(), StoreError> {
        let padded = record.padded_browser_version()?;
        let state = &key.state;
        let (stored_build_id, artisanal) = match state.browser() {
            Browser::Firefox => match build_id {
                Some(id) => (Some(id.to_string()), false),
                None => (Some("artisanal".to_string()), true),
            },
            Browser::Chromium => (None, false),
        };

        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO results
                 (collection, key_fingerprint, browser_name, state_type, state_index,
                  revision_number, automation, browser_config, cli_options, extensions,
                  mech_group, state, results, dirty, browser_version,
                  padded_browser_version, binary_origin, driver_version, build_id,
                  artisanal, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                     ?16, ?17, ?18, ?19, ?20, ?21)",
            params![
                collection,
                key.fingerprint(),
                state.browser().as_str(),
                state.state_type().as_str(),
                state.index() as i64,
                state.revision_nb() as i64,
                key.automation.as_str(),
                key.browser_config,
                serde_json::to_string(&key.cli_options)?,
                serde_json::to_string(&key.extensions)?,
                key.mech_group,
                state.to_record().to_string(),
                serde_json::to_string(&record.result)?,
                record.result.dirty as i32,
                record.browser_version,
                padded,
                record.binary_origin.as_str(),
                record.driver_version,
                stored_build_id,
                artisanal as i32,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn has(&self, collection: &str, key: &EvalKey) -> Result<bool, StoreError> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM results WHERE collection = ?1 AND key_fingerprint = ?2",
            params![collection, key.fingerprint()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Earliest stored record for a key. Later appends never shadow it.
    pub fn get(&self, collection: &str, key: &EvalKey) -> Result<Option<EvalRecord>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT results, dirty, browser_version, binary_origin, driver_version
             FROM results
             WHERE collection = ?1 AND key_fingerprint = ?2
             ORDER BY id ASC
             LIMIT 1",
        )?;
        let row = stmt
            .query_row(params![collection, key.fingerprint()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, Option<String>>(4)?,
                ))
            })
            .optional()?;

        let Some((results_json, dirty, browser_version, origin, driver_version)) = row else {
            return Ok(None);
        };
        let mut result: StateResult = serde_json::from_str(&results_json)?;
        result.dirty = dirty != 0;
        let binary_origin = BinaryOrigin::parse(&origin)
            .ok_or_else(|| StoreError::CorruptRow(format!("unknown binary origin '{origin}'")))?;
        Ok(Some(EvalRecord {
            browser_version,
            binary_origin,
            driver_version,
            result,
        }))
    }

    /// Earliest terminal result per position inside a revision range.
    ///
    /// Dirty rows come back as `Failed` but keep their outcome, so a resumed
    /// search can narrow on them while remembering the doubt.
    pub fn load_range(
        &self,
        collection: &str,
        filter: &RangeFilter,
        checker: &dyn OutcomeChecker,
    ) -> Result<Vec<EvaluatedState>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT state, results, dirty
             FROM results
             WHERE collection = ?1 AND browser_name = ?2 AND state_type = ?3
               AND browser_config = ?4 AND cli_options = ?5 AND extensions = ?6
               AND mech_group = ?7
               AND revision_number >= ?8 AND revision_number <= ?9
             ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(
            params![
                collection,
                filter.browser.as_str(),
                filter.state_type.as_str(),
                filter.browser_config,
                serde_json::to_string(&filter.cli_options)?,
                serde_json::to_string(&filter.extensions)?,
                filter.mech_group,
                filter.lo_revision as i64,
                filter.hi_revision as i64,
            ],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            },
        )?;

        let mut by_index: BTreeMap<u64, EvaluatedState> = BTreeMap::new();
        for row in rows {
            let (state_json, results_json, dirty) = row?;
            let record: serde_json::Value = serde_json::from_str(&state_json)?;
            let state = State::from_record(&record)?;
            if by_index.contains_key(&state.index()) {
                continue;
            }
            let mut result: StateResult = serde_json::from_str(&results_json)?;
            result.dirty = dirty != 0;
            let condition = if result.dirty {
                StateCondition::Failed
            } else {
                StateCondition::Completed
            };
            let outcome = checker.outcome(&result);
            by_index.insert(
                state.index(),
                EvaluatedState {
                    state,
                    condition,
                    result,
                    outcome,
                },
            );
        }
        Ok(by_index.into_values().collect())
    }
}
