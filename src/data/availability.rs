//! Binary availability: one row per probed build, plus a read-through
//! cache in front of the external probe.
//!
//! The cache contract is that a stored verdict is always served without
//! probing again; a miss triggers exactly one probe and the verdict is
//! recorded before it is returned.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::eval::BinaryProbe;
use crate::state::State;

use super::StoreError;

/// Stored availability verdict for one build.
#[derive(Debug, Clone)]
pub struct AvailabilityRecord {
    pub state: State,
    pub available: bool,
    pub url: Option<String>,
    pub build_id: Option<String>,
    pub checked_at: DateTime<Utc>,
}

/// Data access for the `binary_availability` table.
#[derive(Clone)]
pub struct AvailabilityStore {
    conn: Arc<Mutex<Connection>>,
}

impl AvailabilityStore {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// Record a verdict. Last write wins and refreshes the check timestamp.
    pub fn record(
        &self,
        state: &State,
        available: bool,
        url: Option<&str>,
        build_id: Option<&str>,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO binary_availability
                 (browser_name, state_type, state_index, state, binary_online, url, build_id, checked_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(browser_name, state_type, state_index)
             DO UPDATE SET state = ?4, binary_online = ?5, url = ?6, build_id = ?7, checked_at = ?8",
            params![
                state.browser().as_str(),
                state.state_type().as_str(),
                state.index() as i64,
                state.to_record().to_string(),
                available as i32,
                url,
                build_id,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn lookup(&self, state: &State) -> Result<Option<AvailabilityRecord>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT state, binary_online, url, build_id, checked_at
             FROM binary_availability
             WHERE browser_name = ?1 AND state_type = ?2 AND state_index = ?3",
        )?;
        let row = stmt
            .query_row(
                params![
                    state.browser().as_str(),
                    state.state_type().as_str(),
                    state.index() as i64,
                ],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()?;

        let Some((state_json, online, url, build_id, checked_at)) = row else {
            return Ok(None);
        };
        let record: serde_json::Value = serde_json::from_str(&state_json)?;
        let stored_state = State::from_record(&record)?;
        let checked_at = DateTime::parse_from_rfc3339(&checked_at)
            .map(|ts| ts.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());
        Ok(Some(AvailabilityRecord {
            state: stored_state,
            available: online != 0,
            url,
            build_id,
            checked_at,
        }))
    }

    /// Build id stored with the availability verdict, if any.
    pub fn build_id(&self, state: &State) -> Result<Option<String>, StoreError> {
        Ok(self.lookup(state)?.and_then(|record| record.build_id))
    }
}

/// Read-through cache over the external probe.
#[derive(Clone)]
pub struct AvailabilityCache {
    store: AvailabilityStore,
    probe: Arc<dyn BinaryProbe>,
}

impl AvailabilityCache {
    pub fn new(store: AvailabilityStore, probe: Arc<dyn BinaryProbe>) -> Self {
        Self { store, probe }
    }

    pub fn store(&self) -> &AvailabilityStore {
        &self.store
    }

    /// Availability of a build, probing and recording on a cache miss.
    pub async fn check(&self, state: &State) -> Result<AvailabilityRecord, StoreError> {
        if let Some(record) = self.store.lookup(state)? {
            return Ok(record);
        }
        tracing::debug!(state = %state, "availability miss, probing archive");
        let outcome = self.probe.is_available(state).await;
        self.store.record(
            state,
            outcome.available,
            outcome.url.as_deref(),
            outcome.build_id.as_deref(),
        )?;
        Ok(AvailabilityRecord {
            state: state.clone(),
            available: outcome.available,
            url: outcome.url,
            build_id: outcome.build_id,
            checked_at: Utc::now(),
        })
    }

    /// Re-check the remote archive even when a verdict is already stored.
    pub async fn refresh(&self, state: &State) -> Result<AvailabilityRecord, StoreError> {
        let outcome = self.probe.is_available_online(state).await;
        self.store.record(
            state,
            outcome.available,
            outcome.url.as_deref(),
            outcome.build_id.as_deref(),
        )?;
        Ok(AvailabilityRecord {
            state: state.clone(),
            available: outcome.available,
            url: outcome.url,
            build_id: outcome.build_id,
            checked_at: Utc::now(),
        })
    }

    /// Overwrite the verdict after a binary turned out to be unobtainable.
    pub fn mark_unavailable(&self, state: &State) -> Result<(), StoreError> {
        self.store.record(state, false, None, None)
    }
}
