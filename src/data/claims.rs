//! Claim records for in-flight evaluations.
//!
//! A claim is one row keyed by the evaluation fingerprint. Acquisition is a
//! plain INSERT, so the primary key makes it atomic: whoever inserts first
//! owns the evaluation, everyone else sees a unique violation.

use std::sync::{Arc, Mutex};

use chrono::Utc;
use rusqlite::{params, Connection, Error as SqliteError, ErrorCode, OptionalExtension};
use uuid::Uuid;

/// Result of a claim attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// This session now owns the evaluation.
    Acquired,
    /// Another session already holds it.
    Conflict,
}

/// Data access for the `eval_claims` table.
#[derive(Clone)]
pub struct ClaimStore {
    conn: Arc<Mutex<Connection>>,
}

impl ClaimStore {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    pub fn try_acquire(
        &self,
        fingerprint: &str,
        session_id: Uuid,
    ) -> rusqlite::Result<ClaimOutcome> {
        let conn = self.conn.lock().unwrap();
        match conn.execute(
            "INSERT INTO eval_claims (key_fingerprint, session_id, claimed_at)
             VALUES (?1, ?2, ?3)",
            params![
                fingerprint,
                session_id.to_string(),
                Utc::now().to_rfc3339()
            ],
        ) {
            Ok(_) => Ok(ClaimOutcome::Acquired),
            Err(err) if is_unique_violation(&err) => Ok(ClaimOutcome::Conflict),
            Err(err) => Err(err),
        }
    }

    pub fn release(&self, fingerprint: &str) -> rusqlite::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM eval_claims WHERE key_fingerprint = ?1",
            params![fingerprint],
        )?;
        Ok(())
    }

    /// Drop every claim a session still holds. Returns how many were dropped.
    pub fn release_session(&self, session_id: Uuid) -> rusqlite::Result<usize> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM eval_claims WHERE session_id = ?1",
            params![session_id.to_string()],
        )
    }

    pub fn holder(&self, fingerprint: &str) -> rusqlite::Result<Option<Uuid>> {
        let conn = self.conn.lock().unwrap();
        let holder: Option<String> = conn
            .query_row(
                "SELECT session_id FROM eval_claims WHERE key_fingerprint = ?1",
                params![fingerprint],
                |row| row.get(0),
            )
            .optional()?;
        Ok(holder.and_then(|id| Uuid::parse_str(&id).ok()))
    }

    pub fn active_count(&self) -> rusqlite::Result<i64> {
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT COUNT(*) FROM eval_claims", [], |row| row.get(0))
    }
}

fn is_unique_violation(err: &SqliteError) -> bool {
    matches!(err, SqliteError::SqliteFailure(db_err, _) if matches!(db_err.code, ErrorCode::ConstraintViolation))
}
