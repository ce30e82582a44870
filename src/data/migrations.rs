//! Database schema migrations using a versioned migration pattern.
//!
//! Each migration runs exactly once and is tracked in the `schema_migrations`
//! table. Migrations are applied in order by version number.

use rusqlite::{params, Connection};

/// A database migration with a version number, name, and SQL to execute.
pub struct Migration {
    /// Unique version number (migrations run in order)
    pub version: i64,
    /// Human-readable name for the migration
    pub name: &'static str,
    /// SQL to execute (can be multiple statements)
    pub sql: &'static str,
}

/// All migrations in order. New migrations should be added at the end.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "create_results_table",
        sql: r#"
            CREATE TABLE IF NOT EXISTS results (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                collection TEXT NOT NULL,
                key_fingerprint TEXT NOT NULL,
                browser_name TEXT NOT NULL,
                state_type TEXT NOT NULL,
                state_index INTEGER NOT NULL,
                revision_number INTEGER NOT NULL,
                automation TEXT NOT NULL,
                browser_config TEXT NOT NULL,
                cli_options TEXT NOT NULL,
                extensions TEXT NOT NULL,
                mech_group TEXT NOT NULL,
                state TEXT NOT NULL,
                results TEXT NOT NULL,
                dirty INTEGER NOT NULL DEFAULT 0,
                browser_version TEXT NOT NULL,
                padded_browser_version TEXT NOT NULL,
                binary_origin TEXT NOT NULL,
                driver_version TEXT,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_results_fingerprint
                ON results(collection, key_fingerprint);
            CREATE INDEX IF NOT EXISTS idx_results_range
                ON results(collection, browser_name, state_type, revision_number);
        "#,
    },
    Migration {
        version: 2,
        name: "create_binary_availability_table",
        sql: r#"
            CREATE TABLE IF NOT EXISTS binary_availability (
                browser_name TEXT NOT NULL,
                state_type TEXT NOT NULL,
                state_index INTEGER NOT NULL,
                state TEXT NOT NULL,
                binary_online INTEGER NOT NULL,
                url TEXT,
                checked_at TEXT NOT NULL,
                PRIMARY KEY (browser_name, state_type, state_index)
            );
        "#,
    },
    Migration {
        version: 3,
        name: "create_eval_claims_table",
        sql: r#"
            CREATE TABLE IF NOT EXISTS eval_claims (
                key_fingerprint TEXT PRIMARY KEY,
                session_id TEXT NOT NULL,
                claimed_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_eval_claims_session
                ON eval_claims(session_id);
        "#,
    },
    Migration {
        version: 4,
        name: "add_firefox_build_metadata",
        sql: r#"
            ALTER TABLE results ADD COLUMN build_id TEXT;
            ALTER TABLE results ADD COLUMN artisanal INTEGER NOT NULL DEFAULT 0;
            ALTER TABLE binary_availability ADD COLUMN build_id TEXT;
        "#,
    },
];

/// Create the schema_migrations table if it doesn't exist.
fn ensure_migrations_table(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL
        )",
        [],
    )?;
    Ok(())
}

/// Get the set of already-applied migration versions.
fn get_applied_versions(conn: &Connection) -> rusqlite::Result<std::collections::HashSet<i64>> {
    let mut stmt = conn.prepare("SELECT version FROM schema_migrations")?;
    let versions = stmt
        .query_map([], |row| row.get::<_, i64>(0))?
        .collect::<rusqlite::Result<std::collections::HashSet<i64>>>()?;
    Ok(versions)
}

/// Run all pending migrations.
///
/// This is the main entry point for the migration system.
pub fn run_migrations(conn: &mut Connection) -> rusqlite::Result<()> {
    ensure_migrations_table(conn)?;

    let applied = get_applied_versions(conn)?;

    for migration in MIGRATIONS {
        if applied.contains(&migration.version) {
            continue;
        }

        tracing::info!(
            version = migration.version,
            name = migration.name,
            "Applying migration"
        );

        // Execute the migration SQL and record it within a single transaction
        let now = chrono::Utc::now().to_rfc3339();
        let tx = conn.transaction()?;
        if let Err(e) = tx.execute_batch(migration.sql) {
            tracing::error!(
                version = migration.version,
                name = migration.name,
                error = %e,
                "Migration failed"
            );
            return Err(e);
        }
        if let Err(e) = tx.execute(
            "INSERT INTO schema_migrations (version, name, applied_at) VALUES (?1, ?2, ?3)",
            params![migration.version, migration.name, now],
        ) {
            tracing::error!(
                version = migration.version,
                name = migration.name,
                error = %e,
                "Migration failed"
            );
            return Err(e);
        }
        if let Err(e) = tx.commit() {
            tracing::error!(
                version = migration.version,
                name = migration.name,
                error = %e,
                "Migration failed"
            );
            return Err(e);
        }

        tracing::info!(
            version = migration.version,
            name = migration.name,
            "Migration applied successfully"
        );
    }

    Ok(())
}
