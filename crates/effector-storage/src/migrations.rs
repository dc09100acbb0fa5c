//! Database schema migrations.
//!
//! Applies the initial schema: the action journal, the grants log, and the
//! memories table, plus the schema_migrations tracking table.

use rusqlite::Connection;
use tracing::info;

use effector_core::error::EffectorError;

/// Run all pending database migrations.
///
/// Currently implements the initial schema (version 1). Future migrations
/// can be added by checking the current version and applying incremental changes.
pub fn run_migrations(conn: &Connection) -> Result<(), EffectorError> {
    // Create the migrations tracking table first.
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY NOT NULL,
            name        TEXT NOT NULL,
            applied_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );",
    )
    .map_err(|e| EffectorError::Storage(format!("Failed to create migrations table: {}", e)))?;

    let current_version: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .map_err(|e| EffectorError::Storage(format!("Failed to query migration version: {}", e)))?;

    if current_version < 1 {
        apply_v1(conn)?;
        info!("Applied migration v1: initial_schema");
    }

    Ok(())
}

/// Version 1: Initial schema.
fn apply_v1(conn: &Connection) -> Result<(), EffectorError> {
    conn.execute_batch(
        "
        -- Durable record of every attempted action, keyed by action id.
        -- Re-recording the same id replaces the prior row.
        CREATE TABLE IF NOT EXISTS action_journal (
            id                  TEXT PRIMARY KEY NOT NULL,
            kind                TEXT NOT NULL,
            command             TEXT NOT NULL,
            args                TEXT NOT NULL DEFAULT '{}',
            result              TEXT,
            error               TEXT,
            disposition         TEXT NOT NULL DEFAULT 'completed'
                                CHECK (disposition IN ('completed', 'failed', 'denied')),
            completed_at        INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
            reverse_operation   TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_action_journal_kind
            ON action_journal (kind, completed_at DESC);

        CREATE INDEX IF NOT EXISTS idx_action_journal_completed_at
            ON action_journal (completed_at DESC);

        -- Temporary path grants. Append-only; expiry is checked on read.
        CREATE TABLE IF NOT EXISTS grants (
            path        TEXT NOT NULL,
            granted_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
            expires_at  INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_grants_path
            ON grants (path);

        -- Memory backend rows.
        CREATE TABLE IF NOT EXISTS memories (
            id          TEXT PRIMARY KEY NOT NULL,
            memory_type TEXT NOT NULL DEFAULT 'note',
            content     TEXT NOT NULL,
            context     TEXT,
            created_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );

        CREATE INDEX IF NOT EXISTS idx_memories_created_at
            ON memories (created_at DESC);

        INSERT INTO schema_migrations (version, name) VALUES (1, 'initial_schema');
        ",
    )
    .map_err(|e| EffectorError::Storage(format!("Migration v1 failed: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();

        let version: i64 = conn
            .query_row(
                "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(version, 1);
    }

    #[test]
    fn test_v1_tables_exist() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        for table in ["action_journal", "grants", "memories"] {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
                    [table],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(count, 1, "missing table {}", table);
        }
    }

    #[test]
    fn test_disposition_check_constraint() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        let result = conn.execute(
            "INSERT INTO action_journal (id, kind, command, disposition)
             VALUES ('x', 'file', 'write', 'bogus')",
            [],
        );
        assert!(result.is_err());
    }
}
