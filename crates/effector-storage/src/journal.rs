//! The durable action journal.
//!
//! Every attempted action is recorded here, whatever its outcome. The
//! journal is the audit record: the in-memory undo stack and grant set are
//! runtime conveniences, but this table survives process restarts.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use effector_core::error::EffectorError;
use effector_core::types::Timestamp;

use crate::db::Database;

/// Outcome class of a journaled action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    /// The backend ran and returned a result.
    Completed,
    /// The backend ran and raised an error, or was unavailable.
    Failed,
    /// The permission policy (or the operator) rejected the action.
    Denied,
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Disposition::Completed => write!(f, "completed"),
            Disposition::Failed => write!(f, "failed"),
            Disposition::Denied => write!(f, "denied"),
        }
    }
}

impl FromStr for Disposition {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "completed" => Ok(Disposition::Completed),
            "failed" => Ok(Disposition::Failed),
            "denied" => Ok(Disposition::Denied),
            _ => Err(format!("Unknown disposition: {}", s)),
        }
    }
}

/// One journal row. Serialized fields (`args`, `result`,
/// `reverse_operation`) are stored as JSON text, opaque to this layer.
#[derive(Debug, Clone, serde::Serialize)]
pub struct JournalEntry {
    pub id: String,
    pub kind: String,
    pub command: String,
    pub args: String,
    pub result: Option<String>,
    pub error: Option<String>,
    pub disposition: Disposition,
    pub completed_at: Timestamp,
    pub reverse_operation: Option<String>,
}

/// A grant row, as persisted.
#[derive(Debug, Clone, serde::Serialize)]
pub struct GrantRow {
    pub path: String,
    pub granted_at: Timestamp,
    pub expires_at: Timestamp,
}

/// Append/replace interface over the `action_journal` and `grants` tables.
///
/// Writes are durable before `record` returns: the underlying connection
/// commits synchronously (WAL, synchronous=NORMAL), with no buffering layer
/// above it.
#[derive(Clone)]
pub struct Journal {
    db: Arc<Database>,
}

impl Journal {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Record an action outcome, replacing any prior row with the same id.
    pub fn record(&self, entry: &JournalEntry) -> Result<(), EffectorError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO action_journal
                 (id, kind, command, args, result, error, disposition, completed_at, reverse_operation)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                rusqlite::params![
                    entry.id,
                    entry.kind,
                    entry.command,
                    entry.args,
                    entry.result,
                    entry.error,
                    entry.disposition.to_string(),
                    entry.completed_at.0,
                    entry.reverse_operation,
                ],
            )
            .map_err(|e| EffectorError::Storage(format!("Journal write failed: {}", e)))?;
            Ok(())
        })
    }

    /// Append a grant row.
    pub fn record_grant(&self, grant: &GrantRow) -> Result<(), EffectorError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO grants (path, granted_at, expires_at) VALUES (?1, ?2, ?3)",
                rusqlite::params![grant.path, grant.granted_at.0, grant.expires_at.0],
            )
            .map_err(|e| EffectorError::Storage(format!("Grant write failed: {}", e)))?;
            Ok(())
        })
    }

    /// Total number of journaled actions.
    pub fn count(&self) -> Result<u64, EffectorError> {
        self.count_where("1 = 1")
    }

    /// Number of journaled actions that completed successfully.
    pub fn count_completed(&self) -> Result<u64, EffectorError> {
        self.count_where("disposition = 'completed'")
    }

    fn count_where(&self, predicate: &str) -> Result<u64, EffectorError> {
        self.db.with_conn(|conn| {
            let count: i64 = conn
                .query_row(
                    &format!("SELECT COUNT(*) FROM action_journal WHERE {}", predicate),
                    [],
                    |row| row.get(0),
                )
                .map_err(|e| EffectorError::Storage(format!("Journal count failed: {}", e)))?;
            Ok(count as u64)
        })
    }

    /// Fetch a single entry by action id.
    pub fn get(&self, id: &str) -> Result<Option<JournalEntry>, EffectorError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, kind, command, args, result, error, disposition,
                            completed_at, reverse_operation
                     FROM action_journal WHERE id = ?1",
                )
                .map_err(|e| EffectorError::Storage(format!("Journal get prepare: {}", e)))?;

            let mut rows = stmt
                .query_map([id], map_entry_row)
                .map_err(|e| EffectorError::Storage(format!("Journal get: {}", e)))?;

            match rows.next() {
                Some(row) => {
                    let entry = row.map_err(|e| EffectorError::Storage(e.to_string()))??;
                    Ok(Some(entry))
                }
                None => Ok(None),
            }
        })
    }

    /// Fetch the most recent entries, newest first.
    pub fn recent(&self, limit: u64) -> Result<Vec<JournalEntry>, EffectorError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, kind, command, args, result, error, disposition,
                            completed_at, reverse_operation
                     FROM action_journal
                     ORDER BY completed_at DESC, id DESC
                     LIMIT ?1",
                )
                .map_err(|e| EffectorError::Storage(format!("Journal recent prepare: {}", e)))?;

            let rows = stmt
                .query_map([limit as i64], map_entry_row)
                .map_err(|e| EffectorError::Storage(format!("Journal recent: {}", e)))?;

            let mut results = Vec::new();
            for row in rows {
                let entry = row.map_err(|e| EffectorError::Storage(e.to_string()))??;
                results.push(entry);
            }
            Ok(results)
        })
    }
}

fn map_entry_row(
    row: &rusqlite::Row<'_>,
) -> rusqlite::Result<Result<JournalEntry, EffectorError>> {
    let disposition_text: String = row.get(6)?;
    Ok(disposition_text
        .parse::<Disposition>()
        .map_err(EffectorError::Storage)
        .map(|disposition| JournalEntry {
            id: row.get(0).unwrap_or_default(),
            kind: row.get(1).unwrap_or_default(),
            command: row.get(2).unwrap_or_default(),
            args: row.get(3).unwrap_or_default(),
            result: row.get(4).unwrap_or_default(),
            error: row.get(5).unwrap_or_default(),
            disposition,
            completed_at: Timestamp(row.get(7).unwrap_or_default()),
            reverse_operation: row.get(8).unwrap_or_default(),
        }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn journal() -> Journal {
        Journal::new(Arc::new(Database::in_memory().unwrap()))
    }

    fn entry(id: &str) -> JournalEntry {
        JournalEntry {
            id: id.to_string(),
            kind: "memory".to_string(),
            command: "store".to_string(),
            args: r#"{"content":"hello"}"#.to_string(),
            result: Some(r#"{"stored":true}"#.to_string()),
            error: None,
            disposition: Disposition::Completed,
            completed_at: Timestamp::now(),
            reverse_operation: None,
        }
    }

    #[test]
    fn test_record_and_get() {
        let journal = journal();
        journal.record(&entry("memory_1")).unwrap();

        let fetched = journal.get("memory_1").unwrap().unwrap();
        assert_eq!(fetched.kind, "memory");
        assert_eq!(fetched.command, "store");
        assert_eq!(fetched.disposition, Disposition::Completed);
        assert_eq!(fetched.result.as_deref(), Some(r#"{"stored":true}"#));
    }

    #[test]
    fn test_get_missing_returns_none() {
        let journal = journal();
        assert!(journal.get("nope").unwrap().is_none());
    }

    #[test]
    fn test_record_replaces_by_id() {
        let journal = journal();
        journal.record(&entry("a_1")).unwrap();

        let mut second = entry("a_1");
        second.disposition = Disposition::Failed;
        second.error = Some("backend exploded".to_string());
        journal.record(&second).unwrap();

        assert_eq!(journal.count().unwrap(), 1);
        let fetched = journal.get("a_1").unwrap().unwrap();
        assert_eq!(fetched.disposition, Disposition::Failed);
        assert_eq!(fetched.error.as_deref(), Some("backend exploded"));
    }

    #[test]
    fn test_counts_by_disposition() {
        let journal = journal();
        journal.record(&entry("a_1")).unwrap();

        let mut denied = entry("a_2");
        denied.disposition = Disposition::Denied;
        denied.result = None;
        journal.record(&denied).unwrap();

        assert_eq!(journal.count().unwrap(), 2);
        assert_eq!(journal.count_completed().unwrap(), 1);
    }

    #[test]
    fn test_recent_newest_first() {
        let journal = journal();
        for i in 0..5 {
            let mut e = entry(&format!("a_{}", i));
            e.completed_at = Timestamp(1_700_000_000 + i);
            journal.record(&e).unwrap();
        }

        let recent = journal.recent(3).unwrap();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].id, "a_4");
        assert_eq!(recent[2].id, "a_2");
    }

    #[test]
    fn test_record_grant() {
        let journal = journal();
        let now = Timestamp::now();
        journal
            .record_grant(&GrantRow {
                path: "/tmp/x".to_string(),
                granted_at: now,
                expires_at: Timestamp(now.0 + 3600),
            })
            .unwrap();

        // Grants are append-only: a second grant for the same path is a new row.
        journal
            .record_grant(&GrantRow {
                path: "/tmp/x".to_string(),
                granted_at: now,
                expires_at: Timestamp(now.0 + 7200),
            })
            .unwrap();
    }

    #[test]
    fn test_disposition_round_trip() {
        for d in [
            Disposition::Completed,
            Disposition::Failed,
            Disposition::Denied,
        ] {
            let parsed: Disposition = d.to_string().parse().unwrap();
            assert_eq!(d, parsed);
        }
        assert!("bogus".parse::<Disposition>().is_err());
    }

    #[test]
    fn test_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("j.db");

        {
            let journal = Journal::new(Arc::new(Database::new(&path).unwrap()));
            journal.record(&entry("persist_1")).unwrap();
        }

        let journal = Journal::new(Arc::new(Database::new(&path).unwrap()));
        assert_eq!(journal.count().unwrap(), 1);
        assert!(journal.get("persist_1").unwrap().is_some());
    }
}
