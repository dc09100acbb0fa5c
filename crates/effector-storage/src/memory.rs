//! Memory store backing the memory backend.
//!
//! Simple typed rows with substring recall. Recall is a LIKE match over
//! content; anything smarter (embeddings, ranking) belongs to a dedicated
//! memory system, not the action coordinator.

use std::sync::Arc;

use uuid::Uuid;

use effector_core::error::EffectorError;
use effector_core::types::Timestamp;

use crate::db::Database;

/// A stored memory row.
#[derive(Debug, Clone, serde::Serialize)]
pub struct MemoryRow {
    pub id: String,
    pub memory_type: String,
    pub content: String,
    pub context: Option<String>,
    pub created_at: Timestamp,
}

/// CRUD interface over the `memories` table.
#[derive(Clone)]
pub struct MemoryStore {
    db: Arc<Database>,
}

impl MemoryStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Store a memory, returning the created row.
    pub fn store(
        &self,
        memory_type: &str,
        content: &str,
        context: Option<&str>,
    ) -> Result<MemoryRow, EffectorError> {
        let row = MemoryRow {
            id: Uuid::new_v4().to_string(),
            memory_type: memory_type.to_string(),
            content: content.to_string(),
            context: context.map(|s| s.to_string()),
            created_at: Timestamp::now(),
        };

        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO memories (id, memory_type, content, context, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    row.id,
                    row.memory_type,
                    row.content,
                    row.context,
                    row.created_at.0
                ],
            )
            .map_err(|e| EffectorError::Storage(format!("Memory store failed: {}", e)))?;
            Ok(())
        })?;

        Ok(row)
    }

    /// Re-insert a previously deleted memory under its original id.
    ///
    /// Used by the undo path of `forget`.
    pub fn restore(&self, row: &MemoryRow) -> Result<(), EffectorError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO memories (id, memory_type, content, context, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    row.id,
                    row.memory_type,
                    row.content,
                    row.context,
                    row.created_at.0
                ],
            )
            .map_err(|e| EffectorError::Storage(format!("Memory restore failed: {}", e)))?;
            Ok(())
        })
    }

    /// Recall memories whose content contains the query, newest first.
    pub fn recall(&self, query: &str, limit: u64) -> Result<Vec<MemoryRow>, EffectorError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, memory_type, content, context, created_at
                     FROM memories
                     WHERE content LIKE '%' || ?1 || '%'
                     ORDER BY created_at DESC
                     LIMIT ?2",
                )
                .map_err(|e| EffectorError::Storage(format!("Memory recall prepare: {}", e)))?;

            let rows = stmt
                .query_map(rusqlite::params![query, limit as i64], map_memory_row)
                .map_err(|e| EffectorError::Storage(format!("Memory recall: {}", e)))?;

            let mut results = Vec::new();
            for row in rows {
                results.push(row.map_err(|e| EffectorError::Storage(e.to_string()))?);
            }
            Ok(results)
        })
    }

    /// Fetch a memory by id.
    pub fn get(&self, id: &str) -> Result<Option<MemoryRow>, EffectorError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, memory_type, content, context, created_at
                     FROM memories WHERE id = ?1",
                )
                .map_err(|e| EffectorError::Storage(format!("Memory get prepare: {}", e)))?;

            let mut rows = stmt
                .query_map([id], map_memory_row)
                .map_err(|e| EffectorError::Storage(format!("Memory get: {}", e)))?;

            match rows.next() {
                Some(row) => Ok(Some(row.map_err(|e| EffectorError::Storage(e.to_string()))?)),
                None => Ok(None),
            }
        })
    }

    /// Delete a memory by id. Returns whether a row was removed.
    pub fn forget(&self, id: &str) -> Result<bool, EffectorError> {
        self.db.with_conn(|conn| {
            let changed = conn
                .execute("DELETE FROM memories WHERE id = ?1", [id])
                .map_err(|e| EffectorError::Storage(format!("Memory forget failed: {}", e)))?;
            Ok(changed > 0)
        })
    }
}

fn map_memory_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MemoryRow> {
    Ok(MemoryRow {
        id: row.get(0)?,
        memory_type: row.get(1)?,
        content: row.get(2)?,
        context: row.get(3)?,
        created_at: Timestamp(row.get(4)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> MemoryStore {
        MemoryStore::new(Arc::new(Database::in_memory().unwrap()))
    }

    #[test]
    fn test_store_and_get() {
        let store = store();
        let row = store.store("note", "remember the milk", None).unwrap();

        let fetched = store.get(&row.id).unwrap().unwrap();
        assert_eq!(fetched.content, "remember the milk");
        assert_eq!(fetched.memory_type, "note");
        assert!(fetched.context.is_none());
    }

    #[test]
    fn test_recall_substring_match() {
        let store = store();
        store.store("note", "hello world", None).unwrap();
        store.store("note", "goodbye world", None).unwrap();
        store.store("note", "unrelated", Some("ctx")).unwrap();

        let hits = store.recall("world", 10).unwrap();
        assert_eq!(hits.len(), 2);

        let hits = store.recall("hello", 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].content, "hello world");
    }

    #[test]
    fn test_recall_no_match() {
        let store = store();
        store.store("note", "something", None).unwrap();
        assert!(store.recall("absent", 10).unwrap().is_empty());
    }

    #[test]
    fn test_recall_respects_limit() {
        let store = store();
        for i in 0..5 {
            store.store("note", &format!("item {}", i), None).unwrap();
        }
        assert_eq!(store.recall("item", 2).unwrap().len(), 2);
    }

    #[test]
    fn test_forget_and_restore() {
        let store = store();
        let row = store.store("note", "ephemeral", None).unwrap();

        assert!(store.forget(&row.id).unwrap());
        assert!(store.get(&row.id).unwrap().is_none());
        assert!(!store.forget(&row.id).unwrap());

        store.restore(&row).unwrap();
        let back = store.get(&row.id).unwrap().unwrap();
        assert_eq!(back.content, "ephemeral");
        assert_eq!(back.id, row.id);
    }
}
