//! Memory action backend.
//!
//! Stores and recalls typed memory rows through the storage crate.
//! `store` and `forget` are reversible; `recall` is read-only.

use async_trait::async_trait;

use effector_storage::memory::MemoryStore;

use crate::backend::{Backend, BackendOutcome};
use crate::error::BackendError;
use crate::types::{ActionArgs, ActionKind, ReverseOperation};

const DEFAULT_RECALL_LIMIT: u64 = 10;

pub struct MemoryBackend {
    store: MemoryStore,
}

impl MemoryBackend {
    pub fn new(store: MemoryStore) -> Self {
        Self { store }
    }

    fn execute_store(&self, args: &ActionArgs) -> Result<BackendOutcome, BackendError> {
        let content = require_str(args, "content")?;
        let memory_type = optional_str(args, "memory_type").unwrap_or("note");
        let context = optional_str(args, "context");

        let row = self.store.store(memory_type, content, context)?;

        let mut reverse_args = ActionArgs::new();
        reverse_args.insert("id".to_string(), serde_json::json!(row.id));

        Ok(BackendOutcome::with_reverse(
            serde_json::json!({"id": row.id, "stored": true}),
            ReverseOperation {
                command: "forget".to_string(),
                args: reverse_args,
            },
        ))
    }

    fn execute_recall(&self, args: &ActionArgs) -> Result<BackendOutcome, BackendError> {
        let query = require_str(args, "query")?;
        let limit = args
            .get("limit")
            .and_then(|v| v.as_u64())
            .unwrap_or(DEFAULT_RECALL_LIMIT);

        let rows = self.store.recall(query, limit)?;
        let count = rows.len();

        Ok(BackendOutcome::new(serde_json::json!({
            "matches": rows,
            "count": count,
        })))
    }

    fn execute_forget(&self, args: &ActionArgs) -> Result<BackendOutcome, BackendError> {
        let id = require_str(args, "id")?;

        // Capture the row before deletion so forgetting can be undone.
        let existing = self.store.get(id)?;
        let forgotten = self.store.forget(id)?;

        let reverse = existing.map(|row| {
            let mut reverse_args = ActionArgs::new();
            reverse_args.insert("id".to_string(), serde_json::json!(row.id));
            reverse_args.insert("memory_type".to_string(), serde_json::json!(row.memory_type));
            reverse_args.insert("content".to_string(), serde_json::json!(row.content));
            reverse_args.insert("context".to_string(), serde_json::json!(row.context));
            reverse_args.insert("created_at".to_string(), serde_json::json!(row.created_at.0));
            ReverseOperation {
                command: "restore".to_string(),
                args: reverse_args,
            }
        });

        let result = serde_json::json!({"id": id, "forgotten": forgotten});
        Ok(match reverse {
            Some(reverse) => BackendOutcome::with_reverse(result, reverse),
            None => BackendOutcome::new(result),
        })
    }

    fn execute_restore(&self, args: &ActionArgs) -> Result<BackendOutcome, BackendError> {
        let id = require_str(args, "id")?;
        let content = require_str(args, "content")?;
        let row = effector_storage::memory::MemoryRow {
            id: id.to_string(),
            memory_type: optional_str(args, "memory_type").unwrap_or("note").to_string(),
            content: content.to_string(),
            context: optional_str(args, "context").map(|s| s.to_string()),
            created_at: effector_core::types::Timestamp(
                args.get("created_at")
                    .and_then(|v| v.as_i64())
                    .unwrap_or_else(|| effector_core::types::Timestamp::now().0),
            ),
        };

        self.store.restore(&row)?;

        let mut reverse_args = ActionArgs::new();
        reverse_args.insert("id".to_string(), serde_json::json!(id));

        Ok(BackendOutcome::with_reverse(
            serde_json::json!({"id": id, "restored": true}),
            ReverseOperation {
                command: "forget".to_string(),
                args: reverse_args,
            },
        ))
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    fn kind(&self) -> ActionKind {
        ActionKind::Memory
    }

    async fn execute(
        &self,
        command: &str,
        args: &ActionArgs,
    ) -> Result<BackendOutcome, BackendError> {
        match command {
            "store" => self.execute_store(args),
            "recall" => self.execute_recall(args),
            "forget" => self.execute_forget(args),
            "restore" => self.execute_restore(args),
            _ => Err(BackendError::UnknownCommand {
                kind: ActionKind::Memory,
                command: command.to_string(),
            }),
        }
    }

    fn describe(&self, command: &str, args: &ActionArgs) -> String {
        match command {
            "store" => format!(
                "Store memory: {}",
                optional_str(args, "content").unwrap_or("<no content>")
            ),
            "recall" => format!(
                "Recall memories matching: {}",
                optional_str(args, "query").unwrap_or("<no query>")
            ),
            "forget" => format!(
                "Forget memory: {}",
                optional_str(args, "id").unwrap_or("<no id>")
            ),
            other => format!("memory {}", other),
        }
    }
}

fn require_str<'a>(args: &'a ActionArgs, key: &str) -> Result<&'a str, BackendError> {
    args.get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| BackendError::InvalidArgs(format!("missing '{}'", key)))
}

fn optional_str<'a>(args: &'a ActionArgs, key: &str) -> Option<&'a str> {
    args.get(key).and_then(|v| v.as_str())
}
