//! Sandboxed-filesystem action backend.
//!
//! Mutating commands are gated upstream by the permission policy (sandbox
//! plus grants); this backend is the mechanism, not the gate. Writes and
//! deletes back up the prior file contents, which is what makes them
//! reversible.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::backend::{Backend, BackendOutcome};
use crate::error::BackendError;
use crate::policy::normalize_path;
use crate::types::{ActionArgs, ActionKind, ReverseOperation};

pub struct FileBackend {
    root: PathBuf,
}

impl FileBackend {
    /// Create the backend, ensuring the sandbox root directory exists.
    pub fn new(sandbox_root: &str) -> Result<Self, BackendError> {
        let root = normalize_path(sandbox_root);
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn execute_write(&self, args: &ActionArgs) -> Result<BackendOutcome, BackendError> {
        let path = require_path(args)?;
        let content = args
            .get("content")
            .and_then(|v| v.as_str())
            .ok_or_else(|| BackendError::InvalidArgs("missing 'content'".to_string()))?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let existed = path.exists();
        let backup = if existed {
            let backup = backup_path(&path);
            tokio::fs::copy(&path, &backup).await?;
            Some(backup)
        } else {
            None
        };

        tokio::fs::write(&path, content).await?;

        let reverse = match &backup {
            // Overwrite: restoring the backup puts the old bytes back.
            Some(backup) => ReverseOperation {
                command: "restore".to_string(),
                args: path_args(&[("path", path.as_path()), ("backup", backup.as_path())]),
            },
            // Fresh file: undo is removal.
            None => ReverseOperation {
                command: "delete".to_string(),
                args: path_args(&[("path", path.as_path())]),
            },
        };

        Ok(BackendOutcome::with_reverse(
            serde_json::json!({
                "path": path.to_string_lossy(),
                "created": !existed,
                "bytes": content.len(),
                "backup": backup.as_ref().map(|b| b.to_string_lossy().into_owned()),
            }),
            reverse,
        ))
    }

    async fn execute_read(&self, args: &ActionArgs) -> Result<BackendOutcome, BackendError> {
        let path = require_path(args)?;
        let content = tokio::fs::read_to_string(&path).await?;
        Ok(BackendOutcome::new(serde_json::json!({
            "path": path.to_string_lossy(),
            "content": content,
        })))
    }

    async fn execute_create(&self, args: &ActionArgs) -> Result<BackendOutcome, BackendError> {
        let path = require_path(args)?;
        let existed = path.exists();
        tokio::fs::create_dir_all(&path).await?;

        let result = serde_json::json!({
            "path": path.to_string_lossy(),
            "created": !existed,
        });
        Ok(if existed {
            BackendOutcome::new(result)
        } else {
            BackendOutcome::with_reverse(
                result,
                ReverseOperation {
                    command: "delete".to_string(),
                    args: path_args(&[("path", path.as_path())]),
                },
            )
        })
    }

    async fn execute_delete(&self, args: &ActionArgs) -> Result<BackendOutcome, BackendError> {
        let path = require_path(args)?;

        if !path.exists() {
            return Ok(BackendOutcome::new(serde_json::json!({
                "path": path.to_string_lossy(),
                "deleted": false,
            })));
        }

        let result = serde_json::json!({
            "path": path.to_string_lossy(),
            "deleted": true,
        });

        if path.is_dir() {
            // Only empty directories are deletable; undo recreates.
            tokio::fs::remove_dir(&path).await?;
            return Ok(BackendOutcome::with_reverse(
                result,
                ReverseOperation {
                    command: "create".to_string(),
                    args: path_args(&[("path", path.as_path())]),
                },
            ));
        }

        let backup = backup_path(&path);
        tokio::fs::copy(&path, &backup).await?;
        tokio::fs::remove_file(&path).await?;

        Ok(BackendOutcome::with_reverse(
            result,
            ReverseOperation {
                command: "restore".to_string(),
                args: path_args(&[("path", path.as_path()), ("backup", backup.as_path())]),
            },
        ))
    }

    async fn execute_restore(&self, args: &ActionArgs) -> Result<BackendOutcome, BackendError> {
        let path = require_path(args)?;
        let backup = args
            .get("backup")
            .and_then(|v| v.as_str())
            .map(normalize_path)
            .ok_or_else(|| BackendError::InvalidArgs("missing 'backup'".to_string()))?;

        tokio::fs::copy(&backup, &path).await?;
        tokio::fs::remove_file(&backup).await?;

        Ok(BackendOutcome::new(serde_json::json!({
            "path": path.to_string_lossy(),
            "restored": true,
        })))
    }

    async fn execute_list(&self, args: &ActionArgs) -> Result<BackendOutcome, BackendError> {
        let path = require_path(args)?;
        let mut entries = Vec::new();
        let mut dir = tokio::fs::read_dir(&path).await?;
        while let Some(entry) = dir.next_entry().await? {
            entries.push(entry.file_name().to_string_lossy().into_owned());
        }
        entries.sort();
        Ok(BackendOutcome::new(serde_json::json!({
            "path": path.to_string_lossy(),
            "entries": entries,
        })))
    }

    async fn execute_exists(&self, args: &ActionArgs) -> Result<BackendOutcome, BackendError> {
        let path = require_path(args)?;
        Ok(BackendOutcome::new(serde_json::json!({
            "path": path.to_string_lossy(),
            "exists": path.exists(),
        })))
    }
}

#[async_trait]
impl Backend for FileBackend {
    fn kind(&self) -> ActionKind {
        ActionKind::File
    }

    async fn execute(
        &self,
        command: &str,
        args: &ActionArgs,
    ) -> Result<BackendOutcome, BackendError> {
        match command {
            "write" => self.execute_write(args).await,
            "read" => self.execute_read(args).await,
            "create" => self.execute_create(args).await,
            "delete" => self.execute_delete(args).await,
            "restore" => self.execute_restore(args).await,
            "list" => self.execute_list(args).await,
            "exists" => self.execute_exists(args).await,
            _ => Err(BackendError::UnknownCommand {
                kind: ActionKind::File,
                command: command.to_string(),
            }),
        }
    }

    fn describe(&self, command: &str, args: &ActionArgs) -> String {
        let path = args
            .get("path")
            .and_then(|v| v.as_str())
            .unwrap_or("<no path>");
        match command {
            "write" => format!("Write file: {}", path),
            "create" => format!("Create directory: {}", path),
            "delete" => format!("Delete: {}", path),
            "restore" => format!("Restore: {}", path),
            other => format!("file {}: {}", other, path),
        }
    }
}

fn require_path(args: &ActionArgs) -> Result<PathBuf, BackendError> {
    args.get("path")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(normalize_path)
        .ok_or_else(|| BackendError::InvalidArgs("missing 'path'".to_string()))
}

fn backup_path(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push(".bak");
    PathBuf::from(os)
}

fn path_args(pairs: &[(&str, &Path)]) -> ActionArgs {
    let mut args = ActionArgs::new();
    for (key, path) in pairs {
        args.insert(
            key.to_string(),
            serde_json::Value::String(path.to_string_lossy().into_owned()),
        );
    }
    args
}
