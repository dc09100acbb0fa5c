//! Backend collaborator contract and registry.
//!
//! A backend is a black box reached over any transport (in-process call,
//! subprocess, local daemon). The engine only assumes the single `execute`
//! contract plus a cheap availability probe; transport retry/timeout policy
//! is each backend's own concern.

pub mod browser;
pub mod file;
pub mod memory;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::BackendError;
use crate::types::{ActionArgs, ActionKind, ReverseOperation};

pub use browser::BrowserBackend;
pub use file::FileBackend;
pub use memory::MemoryBackend;

/// What a backend returns on success: an opaque result value, plus the
/// reverse operation when the backend knows how to undo what it just did.
#[derive(Debug, Clone)]
pub struct BackendOutcome {
    pub result: serde_json::Value,
    pub reverse: Option<ReverseOperation>,
}

impl BackendOutcome {
    pub fn new(result: serde_json::Value) -> Self {
        Self {
            result,
            reverse: None,
        }
    }

    pub fn with_reverse(result: serde_json::Value, reverse: ReverseOperation) -> Self {
        Self {
            result,
            reverse: Some(reverse),
        }
    }
}

/// One action backend.
#[async_trait]
pub trait Backend: Send + Sync {
    /// The kind this backend serves.
    fn kind(&self) -> ActionKind;

    /// Whether the backend is constructed/reachable, without invoking it.
    fn available(&self) -> bool {
        true
    }

    /// Execute one backend-specific command.
    async fn execute(
        &self,
        command: &str,
        args: &ActionArgs,
    ) -> Result<BackendOutcome, BackendError>;

    /// Human-readable description, shown in permission prompts.
    fn describe(&self, command: &str, args: &ActionArgs) -> String {
        let _ = args;
        format!("{} {}", self.kind(), command)
    }
}

/// Lookup table from action kind to backend, built once at startup.
#[derive(Default)]
pub struct BackendRegistry {
    backends: HashMap<ActionKind, Arc<dyn Backend>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a backend under its own kind. Last registration wins.
    pub fn register(&mut self, backend: Arc<dyn Backend>) {
        self.backends.insert(backend.kind(), backend);
    }

    pub fn get(&self, kind: ActionKind) -> Option<Arc<dyn Backend>> {
        self.backends.get(&kind).cloned()
    }

    pub fn contains(&self, kind: ActionKind) -> bool {
        self.backends.contains_key(&kind)
    }

    /// Availability of every registered backend, keyed by kind name.
    pub fn availability(&self) -> BTreeMap<String, bool> {
        self.backends
            .iter()
            .map(|(kind, backend)| (kind.to_string(), backend.available()))
            .collect()
    }
}
