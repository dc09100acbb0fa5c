//! Coordinator façade over the queue, policy, undo stack, and journal.
//!
//! Translates external requests into actions, owns the backend registry,
//! and exposes the status/undo/grant surface.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use effector_core::config::CoordinatorConfig;
use effector_core::error::EffectorError;
use effector_storage::journal::{Disposition, GrantRow, Journal};

use crate::backend::BackendRegistry;
use crate::error::{BackendError, ExecuteError, QueueError};
use crate::policy::{PermissionPolicy, PermissionPrompt};
use crate::queue::ActionQueue;
use crate::types::{Action, ActionArgs, ActionKind, ActionLevel, Grant, QueueState};
use crate::undo::UndoStack;

/// Default submission priority; lower dequeues first.
pub const DEFAULT_PRIORITY: i32 = 5;

/// Shared engine state: everything the worker and the coordinator both
/// touch. The dispatch lock is what serializes out-of-band undo/redo
/// execution against the worker's in-flight dispatch.
pub(crate) struct EngineState {
    pub(crate) registry: BackendRegistry,
    pub(crate) journal: Journal,
    pub(crate) undo: UndoStack,
    pub(crate) policy: PermissionPolicy,
    pub(crate) prompt: Arc<dyn PermissionPrompt>,
    pub(crate) prompt_timeout: Duration,
    pub(crate) dispatch_lock: tokio::sync::Mutex<()>,
}

/// Execute one approved action against its backend and record the outcome.
///
/// Holds the dispatch lock for the duration, so no two actions ever run
/// concurrently, wherever they came from. A backend failure is captured
/// into the action and journaled; it never propagates out of the worker.
/// With `track_undo`, a completed reversible action lands on the undo
/// stack; out-of-band undo/redo executions pass false so that applying an
/// inverse does not itself clear the redo history.
pub(crate) async fn dispatch(state: &EngineState, action: &mut Action, track_undo: bool) {
    let _guard = state.dispatch_lock.lock().await;

    let outcome = match state.registry.get(action.kind) {
        None => Err(BackendError::Unavailable(format!(
            "no backend registered for {}",
            action.kind
        ))),
        Some(backend) if !backend.available() => Err(BackendError::Unavailable(format!(
            "{} backend is not available",
            action.kind
        ))),
        Some(backend) => backend.execute(&action.command, &action.args).await,
    };

    match outcome {
        Ok(outcome) => {
            action.completed = true;
            action.result = Some(outcome.result);
            if track_undo && action.reverse_operation.is_none() {
                action.reverse_operation = outcome.reverse;
            }
            debug!(id = %action.id, command = %action.command, "Action completed");
        }
        Err(e) => {
            action.error = Some(e.to_string());
            warn!(id = %action.id, command = %action.command, error = %e, "Action failed");
        }
    }

    let disposition = if action.completed {
        Disposition::Completed
    } else {
        Disposition::Failed
    };
    if let Err(e) = state.journal.record(&action.journal_entry(disposition)) {
        error!(id = %action.id, error = %e, "Failed to journal action outcome");
    }

    if track_undo && action.completed {
        state.undo.push_if_reversible(action);
    }
}

/// Result of an undo or redo request.
#[derive(Debug, Clone, Serialize)]
pub struct UndoOutcome {
    /// The action being undone or redone.
    pub original_id: String,
    /// The synthesized action that applied the inverse (or re-applied).
    pub action_id: String,
    /// Whether the synthesized action completed.
    pub applied: bool,
    pub error: Option<String>,
}

/// Read-only snapshot for status reporting.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub queue_state: QueueState,
    pub queue_running: bool,
    pub queue_paused: bool,
    pub pending_actions: usize,
    pub undo_depth: usize,
    pub redo_depth: usize,
    pub live_grants: usize,
    pub journal_entries: u64,
    pub journal_completed: u64,
    pub backends: BTreeMap<String, bool>,
    pub sandbox_root: String,
}

/// The action coordination façade.
pub struct Coordinator {
    state: Arc<EngineState>,
    queue: ActionQueue,
}

impl Coordinator {
    pub fn new(
        config: &CoordinatorConfig,
        journal: Journal,
        registry: BackendRegistry,
        prompt: Arc<dyn PermissionPrompt>,
    ) -> Self {
        let state = Arc::new(EngineState {
            registry,
            journal,
            undo: UndoStack::new(config.undo_depth),
            policy: PermissionPolicy::new(&config.sandbox_root, config.out_of_sandbox_level),
            prompt,
            prompt_timeout: Duration::from_secs(config.permission_prompt_timeout_secs),
            dispatch_lock: tokio::sync::Mutex::new(()),
        });
        Self {
            state,
            queue: ActionQueue::new(),
        }
    }

    /// Start the queue worker.
    pub fn start(&self) {
        self.queue.start(Arc::clone(&self.state));
    }

    pub fn queue(&self) -> &ActionQueue {
        &self.queue
    }

    /// Build and enqueue an action. Fire-and-forget: the outcome surfaces
    /// through the journal once the worker gets to it.
    pub fn submit(
        &self,
        kind: ActionKind,
        command: impl Into<String>,
        args: ActionArgs,
        level: ActionLevel,
        priority: i32,
    ) -> Result<String, ExecuteError> {
        if !self.state.registry.contains(kind) {
            return Err(ExecuteError::UnknownKind(kind));
        }

        let action = Action::new(kind, level, command, args, priority);
        let id = action.id.clone();
        debug!(id = %id, kind = %kind, command = %action.command, priority, "Action submitted");
        self.queue.enqueue(action);
        Ok(id)
    }

    /// Undo the most recently completed reversible action.
    ///
    /// Executes the stored inverse synchronously, bypassing the queue:
    /// undo must reflect current state before any newly queued action
    /// runs, and must not wait behind arbitrarily many pending entries.
    /// The dispatch lock serializes it against an in-flight dispatch.
    pub async fn undo_last(&self) -> Option<UndoOutcome> {
        let original = self.state.undo.undo()?;
        // push_if_reversible guarantees a reverse operation is present.
        let reverse = original.reverse_operation.clone()?;

        let mut undo_action = Action::synthesized(
            format!("undo_{}", original.id),
            original.kind,
            original.level,
            reverse.command,
            reverse.args,
        );
        dispatch(&self.state, &mut undo_action, false).await;

        info!(
            original = %original.id,
            applied = undo_action.completed,
            "Undo executed"
        );
        Some(UndoOutcome {
            original_id: original.id,
            action_id: undo_action.id,
            applied: undo_action.completed,
            error: undo_action.error,
        })
    }

    /// Re-apply the most recently undone action.
    pub async fn redo_last(&self) -> Option<UndoOutcome> {
        let original = self.state.undo.redo()?;

        let mut redo_action = Action::synthesized(
            format!("redo_{}", original.id),
            original.kind,
            original.level,
            original.command.clone(),
            original.args.clone(),
        );
        dispatch(&self.state, &mut redo_action, false).await;

        info!(
            original = %original.id,
            applied = redo_action.completed,
            "Redo executed"
        );
        Some(UndoOutcome {
            original_id: original.id,
            action_id: redo_action.id,
            applied: redo_action.completed,
            error: redo_action.error,
        })
    }

    /// Grant temporary write access to a path outside the sandbox.
    pub fn grant(&self, path: &str, duration_minutes: i64) -> Result<Grant, EffectorError> {
        let grant = self
            .state
            .policy
            .grants()
            .add(path, duration_minutes * 60);
        self.state.journal.record_grant(&GrantRow {
            path: grant.path.to_string_lossy().into_owned(),
            granted_at: grant.granted_at,
            expires_at: grant.expires_at,
        })?;
        info!(path = %grant.path.display(), duration_minutes, "Grant recorded");
        Ok(grant)
    }

    /// Read-only status snapshot. Does not mutate any state.
    pub fn status(&self) -> Result<StatusSnapshot, EffectorError> {
        Ok(StatusSnapshot {
            queue_state: self.queue.state(),
            queue_running: self.queue.is_running(),
            queue_paused: self.queue.is_paused(),
            pending_actions: self.queue.pending_len(),
            undo_depth: self.state.undo.depth(),
            redo_depth: self.state.undo.redo_depth(),
            live_grants: self.state.policy.grants().live_count(),
            journal_entries: self.state.journal.count()?,
            journal_completed: self.state.journal.count_completed()?,
            backends: self.state.registry.availability(),
            sandbox_root: self.state.policy.sandbox_root().to_string_lossy().into_owned(),
        })
    }

    /// Look up a journaled outcome by action id.
    pub fn journal_entry(
        &self,
        id: &str,
    ) -> Result<Option<effector_storage::journal::JournalEntry>, EffectorError> {
        self.state.journal.get(id)
    }

    /// Stop the queue and wait (bounded) for the worker to exit.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), QueueError> {
        self.queue.stop();
        self.state.undo.clear();
        self.queue.join(timeout).await
    }
}
