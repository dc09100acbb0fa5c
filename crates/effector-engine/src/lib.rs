//! Action coordination engine for Effector.
//!
//! Accepts typed action requests from multiple callers, enforces a
//! three-tier permission policy, executes at most one action at a time in
//! priority order, journals every outcome durably, and supports undoing
//! the most recently completed reversible action.

pub mod backend;
pub mod coordinator;
pub mod error;
pub mod policy;
pub mod queue;
pub mod types;
pub mod undo;

pub use backend::{
    Backend, BackendOutcome, BackendRegistry, BrowserBackend, FileBackend, MemoryBackend,
};
pub use coordinator::{Coordinator, StatusSnapshot, UndoOutcome, DEFAULT_PRIORITY};
pub use error::{BackendError, ExecuteError, QueueError};
pub use policy::{
    normalize_path, GrantSet, PermissionPolicy, PermissionPrompt, StaticPrompt, StdinPrompt,
};
pub use queue::ActionQueue;
pub use types::{
    Action, ActionArgs, ActionKind, ActionLevel, Grant, QueueState, ReverseOperation, Verdict,
};
pub use undo::UndoStack;
