//! Bounded undo/redo history for reversible actions.
//!
//! The stack only tracks history; it never inverts or dispatches anything.
//! The journal remains the full audit record after entries are evicted.

use std::sync::Mutex;

use crate::types::Action;

struct Histories {
    undo: Vec<Action>,
    redo: Vec<Action>,
}

/// Two bounded histories of reversible actions.
///
/// Pushing a new reversible action clears the redo history: redo is only
/// valid immediately after an undo, before any new committed action.
/// Eviction at the depth bound is FIFO, so old enough actions become
/// permanently un-undoable.
pub struct UndoStack {
    max_depth: usize,
    inner: Mutex<Histories>,
}

impl UndoStack {
    pub fn new(max_depth: usize) -> Self {
        Self {
            max_depth,
            inner: Mutex::new(Histories {
                undo: Vec::new(),
                redo: Vec::new(),
            }),
        }
    }

    /// Record a completed action if it declared a reverse operation.
    pub fn push_if_reversible(&self, action: &Action) {
        if action.reverse_operation.is_none() {
            return;
        }
        if let Ok(mut inner) = self.inner.lock() {
            inner.undo.push(action.clone());
            if inner.undo.len() > self.max_depth {
                inner.undo.remove(0);
            }
            inner.redo.clear();
        }
    }

    /// Pop the most recent undoable action, moving it to the redo history.
    pub fn undo(&self) -> Option<Action> {
        let mut inner = self.inner.lock().ok()?;
        let action = inner.undo.pop()?;
        inner.redo.push(action.clone());
        Some(action)
    }

    /// Pop the most recent undone action, moving it back to the undo history.
    pub fn redo(&self) -> Option<Action> {
        let mut inner = self.inner.lock().ok()?;
        let action = inner.redo.pop()?;
        inner.undo.push(action.clone());
        Some(action)
    }

    /// Empty both histories.
    pub fn clear(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.undo.clear();
            inner.redo.clear();
        }
    }

    pub fn depth(&self) -> usize {
        self.inner.lock().map(|i| i.undo.len()).unwrap_or(0)
    }

    pub fn redo_depth(&self) -> usize {
        self.inner.lock().map(|i| i.redo.len()).unwrap_or(0)
    }
}
