//! Thread-safe priority queue with a single sequential worker.
//!
//! Producers enqueue from any thread at any time; exactly one worker pulls
//! in `(priority, submitted_at)` order, applies the permission policy, and
//! dispatches. At most one action is ever mid-dispatch, which is the
//! ordering guarantee the whole engine exists to provide.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use effector_storage::journal::Disposition;

use crate::coordinator::{dispatch, EngineState};
use crate::error::QueueError;
use crate::types::{Action, QueueState, Verdict};

/// Bounded pull wait, so pause/stop checks stay responsive.
const PULL_WAIT: Duration = Duration::from_millis(100);

struct QueuedAction(Action);

impl PartialEq for QueuedAction {
    fn eq(&self, other: &Self) -> bool {
        self.0.sort_key() == other.0.sort_key()
    }
}

impl Eq for QueuedAction {}

impl PartialOrd for QueuedAction {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedAction {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.sort_key().cmp(&other.0.sort_key())
    }
}

struct QueueInner {
    pending: Mutex<BinaryHeap<Reverse<QueuedAction>>>,
    notify: Notify,
    running: AtomicBool,
    paused: AtomicBool,
    stopping: AtomicBool,
    dispatching: AtomicBool,
}

/// Sequential action queue.
///
/// Worker lifecycle: STOPPED -> RUNNING -> (PAUSED <-> RUNNING) -> STOPPED.
/// Pause is cooperative: it only gates pulling new work, never preempts an
/// in-flight dispatch.
pub struct ActionQueue {
    inner: Arc<QueueInner>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ActionQueue {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(QueueInner {
                pending: Mutex::new(BinaryHeap::new()),
                notify: Notify::new(),
                running: AtomicBool::new(false),
                paused: AtomicBool::new(false),
                stopping: AtomicBool::new(false),
                dispatching: AtomicBool::new(false),
            }),
            worker: Mutex::new(None),
        }
    }

    /// Insert an action. Callable from any thread, including while the
    /// worker is dispatching another action.
    pub fn enqueue(&self, action: Action) {
        if let Ok(mut pending) = self.inner.pending.lock() {
            pending.push(Reverse(QueuedAction(action)));
        }
        self.inner.notify.notify_one();
    }

    /// Spawn the worker. Idempotent: at most one worker is ever active.
    /// Crate-internal: the coordinator is the composition point that owns
    /// the shared engine state.
    pub(crate) fn start(&self, state: Arc<EngineState>) {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.stopping.store(false, Ordering::SeqCst);
        self.inner.paused.store(false, Ordering::SeqCst);

        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(worker_loop(inner, state));
        if let Ok(mut worker) = self.worker.lock() {
            *worker = Some(handle);
        }
    }

    /// Stop pulling new work. The action currently being dispatched, if
    /// any, runs to completion.
    pub fn pause(&self) {
        self.inner.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.inner.paused.store(false, Ordering::SeqCst);
        self.inner.notify.notify_one();
    }

    /// Drain all not-yet-dequeued entries. No effect on the action
    /// currently being dispatched.
    pub fn clear(&self) {
        if let Ok(mut pending) = self.inner.pending.lock() {
            pending.clear();
        }
    }

    /// Signal the worker to exit after finishing its current iteration.
    pub fn stop(&self) {
        self.inner.stopping.store(true, Ordering::SeqCst);
        self.inner.notify.notify_one();
    }

    /// Await worker exit, bounded. A worker that does not exit in time is
    /// a reportable condition, not a silent one.
    pub async fn join(&self, timeout: Duration) -> Result<(), QueueError> {
        let handle = match self.worker.lock() {
            Ok(mut worker) => worker.take(),
            Err(_) => None,
        };
        let Some(handle) = handle else {
            return Ok(());
        };

        match tokio::time::timeout(timeout, handle).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(join_err)) => Err(QueueError::WorkerFailed(join_err.to_string())),
            Err(_) => Err(QueueError::ShutdownTimeout(timeout.as_secs())),
        }
    }

    pub fn state(&self) -> QueueState {
        if !self.inner.running.load(Ordering::SeqCst) {
            QueueState::Stopped
        } else if self.inner.paused.load(Ordering::SeqCst) {
            QueueState::Paused
        } else {
            QueueState::Running
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    pub fn is_paused(&self) -> bool {
        self.inner.paused.load(Ordering::SeqCst)
    }

    pub fn pending_len(&self) -> usize {
        self.inner
            .pending
            .lock()
            .map(|pending| pending.len())
            .unwrap_or(0)
    }

    /// Wait until no work is pending or in flight. Returns false on timeout.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.pending_len() == 0 && !self.inner.dispatching.load(Ordering::SeqCst) {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

impl Default for ActionQueue {
    fn default() -> Self {
        Self::new()
    }
}

async fn worker_loop(inner: Arc<QueueInner>, state: Arc<EngineState>) {
    info!("Action queue worker started");

    loop {
        if inner.stopping.load(Ordering::SeqCst) {
            break;
        }
        if inner.paused.load(Ordering::SeqCst) {
            let _ = tokio::time::timeout(PULL_WAIT, inner.notify.notified()).await;
            continue;
        }

        // Mark dispatching before the pull so an observer never sees the
        // queue empty while an entry is in hand but not yet in flight.
        inner.dispatching.store(true, Ordering::SeqCst);

        // A poisoned lock counts as an empty pull; the loop never exits
        // because of a single bad iteration.
        let next = match inner.pending.lock() {
            Ok(mut pending) => pending.pop(),
            Err(e) => {
                error!(error = %e, "Pending queue lock poisoned");
                None
            }
        };

        let Some(Reverse(QueuedAction(action))) = next else {
            inner.dispatching.store(false, Ordering::SeqCst);
            let _ = tokio::time::timeout(PULL_WAIT, inner.notify.notified()).await;
            continue;
        };

        process_one(&state, action).await;
        inner.dispatching.store(false, Ordering::SeqCst);
    }

    inner.running.store(false, Ordering::SeqCst);
    info!("Action queue worker stopped");
}

/// Policy-gate and dispatch one dequeued action.
async fn process_one(state: &EngineState, mut action: Action) {
    match state.policy.evaluate(&action) {
        Verdict::Deny => {
            warn!(id = %action.id, command = %action.command, "Blocked action");
            journal_denied(state, &mut action, "denied by policy");
        }
        Verdict::Ask => {
            let description = state
                .registry
                .get(action.kind)
                .map(|backend| backend.describe(&action.command, &action.args))
                .unwrap_or_else(|| format!("{} {}", action.kind, action.command));

            let approved = match tokio::time::timeout(
                state.prompt_timeout,
                state.prompt.confirm(&action, &description),
            )
            .await
            {
                Ok(answer) => answer,
                Err(_) => {
                    warn!(id = %action.id, "Permission prompt timed out");
                    false
                }
            };

            if approved {
                dispatch(state, &mut action, true).await;
            } else {
                info!(id = %action.id, "Action denied by operator");
                journal_denied(state, &mut action, "denied by operator");
            }
        }
        Verdict::Allow => {
            dispatch(state, &mut action, true).await;
        }
    }
}

/// Denial is an explicit, observable journal state, not an absent row.
fn journal_denied(state: &EngineState, action: &mut Action, note: &str) {
    action.error = Some(note.to_string());
    if let Err(e) = state.journal.record(&action.journal_entry(Disposition::Denied)) {
        error!(id = %action.id, error = %e, "Failed to journal denial");
    }
}
