//! Core types and value objects for the action engine.
//!
//! Defines actions, risk levels, verdicts, grants, and their supporting
//! enumerations.

use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use effector_core::types::Timestamp;
use effector_storage::journal::{Disposition, JournalEntry};

// =============================================================================
// Enums
// =============================================================================

/// Backend categories an action can target. Closed set: dispatch goes
/// through a lookup table keyed by this enum, never by string comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Memory,
    Browser,
    File,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionKind::Memory => write!(f, "memory"),
            ActionKind::Browser => write!(f, "browser"),
            ActionKind::File => write!(f, "file"),
        }
    }
}

impl std::str::FromStr for ActionKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "memory" => Ok(ActionKind::Memory),
            "browser" => Ok(ActionKind::Browser),
            "file" => Ok(ActionKind::File),
            _ => Err(format!("Unknown action kind: {}", s)),
        }
    }
}

/// Risk tier governing whether an action runs automatically, requires
/// approval, or is blocked outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionLevel {
    /// Runs without asking.
    Autonomous,
    /// Requires an explicit operator decision before dispatch.
    Permission,
    /// Never dispatched.
    Forbidden,
}

impl fmt::Display for ActionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionLevel::Autonomous => write!(f, "autonomous"),
            ActionLevel::Permission => write!(f, "permission"),
            ActionLevel::Forbidden => write!(f, "forbidden"),
        }
    }
}

impl std::str::FromStr for ActionLevel {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "autonomous" => Ok(ActionLevel::Autonomous),
            "permission" => Ok(ActionLevel::Permission),
            "forbidden" => Ok(ActionLevel::Forbidden),
            _ => Err(format!("Unknown action level: {}", s)),
        }
    }
}

/// Permission policy decision for one action instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Allow,
    Ask,
    Deny,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Allow => write!(f, "allow"),
            Verdict::Ask => write!(f, "ask"),
            Verdict::Deny => write!(f, "deny"),
        }
    }
}

/// Queue worker lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueState {
    Stopped,
    Running,
    Paused,
}

// =============================================================================
// Domain Structs
// =============================================================================

/// Backend-opaque argument mapping.
pub type ActionArgs = serde_json::Map<String, serde_json::Value>;

/// How to undo an action: a backend command plus its args.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReverseOperation {
    pub command: String,
    #[serde(default)]
    pub args: ActionArgs,
}

static NEXT_SEQ: AtomicU64 = AtomicU64::new(0);

fn next_seq() -> u64 {
    NEXT_SEQ.fetch_add(1, Ordering::Relaxed)
}

/// One unit of requested work.
///
/// Immutable after creation except for the outcome fields (`completed`,
/// `result`, `error`), which only the dispatching worker sets, exactly once.
#[derive(Debug, Clone, Serialize)]
pub struct Action {
    pub id: String,
    pub kind: ActionKind,
    pub level: ActionLevel,
    pub command: String,
    pub args: ActionArgs,
    /// Set at submission (or by the backend on completion); absent means
    /// the action is irreversible.
    pub reverse_operation: Option<ReverseOperation>,
    /// Lower dequeues first.
    pub priority: i32,
    pub submitted_at_millis: i64,
    /// Process-local submission counter. Makes the queue order total even
    /// for submissions within the same millisecond.
    pub seq: u64,
    pub completed: bool,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
}

impl Action {
    /// Build a new action with a generated id.
    pub fn new(
        kind: ActionKind,
        level: ActionLevel,
        command: impl Into<String>,
        args: ActionArgs,
        priority: i32,
    ) -> Self {
        let submitted_at_millis = Timestamp::now_millis();
        let seq = next_seq();
        Self {
            id: format!("{}_{}_{}", kind, submitted_at_millis, seq),
            kind,
            level,
            command: command.into(),
            args,
            reverse_operation: None,
            priority,
            submitted_at_millis,
            seq,
            completed: false,
            result: None,
            error: None,
        }
    }

    /// Build an out-of-band action (undo/redo) with a caller-chosen id.
    pub fn synthesized(
        id: String,
        kind: ActionKind,
        level: ActionLevel,
        command: String,
        args: ActionArgs,
    ) -> Self {
        Self {
            id,
            kind,
            level,
            command,
            args,
            reverse_operation: None,
            priority: 0,
            submitted_at_millis: Timestamp::now_millis(),
            seq: next_seq(),
            completed: false,
            result: None,
            error: None,
        }
    }

    /// Queue ordering key: lowest priority first, then earliest submission.
    pub fn sort_key(&self) -> (i32, i64, u64) {
        (self.priority, self.submitted_at_millis, self.seq)
    }

    /// Render this action as a journal row with the given disposition.
    pub fn journal_entry(&self, disposition: Disposition) -> JournalEntry {
        JournalEntry {
            id: self.id.clone(),
            kind: self.kind.to_string(),
            command: self.command.clone(),
            args: serde_json::to_string(&self.args).unwrap_or_else(|_| "{}".to_string()),
            result: self.result.as_ref().map(|v| v.to_string()),
            error: self.error.clone(),
            disposition,
            completed_at: Timestamp::now(),
            reverse_operation: self
                .reverse_operation
                .as_ref()
                .and_then(|r| serde_json::to_string(r).ok()),
        }
    }
}

/// A temporary widening of the sandbox to an additional path.
///
/// Additive only. Expiry is checked on every permission check; a fresh
/// grant call creates a new grant with its own expiry, never renews one
/// in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grant {
    pub path: PathBuf,
    pub granted_at: Timestamp,
    pub expires_at: Timestamp,
}

impl Grant {
    pub fn is_live(&self, now: Timestamp) -> bool {
        now < self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ---- ActionKind ----

    #[test]
    fn test_action_kind_display_from_str_round_trip() {
        for kind in [ActionKind::Memory, ActionKind::Browser, ActionKind::File] {
            let parsed: ActionKind = kind.to_string().parse().unwrap();
            assert_eq!(kind, parsed);
        }
        assert!("invalid".parse::<ActionKind>().is_err());
        assert!("Memory".parse::<ActionKind>().is_err());
        assert!("".parse::<ActionKind>().is_err());
    }

    #[test]
    fn test_action_kind_serde_json_format() {
        assert_eq!(
            serde_json::to_string(&ActionKind::Browser).unwrap(),
            "\"browser\""
        );
        assert!(serde_json::from_str::<ActionKind>("\"bogus\"").is_err());
    }

    #[test]
    fn test_action_kind_as_map_key() {
        use std::collections::HashMap;
        let mut map = HashMap::new();
        map.insert(ActionKind::File, "sandboxed");
        map.insert(ActionKind::Memory, "open");
        assert_eq!(map.get(&ActionKind::File), Some(&"sandboxed"));
        assert_eq!(map.get(&ActionKind::Browser), None);
    }

    // ---- ActionLevel ----

    #[test]
    fn test_action_level_display_from_str_round_trip() {
        for level in [
            ActionLevel::Autonomous,
            ActionLevel::Permission,
            ActionLevel::Forbidden,
        ] {
            let parsed: ActionLevel = level.to_string().parse().unwrap();
            assert_eq!(level, parsed);
        }
        assert!("bogus".parse::<ActionLevel>().is_err());
    }

    #[test]
    fn test_action_level_from_str_error_message() {
        let err = "bogus".parse::<ActionLevel>().unwrap_err();
        assert_eq!(err, "Unknown action level: bogus");
    }

    // ---- Verdict / QueueState ----

    #[test]
    fn test_verdict_display() {
        assert_eq!(Verdict::Allow.to_string(), "allow");
        assert_eq!(Verdict::Ask.to_string(), "ask");
        assert_eq!(Verdict::Deny.to_string(), "deny");
    }

    #[test]
    fn test_queue_state_serde_format() {
        assert_eq!(
            serde_json::to_string(&QueueState::Paused).unwrap(),
            "\"paused\""
        );
    }

    // ---- Action ----

    fn args(pairs: &[(&str, &str)]) -> ActionArgs {
        let mut map = ActionArgs::new();
        for (k, v) in pairs {
            map.insert(k.to_string(), serde_json::Value::String(v.to_string()));
        }
        map
    }

    #[test]
    fn test_action_new_id_format() {
        let action = Action::new(
            ActionKind::Memory,
            ActionLevel::Autonomous,
            "store",
            args(&[("content", "hello")]),
            5,
        );
        let parts: Vec<&str> = action.id.splitn(3, '_').collect();
        assert_eq!(parts[0], "memory");
        assert!(parts[1].parse::<i64>().is_ok());
        assert!(parts[2].parse::<u64>().is_ok());
        assert!(!action.completed);
        assert!(action.result.is_none());
        assert!(action.error.is_none());
    }

    #[test]
    fn test_action_ids_unique_same_millisecond() {
        let ids: Vec<String> = (0..100)
            .map(|_| {
                Action::new(
                    ActionKind::File,
                    ActionLevel::Autonomous,
                    "write",
                    ActionArgs::new(),
                    5,
                )
                .id
            })
            .collect();
        let unique: std::collections::HashSet<&String> = ids.iter().collect();
        assert_eq!(unique.len(), ids.len());
    }

    #[test]
    fn test_sort_key_orders_priority_then_submission() {
        let mut a = Action::new(
            ActionKind::Memory,
            ActionLevel::Autonomous,
            "store",
            ActionArgs::new(),
            5,
        );
        let mut b = Action::new(
            ActionKind::Memory,
            ActionLevel::Autonomous,
            "store",
            ActionArgs::new(),
            1,
        );
        a.submitted_at_millis = 100;
        b.submitted_at_millis = 200;
        // Lower priority value wins despite later submission.
        assert!(b.sort_key() < a.sort_key());

        b.priority = 5;
        // Equal priority: earlier submission wins.
        assert!(a.sort_key() < b.sort_key());
    }

    #[test]
    fn test_journal_entry_serializes_fields() {
        let mut action = Action::new(
            ActionKind::File,
            ActionLevel::Permission,
            "write",
            args(&[("path", "/tmp/f")]),
            5,
        );
        action.completed = true;
        action.result = Some(serde_json::json!({"bytes": 5}));
        action.reverse_operation = Some(ReverseOperation {
            command: "delete".to_string(),
            args: args(&[("path", "/tmp/f")]),
        });

        let entry = action.journal_entry(Disposition::Completed);
        assert_eq!(entry.kind, "file");
        assert_eq!(entry.command, "write");
        assert!(entry.args.contains("/tmp/f"));
        assert!(entry.result.as_deref().unwrap().contains("bytes"));
        assert!(entry
            .reverse_operation
            .as_deref()
            .unwrap()
            .contains("delete"));
        assert_eq!(entry.disposition, Disposition::Completed);
    }

    #[test]
    fn test_reverse_operation_serde_round_trip() {
        let rev = ReverseOperation {
            command: "restore".to_string(),
            args: args(&[("path", "/tmp/f"), ("backup", "/tmp/f.bak")]),
        };
        let json = serde_json::to_string(&rev).unwrap();
        let rt: ReverseOperation = serde_json::from_str(&json).unwrap();
        assert_eq!(rev, rt);
    }

    #[test]
    fn test_reverse_operation_default_args() {
        let rt: ReverseOperation = serde_json::from_str(r#"{"command":"noop"}"#).unwrap();
        assert!(rt.args.is_empty());
    }

    // ---- Grant ----

    #[test]
    fn test_grant_liveness() {
        let now = Timestamp::now();
        let grant = Grant {
            path: PathBuf::from("/tmp/x"),
            granted_at: now,
            expires_at: Timestamp(now.0 + 60),
        };
        assert!(grant.is_live(now));
        assert!(!grant.is_live(Timestamp(now.0 + 60)));
        assert!(!grant.is_live(Timestamp(now.0 + 120)));
    }

    #[test]
    fn test_zero_duration_grant_never_live() {
        let now = Timestamp::now();
        let grant = Grant {
            path: PathBuf::from("/tmp/x"),
            granted_at: now,
            expires_at: now,
        };
        assert!(!grant.is_live(now));
    }
}
