//! Permission policy and temporary path grants.
//!
//! Maps an action's declared risk level plus the current grant set to an
//! allow/ask/deny verdict, and defines the operator prompt interface the
//! queue worker blocks on for `ask` verdicts.

use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use effector_core::config::OutOfSandboxLevel;
use effector_core::types::Timestamp;

use crate::types::{Action, ActionKind, ActionLevel, Grant, Verdict};

/// File commands that mutate the filesystem and are therefore subject to
/// the sandbox check.
const WRITE_COMMANDS: &[&str] = &["write", "create", "edit", "delete"];

/// Expand `~` and resolve to an absolute, lexically normalized path.
///
/// Normalization is lexical (`.` and `..` folded, no symlink resolution),
/// matching how grants and the sandbox root are compared.
pub fn normalize_path(raw: &str) -> PathBuf {
    let expanded = expand_home(raw);
    let absolute = if expanded.is_absolute() {
        expanded
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("/"))
            .join(expanded)
    };

    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::ParentDir => {
                normalized.pop();
            }
            Component::CurDir => {}
            other => normalized.push(other),
        }
    }
    normalized
}

fn expand_home(raw: &str) -> PathBuf {
    if raw == "~" || raw.starts_with("~/") {
        if let Ok(home) = std::env::var("HOME").or_else(|_| std::env::var("USERPROFILE")) {
            return Path::new(&home).join(raw.trim_start_matches("~/").trim_start_matches('~'));
        }
    }
    PathBuf::from(raw)
}

/// Mutex-guarded set of live path grants.
///
/// Read-mostly with rare writes, so a single mutex is enough. Expired
/// grants are simply treated as absent on each check; they are never
/// actively purged.
#[derive(Default)]
pub struct GrantSet {
    grants: Mutex<Vec<Grant>>,
}

impl GrantSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a grant. The path is normalized before storage.
    pub fn add(&self, path: &str, duration_secs: i64) -> Grant {
        let now = Timestamp::now();
        let grant = Grant {
            path: normalize_path(path),
            granted_at: now,
            expires_at: Timestamp(now.0 + duration_secs),
        };
        if let Ok(mut grants) = self.grants.lock() {
            grants.push(grant.clone());
        }
        grant
    }

    /// Does a live grant cover this (already normalized) path?
    pub fn covers(&self, path: &Path) -> bool {
        let now = Timestamp::now();
        match self.grants.lock() {
            Ok(grants) => grants
                .iter()
                .any(|g| g.is_live(now) && path.starts_with(&g.path)),
            Err(_) => false,
        }
    }

    /// Number of grants currently live.
    pub fn live_count(&self) -> usize {
        let now = Timestamp::now();
        match self.grants.lock() {
            Ok(grants) => grants.iter().filter(|g| g.is_live(now)).count(),
            Err(_) => 0,
        }
    }
}

/// The three-tier permission policy plus the sandbox check.
pub struct PermissionPolicy {
    sandbox_root: PathBuf,
    out_of_sandbox: OutOfSandboxLevel,
    grants: GrantSet,
}

impl PermissionPolicy {
    pub fn new(sandbox_root: &str, out_of_sandbox: OutOfSandboxLevel) -> Self {
        Self {
            sandbox_root: normalize_path(sandbox_root),
            out_of_sandbox,
            grants: GrantSet::new(),
        }
    }

    pub fn sandbox_root(&self) -> &Path {
        &self.sandbox_root
    }

    pub fn grants(&self) -> &GrantSet {
        &self.grants
    }

    /// Evaluate one action. Pure with respect to everything but the clock
    /// (grant expiry) and the grant set.
    ///
    /// Level decides first: forbidden never runs. File-writing actions then
    /// go through the sandbox check, which can allow an action that would
    /// otherwise ask (the sandbox or a live grant IS the permission), or
    /// escalate an out-of-sandbox write to ask/deny.
    pub fn evaluate(&self, action: &Action) -> Verdict {
        if action.level == ActionLevel::Forbidden {
            return Verdict::Deny;
        }

        if action.kind == ActionKind::File && WRITE_COMMANDS.contains(&action.command.as_str()) {
            if let Some(raw) = action.args.get("path").and_then(|v| v.as_str()) {
                let target = normalize_path(raw);
                if target.starts_with(&self.sandbox_root) {
                    return Verdict::Allow;
                }
                if self.grants.covers(&target) {
                    return Verdict::Allow;
                }
                return match self.out_of_sandbox {
                    OutOfSandboxLevel::Ask => Verdict::Ask,
                    OutOfSandboxLevel::Deny => Verdict::Deny,
                };
            }
            // No path arg: fall through to the level verdict; the backend
            // will reject the args and the failure lands in the journal.
        }

        match action.level {
            ActionLevel::Autonomous => Verdict::Allow,
            ActionLevel::Permission => Verdict::Ask,
            ActionLevel::Forbidden => Verdict::Deny,
        }
    }
}

// =============================================================================
// Operator prompt
// =============================================================================

/// Interactive yes/no decision for `ask` verdicts.
///
/// The queue worker invokes this and blocks on it, bounded by the
/// configured prompt timeout; a timeout resolves to deny for that action
/// instance without altering future evaluations.
#[async_trait]
pub trait PermissionPrompt: Send + Sync {
    async fn confirm(&self, action: &Action, description: &str) -> bool;
}

/// Prompt an operator on the controlling terminal.
///
/// A closed stdin (EOF) or read error resolves to deny.
pub struct StdinPrompt;

#[async_trait]
impl PermissionPrompt for StdinPrompt {
    async fn confirm(&self, action: &Action, description: &str) -> bool {
        let args_text = serde_json::to_string_pretty(&action.args)
            .unwrap_or_else(|_| "<unprintable>".to_string());
        let text = format!(
            "\nPermission requested:\n  Action: {}\n  Details: {}\nProceed? (y/n) ",
            description, args_text
        );

        tokio::task::spawn_blocking(move || {
            use std::io::{BufRead, Write};

            let mut stdout = std::io::stdout();
            if stdout.write_all(text.as_bytes()).is_err() || stdout.flush().is_err() {
                return false;
            }

            let mut line = String::new();
            match std::io::stdin().lock().read_line(&mut line) {
                Ok(0) => false, // EOF: operator uncontactable
                Ok(_) => matches!(line.trim().to_lowercase().as_str(), "y" | "yes"),
                Err(_) => false,
            }
        })
        .await
        .unwrap_or(false)
    }
}

/// Fixed-answer prompt for tests and headless deployments.
pub struct StaticPrompt {
    answer: bool,
    asked: AtomicUsize,
}

impl StaticPrompt {
    pub fn new(answer: bool) -> Self {
        Self {
            answer,
            asked: AtomicUsize::new(0),
        }
    }

    /// How many times a decision was requested.
    pub fn asked_count(&self) -> usize {
        self.asked.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PermissionPrompt for StaticPrompt {
    async fn confirm(&self, _action: &Action, _description: &str) -> bool {
        self.asked.fetch_add(1, Ordering::SeqCst);
        self.answer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ActionArgs;

    fn file_action(command: &str, path: &str, level: ActionLevel) -> Action {
        let mut args = ActionArgs::new();
        args.insert(
            "path".to_string(),
            serde_json::Value::String(path.to_string()),
        );
        Action::new(ActionKind::File, level, command, args, 5)
    }

    fn policy(root: &str) -> PermissionPolicy {
        PermissionPolicy::new(root, OutOfSandboxLevel::Ask)
    }

    // ---- normalize_path ----

    #[test]
    fn test_normalize_absolute_unchanged() {
        assert_eq!(normalize_path("/tmp/x"), PathBuf::from("/tmp/x"));
    }

    #[test]
    fn test_normalize_folds_dot_and_dotdot() {
        assert_eq!(normalize_path("/tmp/a/./b/../c"), PathBuf::from("/tmp/a/c"));
        assert_eq!(normalize_path("/tmp/../tmp/x"), PathBuf::from("/tmp/x"));
    }

    #[test]
    fn test_normalize_relative_becomes_absolute() {
        assert!(normalize_path("some/rel/path").is_absolute());
    }

    #[test]
    fn test_normalize_expands_home() {
        if std::env::var("HOME").is_ok() {
            let p = normalize_path("~/notes.txt");
            assert!(p.is_absolute());
            assert!(!p.to_string_lossy().contains('~'));
            assert!(p.ends_with("notes.txt"));
        }
    }

    // ---- level verdicts ----

    #[test]
    fn test_autonomous_allows() {
        let policy = policy("/sandbox");
        let action = Action::new(
            ActionKind::Memory,
            ActionLevel::Autonomous,
            "store",
            ActionArgs::new(),
            5,
        );
        assert_eq!(policy.evaluate(&action), Verdict::Allow);
    }

    #[test]
    fn test_permission_asks() {
        let policy = policy("/sandbox");
        let action = Action::new(
            ActionKind::Browser,
            ActionLevel::Permission,
            "navigate",
            ActionArgs::new(),
            5,
        );
        assert_eq!(policy.evaluate(&action), Verdict::Ask);
    }

    #[test]
    fn test_forbidden_denies_unconditionally() {
        let policy = policy("/sandbox");
        // Even a write inside the sandbox is denied at forbidden level.
        let action = file_action("write", "/sandbox/f.txt", ActionLevel::Forbidden);
        assert_eq!(policy.evaluate(&action), Verdict::Deny);

        let action = Action::new(
            ActionKind::Memory,
            ActionLevel::Forbidden,
            "store",
            ActionArgs::new(),
            5,
        );
        assert_eq!(policy.evaluate(&action), Verdict::Deny);
    }

    // ---- sandbox check ----

    #[test]
    fn test_write_inside_sandbox_allowed_even_at_permission_level() {
        let policy = policy("/sandbox");
        let action = file_action("write", "/sandbox/sub/f.txt", ActionLevel::Permission);
        assert_eq!(policy.evaluate(&action), Verdict::Allow);
    }

    #[test]
    fn test_write_outside_sandbox_asks_by_default() {
        let policy = policy("/sandbox");
        let action = file_action("write", "/elsewhere/f.txt", ActionLevel::Autonomous);
        assert_eq!(policy.evaluate(&action), Verdict::Ask);
    }

    #[test]
    fn test_write_outside_sandbox_denied_when_configured() {
        let policy = PermissionPolicy::new("/sandbox", OutOfSandboxLevel::Deny);
        let action = file_action("write", "/elsewhere/f.txt", ActionLevel::Permission);
        assert_eq!(policy.evaluate(&action), Verdict::Deny);
    }

    #[test]
    fn test_dotdot_escape_is_caught() {
        let policy = policy("/sandbox");
        let action = file_action("write", "/sandbox/../etc/passwd", ActionLevel::Autonomous);
        assert_eq!(policy.evaluate(&action), Verdict::Ask);
    }

    #[test]
    fn test_sibling_prefix_is_not_inside_sandbox() {
        // /sandbox-evil must not match /sandbox (component-wise, not string prefix).
        let policy = policy("/sandbox");
        let action = file_action("write", "/sandbox-evil/f.txt", ActionLevel::Autonomous);
        assert_eq!(policy.evaluate(&action), Verdict::Ask);
    }

    #[test]
    fn test_read_is_not_sandbox_checked() {
        let policy = policy("/sandbox");
        let action = file_action("read", "/elsewhere/f.txt", ActionLevel::Autonomous);
        assert_eq!(policy.evaluate(&action), Verdict::Allow);
    }

    #[test]
    fn test_delete_is_sandbox_checked() {
        let policy = policy("/sandbox");
        let action = file_action("delete", "/elsewhere/f.txt", ActionLevel::Autonomous);
        assert_eq!(policy.evaluate(&action), Verdict::Ask);
    }

    #[test]
    fn test_write_without_path_falls_back_to_level() {
        let policy = policy("/sandbox");
        let action = Action::new(
            ActionKind::File,
            ActionLevel::Autonomous,
            "write",
            ActionArgs::new(),
            5,
        );
        assert_eq!(policy.evaluate(&action), Verdict::Allow);
    }

    // ---- grants ----

    #[test]
    fn test_live_grant_allows_outside_write() {
        let policy = policy("/sandbox");
        policy.grants().add("/tmp/x", 3600);

        let action = file_action("write", "/tmp/x/deep/f.txt", ActionLevel::Permission);
        assert_eq!(policy.evaluate(&action), Verdict::Allow);
    }

    #[test]
    fn test_grant_does_not_cover_siblings() {
        let policy = policy("/sandbox");
        policy.grants().add("/tmp/x", 3600);

        let action = file_action("write", "/tmp/xy/f.txt", ActionLevel::Autonomous);
        assert_eq!(policy.evaluate(&action), Verdict::Ask);
    }

    #[test]
    fn test_expired_grant_is_absent() {
        let policy = policy("/sandbox");
        policy.grants().add("/tmp/x", 0);

        let action = file_action("write", "/tmp/x/f.txt", ActionLevel::Permission);
        assert_eq!(policy.evaluate(&action), Verdict::Ask);
        assert_eq!(policy.grants().live_count(), 0);
    }

    #[test]
    fn test_fresh_grant_after_expired_one() {
        let grants = GrantSet::new();
        grants.add("/tmp/x", 0);
        assert!(!grants.covers(Path::new("/tmp/x/f.txt")));

        // A fresh grant is a new entry with its own expiry, not a renewal.
        grants.add("/tmp/x", 3600);
        assert!(grants.covers(Path::new("/tmp/x/f.txt")));
        assert_eq!(grants.live_count(), 1);
    }

    #[test]
    fn test_grant_set_normalizes_paths() {
        let grants = GrantSet::new();
        grants.add("/tmp/a/../x", 3600);
        assert!(grants.covers(Path::new("/tmp/x/f.txt")));
    }

    // ---- prompts ----

    #[tokio::test]
    async fn test_static_prompt_counts_and_answers() {
        let prompt = StaticPrompt::new(true);
        let action = Action::new(
            ActionKind::File,
            ActionLevel::Permission,
            "write",
            ActionArgs::new(),
            5,
        );
        assert!(prompt.confirm(&action, "write file").await);
        assert!(prompt.confirm(&action, "write file").await);
        assert_eq!(prompt.asked_count(), 2);

        let deny = StaticPrompt::new(false);
        assert!(!deny.confirm(&action, "write file").await);
    }
}
