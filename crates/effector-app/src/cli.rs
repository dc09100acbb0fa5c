//! CLI argument definitions for the Effector application.
//!
//! Uses `clap` with derive macros for ergonomic argument parsing.
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Effector — an embodied action coordinator with sandboxing and undo.
#[derive(Parser, Debug)]
#[command(name = "effector", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Data directory for the SQLite journal and the file sandbox.
    #[arg(short = 'd', long = "data-dir")]
    pub data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level")]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Execute an action.
    Execute {
        /// Kind of action: memory, browser, or file.
        kind: String,
        /// Backend-specific command to execute.
        command: String,
        /// JSON arguments for the action.
        #[arg(long = "args", default_value = "{}")]
        args: String,
        /// Risk level: autonomous, permission, or forbidden.
        #[arg(long, default_value = "autonomous")]
        level: String,
        /// Queue priority; lower runs first.
        #[arg(long, default_value_t = effector_engine::DEFAULT_PRIORITY)]
        priority: i32,
    },
    /// Show coordinator status.
    Status,
    /// Undo the last reversible action.
    Undo,
    /// Re-apply the last undone action.
    Redo,
    /// Grant temporary write permission for a path outside the sandbox.
    Grant {
        /// Path to grant access to.
        path: String,
        /// Duration in minutes.
        #[arg(long, default_value_t = 60)]
        minutes: i64,
    },
    /// Show recent journal entries.
    Journal {
        /// Maximum entries to show.
        #[arg(long, default_value_t = 20)]
        limit: u64,
    },
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > EFFECTOR_CONFIG env var > ~/.effector/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("EFFECTOR_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Resolve the data directory.
    ///
    /// Priority: --data-dir flag > config file value.
    pub fn resolve_data_dir(&self, config_data_dir: &str) -> String {
        self.data_dir
            .as_ref()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|| config_data_dir.to_string())
    }

    /// Resolve the log level.
    ///
    /// Priority: --log-level flag > config file value.
    pub fn resolve_log_level(&self, config_log_level: &str) -> String {
        self.log_level
            .clone()
            .unwrap_or_else(|| config_log_level.to_string())
    }
}

/// Default config file path for the current platform.
fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".effector").join("config.toml");
    }
    #[cfg(not(target_os = "windows"))]
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".effector").join("config.toml");
    }
    PathBuf::from("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_execute() {
        let args = CliArgs::parse_from([
            "effector",
            "execute",
            "memory",
            "store",
            "--args",
            r#"{"content":"hi"}"#,
            "--level",
            "autonomous",
            "--priority",
            "3",
        ]);
        match args.command {
            Command::Execute {
                kind,
                command,
                args,
                level,
                priority,
            } => {
                assert_eq!(kind, "memory");
                assert_eq!(command, "store");
                assert_eq!(args, r#"{"content":"hi"}"#);
                assert_eq!(level, "autonomous");
                assert_eq!(priority, 3);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_execute_defaults() {
        let args = CliArgs::parse_from(["effector", "execute", "file", "read"]);
        match args.command {
            Command::Execute {
                args,
                level,
                priority,
                ..
            } => {
                assert_eq!(args, "{}");
                assert_eq!(level, "autonomous");
                assert_eq!(priority, 5);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_grant_with_minutes() {
        let args = CliArgs::parse_from(["effector", "grant", "/tmp/x", "--minutes", "15"]);
        match args.command {
            Command::Grant { path, minutes } => {
                assert_eq!(path, "/tmp/x");
                assert_eq!(minutes, 15);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_resolve_data_dir_flag_wins() {
        let args = CliArgs::parse_from(["effector", "--data-dir", "/override", "status"]);
        assert_eq!(args.resolve_data_dir("~/.effector/data"), "/override");

        let args = CliArgs::parse_from(["effector", "status"]);
        assert_eq!(args.resolve_data_dir("~/.effector/data"), "~/.effector/data");
    }

    #[test]
    fn test_resolve_log_level_flag_wins() {
        let args = CliArgs::parse_from(["effector", "--log-level", "debug", "status"]);
        assert_eq!(args.resolve_log_level("info"), "debug");

        let args = CliArgs::parse_from(["effector", "status"]);
        assert_eq!(args.resolve_log_level("info"), "info");
    }
}
