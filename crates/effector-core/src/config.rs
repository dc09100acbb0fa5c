use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{EffectorError, Result};

/// Top-level configuration for the Effector application.
///
/// Loaded from `~/.effector/config.toml` by default. Each section corresponds
/// to a bounded context or cross-cutting concern.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EffectorConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub coordinator: CoordinatorConfig,
}

impl EffectorConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: EffectorConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| EffectorError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Data directory for the SQLite journal and the file sandbox.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.effector/data".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// How a file write outside the sandbox (with no live grant) is treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutOfSandboxLevel {
    /// Ask the operator for a yes/no decision.
    #[default]
    Ask,
    /// Reject without asking.
    Deny,
}

/// Action coordinator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Root directory file writes are confined to.
    pub sandbox_root: String,
    /// Path to the SQLite journal database. Empty means `<data_dir>/journal.db`.
    pub storage_path: String,
    /// Maximum undo history depth.
    pub undo_depth: usize,
    /// Seconds to wait for an interactive permission decision before denying.
    pub permission_prompt_timeout_secs: u64,
    /// Verdict for out-of-sandbox writes that no grant covers.
    pub out_of_sandbox_level: OutOfSandboxLevel,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            sandbox_root: "~/.effector/sandbox".to_string(),
            storage_path: String::new(),
            undo_depth: 10,
            permission_prompt_timeout_secs: 30,
            out_of_sandbox_level: OutOfSandboxLevel::Ask,
        }
    }
}

impl CoordinatorConfig {
    /// Resolve the journal database path, defaulting under `data_dir`.
    pub fn resolve_storage_path(&self, data_dir: &str) -> PathBuf {
        if self.storage_path.is_empty() {
            Path::new(data_dir).join("journal.db")
        } else {
            PathBuf::from(&self.storage_path)
        }
    }
}
