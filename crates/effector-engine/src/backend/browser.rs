//! Browser-automation action backend.
//!
//! Drives a browser daemon through its Node CLI wrapper as a subprocess.
//! Transport retry and timeout live here, not in the queue. Browser
//! actions are irreversible: no command returns a reverse operation.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::backend::{Backend, BackendOutcome};
use crate::error::BackendError;
use crate::types::{ActionArgs, ActionKind};

const MAX_RETRIES: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_secs(1);
const CALL_TIMEOUT_SECS: u64 = 30;

pub struct BrowserBackend {
    script: PathBuf,
}

impl BrowserBackend {
    /// Wrap the browser CLI script at the given path.
    pub fn new(script: PathBuf) -> Self {
        Self { script }
    }

    /// Build the subprocess argument list for a command, validating args.
    fn cli_args(&self, command: &str, args: &ActionArgs) -> Result<Vec<String>, BackendError> {
        let mut cli = vec![command.to_string()];
        match command {
            "navigate" => cli.push(require_str(args, "url")?.to_string()),
            "query" => {
                cli.push(require_str(args, "selector")?.to_string());
                cli.push(
                    args.get("mode")
                        .and_then(|v| v.as_str())
                        .unwrap_or("list")
                        .to_string(),
                );
            }
            "click" => {
                cli.push(require_str(args, "selector")?.to_string());
                cli.push(
                    args.get("index")
                        .and_then(|v| v.as_u64())
                        .unwrap_or(0)
                        .to_string(),
                );
            }
            "type" => {
                cli.push(require_str(args, "selector")?.to_string());
                cli.push(require_str(args, "text")?.to_string());
            }
            "screenshot" | "get_tabs" => {}
            _ => {
                return Err(BackendError::UnknownCommand {
                    kind: ActionKind::Browser,
                    command: command.to_string(),
                })
            }
        }
        Ok(cli)
    }

    async fn run_once(&self, cli: &[String]) -> Result<serde_json::Value, BackendError> {
        let output = tokio::time::timeout(
            Duration::from_secs(CALL_TIMEOUT_SECS),
            tokio::process::Command::new("node")
                .arg(&self.script)
                .args(cli)
                .output(),
        )
        .await
        .map_err(|_| BackendError::Timeout(CALL_TIMEOUT_SECS))??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BackendError::Execution(format!(
                "browser CLI exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        // The CLI speaks JSON; fall back to raw text for plain output.
        Ok(serde_json::from_str(&stdout)
            .unwrap_or_else(|_| serde_json::Value::String(stdout.trim().to_string())))
    }
}

#[async_trait]
impl Backend for BrowserBackend {
    fn kind(&self) -> ActionKind {
        ActionKind::Browser
    }

    fn available(&self) -> bool {
        self.script.exists()
    }

    async fn execute(
        &self,
        command: &str,
        args: &ActionArgs,
    ) -> Result<BackendOutcome, BackendError> {
        if !self.available() {
            return Err(BackendError::Unavailable(format!(
                "browser script not found: {}",
                self.script.display()
            )));
        }

        let cli = self.cli_args(command, args)?;

        let mut last_err = None;
        for attempt in 1..=MAX_RETRIES {
            match self.run_once(&cli).await {
                Ok(result) => {
                    debug!(command, attempt, "Browser command succeeded");
                    return Ok(BackendOutcome::new(result));
                }
                Err(e) => {
                    warn!(command, attempt, error = %e, "Browser command failed");
                    last_err = Some(e);
                    if attempt < MAX_RETRIES {
                        tokio::time::sleep(RETRY_DELAY).await;
                    }
                }
            }
        }

        Err(last_err.unwrap_or_else(|| {
            BackendError::Execution(format!("browser command failed: {}", command))
        }))
    }

    fn describe(&self, command: &str, args: &ActionArgs) -> String {
        match command {
            "navigate" => format!(
                "Navigate browser to: {}",
                args.get("url").and_then(|v| v.as_str()).unwrap_or("<no url>")
            ),
            "click" => format!(
                "Click element: {}",
                args.get("selector")
                    .and_then(|v| v.as_str())
                    .unwrap_or("<no selector>")
            ),
            "type" => format!(
                "Type into element: {}",
                args.get("selector")
                    .and_then(|v| v.as_str())
                    .unwrap_or("<no selector>")
            ),
            other => format!("browser {}", other),
        }
    }
}

fn require_str<'a>(args: &'a ActionArgs, key: &str) -> Result<&'a str, BackendError> {
    args.get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| BackendError::InvalidArgs(format!("missing '{}'", key)))
}
