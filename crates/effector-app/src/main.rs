//! Effector application binary - composition root.
//!
//! Ties the Effector crates together into a single executable:
//! 1. Load configuration from TOML
//! 2. Open the SQLite journal database
//! 3. Build the backend registry (memory, file, browser)
//! 4. Start the coordinator and its queue worker
//! 5. Run the requested CLI operation and shut down

mod cli;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use effector_core::config::EffectorConfig;
use effector_core::error::{EffectorError, Result};
use effector_engine::{
    normalize_path, ActionArgs, ActionKind, ActionLevel, BackendRegistry, BrowserBackend,
    Coordinator, FileBackend, MemoryBackend, StdinPrompt,
};
use effector_storage::{Database, Journal, MemoryStore};

use cli::{CliArgs, Command};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();
    let config = EffectorConfig::load_or_default(&args.resolve_config_path());

    let log_level = args.resolve_log_level(&config.general.log_level);
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(args, config).await {
        error!("{}", e);
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(args: CliArgs, config: EffectorConfig) -> Result<()> {
    let data_dir = normalize_path(&args.resolve_data_dir(&config.general.data_dir));
    let db_path = config
        .coordinator
        .resolve_storage_path(&data_dir.to_string_lossy());

    let db = Arc::new(Database::new(&db_path)?);
    let journal = Journal::new(Arc::clone(&db));

    let mut registry = BackendRegistry::new();
    registry.register(Arc::new(MemoryBackend::new(MemoryStore::new(Arc::clone(
        &db,
    )))));
    registry.register(Arc::new(
        FileBackend::new(&config.coordinator.sandbox_root)
            .map_err(|e| EffectorError::Backend(e.to_string()))?,
    ));
    registry.register(Arc::new(BrowserBackend::new(browser_script_path(
        &data_dir,
    ))));

    let coordinator = Coordinator::new(
        &config.coordinator,
        journal.clone(),
        registry,
        Arc::new(StdinPrompt),
    );
    coordinator.start();

    let outcome = dispatch_command(&coordinator, &journal, &config, args.command).await;

    if let Err(e) = coordinator.shutdown(SHUTDOWN_TIMEOUT).await {
        error!("{}", e);
    }
    outcome
}

async fn dispatch_command(
    coordinator: &Coordinator,
    journal: &Journal,
    config: &EffectorConfig,
    command: Command,
) -> Result<()> {
    match command {
        Command::Execute {
            kind,
            command,
            args,
            level,
            priority,
        } => {
            let kind: ActionKind = kind
                .parse()
                .map_err(EffectorError::Backend)?;
            let level: ActionLevel = level
                .parse()
                .map_err(EffectorError::Policy)?;
            let args: ActionArgs = serde_json::from_str(&args)?;

            let id = coordinator
                .submit(kind, command, args, level, priority)
                .map_err(EffectorError::from)?;

            // Submission is fire-and-forget; for a one-shot CLI run we wait
            // for the queue to drain so the outcome can be printed.
            let wait = Duration::from_secs(config.coordinator.permission_prompt_timeout_secs + 30);
            if coordinator.queue().wait_idle(wait).await {
                match coordinator.journal_entry(&id)? {
                    Some(entry) => print_json(&entry)?,
                    None => println!("Submitted: {}", id),
                }
            } else {
                println!("Submitted (still pending): {}", id);
            }
        }
        Command::Status => {
            let status = coordinator.status()?;
            print_json(&status)?;
        }
        Command::Undo => match coordinator.undo_last().await {
            Some(outcome) => print_json(&outcome)?,
            None => println!("Nothing to undo."),
        },
        Command::Redo => match coordinator.redo_last().await {
            Some(outcome) => print_json(&outcome)?,
            None => println!("Nothing to redo."),
        },
        Command::Grant { path, minutes } => {
            let grant = coordinator.grant(&path, minutes)?;
            println!(
                "Granted access to {} for {} minutes.",
                grant.path.display(),
                minutes
            );
        }
        Command::Journal { limit } => {
            let entries = journal.recent(limit)?;
            print_json(&entries)?;
        }
    }
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Browser CLI script location: EFFECTOR_BROWSER_SCRIPT env var, falling
/// back to `<data_dir>/browser/browser.js`.
fn browser_script_path(data_dir: &std::path::Path) -> PathBuf {
    if let Ok(script) = std::env::var("EFFECTOR_BROWSER_SCRIPT") {
        return PathBuf::from(script);
    }
    data_dir.join("browser").join("browser.js")
}
