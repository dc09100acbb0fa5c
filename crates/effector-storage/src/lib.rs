//! Effector storage crate - SQLite persistence for the action journal.
//!
//! Provides a WAL-mode SQLite database with migrations, the durable action
//! journal (every attempted action's outcome plus temporary path grants),
//! and the memory store backing the memory backend.

pub mod db;
pub mod journal;
pub mod memory;
pub mod migrations;

pub use db::Database;
pub use journal::{Disposition, GrantRow, Journal, JournalEntry};
pub use memory::{MemoryRow, MemoryStore};
