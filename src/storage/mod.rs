//! Storage module for persisting harvest state
//!
//! This module handles all database operations, including:
//! - SQLite database initialization and schema management
//! - The persisted seen set that makes repeated runs idempotent
//! - Frontier snapshots for resuming interrupted runs
//! - Run tracking

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStateStore;
pub use traits::{StateStore, StorageError, StorageResult};

use std::path::Path;

/// Opens (or creates) a state database
pub fn open_store(path: &Path) -> StorageResult<SqliteStateStore> {
    SqliteStateStore::new(path)
}

/// Represents a harvest run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub status: RunStatus,
    pub records: Option<i64>,
    pub failures: Option<i64>,
}

/// Status of a harvest run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    CompletedWithFailures,
    Interrupted,
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::CompletedWithFailures => "completed_with_failures",
            Self::Interrupted => "interrupted",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "completed_with_failures" => Some(Self::CompletedWithFailures),
            "interrupted" => Some(Self::Interrupted),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Counts describing the persisted state
#[derive(Debug, Clone)]
pub struct StateStats {
    pub seen: u64,
    pub frontier: u64,
    pub runs: u64,
    pub latest_run: Option<RunRecord>,
}
