//! Storage traits and error types
//!
//! This module defines the trait interface for state backends and
//! associated error types.

use crate::crawler::WorkItem;
use crate::storage::{RunRecord, RunStatus, StateStats};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Persists the seen set and frontier snapshot between runs
///
/// A run that loads the seen set from a previous run never dispatches those
/// targets again. The frontier holds work an interrupted run left queued.
pub trait StateStore {
    // ===== Seen Set =====

    /// Loads every persisted target identifier
    fn load_seen(&self) -> StorageResult<Vec<String>>;

    /// Adds targets to the persisted seen set; existing entries are kept
    fn add_seen(&mut self, targets: &[String], run_id: Option<i64>) -> StorageResult<()>;

    // ===== Frontier =====

    /// Loads the saved frontier in breadth-first order
    fn load_frontier(&self) -> StorageResult<Vec<WorkItem>>;

    /// Replaces the saved frontier
    fn save_frontier(&mut self, items: &[WorkItem]) -> StorageResult<()>;

    fn clear_frontier(&mut self) -> StorageResult<()>;

    /// Forgets the seen set and frontier; run history is kept
    fn clear(&mut self) -> StorageResult<()>;

    // ===== Run Management =====

    /// Creates a new run and returns its ID
    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64>;

    /// Records the final status and counts of a run
    fn finish_run(
        &mut self,
        run_id: i64,
        status: RunStatus,
        records: usize,
        failures: usize,
    ) -> StorageResult<()>;

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord>;

    fn latest_run(&self) -> StorageResult<Option<RunRecord>>;

    // ===== Statistics =====

    fn stats(&self) -> StorageResult<StateStats>;
}
