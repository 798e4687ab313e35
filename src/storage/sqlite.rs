//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the StateStore trait.

use crate::crawler::WorkItem;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{StateStore, StorageError, StorageResult};
use crate::storage::{RunRecord, RunStatus, StateStats};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;

const RUN_COLUMNS: &str = "id, started_at, finished_at, config_hash, status, records, failures";

/// SQLite state backend
pub struct SqliteStateStore {
    conn: Connection,
}

impl SqliteStateStore {
    /// Opens or creates the database at `path`
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    fn count(&self, table: &str) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                row.get(0)
            })?;
        Ok(count as u64)
    }
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        started_at: row.get(1)?,
        finished_at: row.get(2)?,
        config_hash: row.get(3)?,
        status: RunStatus::from_db_string(&row.get::<_, String>(4)?).unwrap_or(RunStatus::Running),
        records: row.get(5)?,
        failures: row.get(6)?,
    })
}

impl StateStore for SqliteStateStore {
    // ===== Seen Set =====

    fn load_seen(&self) -> StorageResult<Vec<String>> {
        let mut stmt = self.conn.prepare("SELECT target FROM seen ORDER BY target")?;
        let targets = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(targets)
    }

    fn add_seen(&mut self, targets: &[String], run_id: Option<i64>) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO seen (target, first_seen_run, first_seen_at) VALUES (?1, ?2, ?3)",
            )?;
            for target in targets {
                stmt.execute(params![target, run_id, now])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    // ===== Frontier =====

    fn load_frontier(&self) -> StorageResult<Vec<WorkItem>> {
        let mut stmt = self
            .conn
            .prepare("SELECT target, depth, retry_count FROM frontier ORDER BY depth, position")?;

        let items = stmt
            .query_map([], |row| {
                Ok(WorkItem {
                    target: row.get(0)?,
                    depth: row.get(1)?,
                    retry_count: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(items)
    }

    fn save_frontier(&mut self, items: &[WorkItem]) -> StorageResult<()> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM frontier", [])?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO frontier (position, target, depth, retry_count) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for (position, item) in items.iter().enumerate() {
                stmt.execute(params![
                    position as i64,
                    item.target,
                    item.depth,
                    item.retry_count
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn clear_frontier(&mut self) -> StorageResult<()> {
        self.conn.execute("DELETE FROM frontier", [])?;
        Ok(())
    }

    fn clear(&mut self) -> StorageResult<()> {
        self.conn
            .execute_batch("DELETE FROM frontier; DELETE FROM seen;")?;
        Ok(())
    }

    // ===== Run Management =====

    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO runs (started_at, config_hash, status) VALUES (?1, ?2, ?3)",
            params![now, config_hash, RunStatus::Running.to_db_string()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn finish_run(
        &mut self,
        run_id: i64,
        status: RunStatus,
        records: usize,
        failures: usize,
    ) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2, records = ?3, failures = ?4 WHERE id = ?5",
            params![
                status.to_db_string(),
                now,
                records as i64,
                failures as i64,
                run_id
            ],
        )?;

        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM runs WHERE id = ?1", RUN_COLUMNS),
                params![run_id],
                run_from_row,
            )
            .optional()?
            .ok_or(StorageError::RunNotFound(run_id))
    }

    fn latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let run = self
            .conn
            .query_row(
                &format!("SELECT {} FROM runs ORDER BY id DESC LIMIT 1", RUN_COLUMNS),
                [],
                run_from_row,
            )
            .optional()?;
        Ok(run)
    }

    // ===== Statistics =====

    fn stats(&self) -> StorageResult<StateStats> {
        Ok(StateStats {
            seen: self.count("seen")?,
            frontier: self.count("frontier")?,
            runs: self.count("runs")?,
            latest_run: self.latest_run()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn targets(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_seen_set_persists_and_ignores_duplicates() {
        let mut store = SqliteStateStore::new_in_memory().unwrap();
        let run_id = store.create_run("hash").unwrap();

        store
            .add_seen(&targets(&["https://a.test/2", "https://a.test/1"]), Some(run_id))
            .unwrap();
        store.add_seen(&targets(&["https://a.test/1"]), None).unwrap();

        assert_eq!(
            store.load_seen().unwrap(),
            targets(&["https://a.test/1", "https://a.test/2"])
        );
    }

    #[test]
    fn test_frontier_replaced_and_ordered() {
        let mut store = SqliteStateStore::new_in_memory().unwrap();

        store
            .save_frontier(&[WorkItem::discovered("https://a.test/old", 0)])
            .unwrap();
        store
            .save_frontier(&[
                WorkItem::discovered("https://a.test/deep", 2),
                WorkItem::discovered("https://a.test/x", 1),
                WorkItem::discovered("https://a.test/y", 1),
            ])
            .unwrap();

        let loaded: Vec<(String, u32)> = store
            .load_frontier()
            .unwrap()
            .into_iter()
            .map(|item| (item.target, item.depth))
            .collect();
        assert_eq!(
            loaded,
            vec![
                ("https://a.test/x".to_string(), 1),
                ("https://a.test/y".to_string(), 1),
                ("https://a.test/deep".to_string(), 2),
            ]
        );

        store.clear_frontier().unwrap();
        assert!(store.load_frontier().unwrap().is_empty());
    }

    #[test]
    fn test_run_lifecycle() {
        let mut store = SqliteStateStore::new_in_memory().unwrap();
        assert!(store.latest_run().unwrap().is_none());

        let run_id = store.create_run("abc").unwrap();
        let run = store.get_run(run_id).unwrap();
        assert_eq!(run.status, RunStatus::Running);
        assert!(run.finished_at.is_none());

        store
            .finish_run(run_id, RunStatus::CompletedWithFailures, 7, 2)
            .unwrap();
        let run = store.latest_run().unwrap().unwrap();
        assert_eq!(run.id, run_id);
        assert_eq!(run.status, RunStatus::CompletedWithFailures);
        assert_eq!(run.records, Some(7));
        assert_eq!(run.failures, Some(2));
        assert!(run.finished_at.is_some());

        assert!(matches!(
            store.finish_run(999, RunStatus::Completed, 0, 0),
            Err(StorageError::RunNotFound(999))
        ));
        assert!(matches!(store.get_run(999), Err(StorageError::RunNotFound(999))));
    }

    #[test]
    fn test_clear_keeps_runs() {
        let mut store = SqliteStateStore::new_in_memory().unwrap();
        store.create_run("abc").unwrap();
        store.add_seen(&targets(&["https://a.test/1"]), None).unwrap();
        store
            .save_frontier(&[WorkItem::seed("https://a.test/2")])
            .unwrap();

        store.clear().unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.seen, 0);
        assert_eq!(stats.frontier, 0);
        assert_eq!(stats.runs, 1);
        assert!(stats.latest_run.is_some());
    }

    #[test]
    fn test_reopen_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.db");

        {
            let mut store = SqliteStateStore::new(&path).unwrap();
            store.add_seen(&targets(&["https://a.test/1"]), None).unwrap();
        }

        let store = SqliteStateStore::new(&path).unwrap();
        assert_eq!(store.load_seen().unwrap(), targets(&["https://a.test/1"]));
    }
}
