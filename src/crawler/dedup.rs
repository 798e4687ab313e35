//! Seen-set tracking for target identifiers
//!
//! The check-and-mark step is a single `HashSet::insert` under one lock, so
//! concurrent callers racing on the same target get exactly one `true`.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Thread-safe set of targets already dispatched or completed in a run
///
/// The set only grows. Share it behind an `Arc` between tasks.
#[derive(Debug, Default)]
pub struct Deduplicator {
    seen: Mutex<HashSet<String>>,
}

impl Deduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from a persisted seen set
    pub fn from_targets<I>(targets: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        Self {
            seen: Mutex::new(targets.into_iter().collect()),
        }
    }

    /// Atomically checks and marks a target
    ///
    /// Returns true only for the first call with a given target.
    pub fn should_process(&self, target: &str) -> bool {
        let mut seen = self.lock();
        if seen.contains(target) {
            return false;
        }
        seen.insert(target.to_string())
    }

    /// Marks a target without asking whether it was new
    pub fn mark_seen(&self, target: &str) {
        self.lock().insert(target.to_string());
    }

    pub fn contains(&self, target: &str) -> bool {
        self.lock().contains(target)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Copies the current set, sorted, for persistence
    pub fn snapshot(&self) -> Vec<String> {
        let mut targets: Vec<String> = self.lock().iter().cloned().collect();
        targets.sort();
        targets
    }

    // A panic while holding the lock cannot leave the set half-updated.
    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        self.seen.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
