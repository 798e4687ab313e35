//! Record sink trait and run summary types
//!
//! This module defines the trait interface for record sinks and the
//! summary a finished run reports.

use crate::crawler::{ExtractedRecord, FetchError, ParseError};
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while emitting records
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Record consumer went away")]
    Closed,

    #[error("Record consumer is behind; wait for ready() before accept()")]
    Full,
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Future returned by `RecordSink::ready`
pub type SinkReady<'a> = Pin<Box<dyn Future<Output = OutputResult<()>> + Send + 'a>>;

/// Consumer of extracted records
///
/// The pipeline only needs `accept`; where records end up (file, channel,
/// memory) is up to the implementation. Before each `accept` the pipeline
/// awaits `ready` and dispatches nothing new while it is pending, so a slow
/// consumer throttles fetching.
pub trait RecordSink {
    /// Takes ownership of one finished record
    fn accept(&mut self, record: ExtractedRecord) -> OutputResult<()>;

    /// Resolves once the sink can take one more record
    fn ready(&mut self) -> SinkReady<'_> {
        Box::pin(std::future::ready(Ok(())))
    }

    /// Flushes buffered output; called once when the run ends
    fn flush(&mut self) -> OutputResult<()> {
        Ok(())
    }
}

impl<S: RecordSink + ?Sized> RecordSink for Box<S> {
    fn accept(&mut self, record: ExtractedRecord) -> OutputResult<()> {
        (**self).accept(record)
    }

    fn ready(&mut self) -> SinkReady<'_> {
        (**self).ready()
    }

    fn flush(&mut self) -> OutputResult<()> {
        (**self).flush()
    }
}

/// Classification of a per-target failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FailureKind {
    Timeout,
    HttpError(u16),
    ConnectionError,
    TooManyRetries,
    InvalidTarget,
    InvalidMarkup,
    /// The fetch task panicked or was torn down unexpectedly
    TaskFailed,
}

impl From<&FetchError> for FailureKind {
    fn from(error: &FetchError) -> Self {
        match error {
            FetchError::Timeout => Self::Timeout,
            FetchError::HttpError(status) => Self::HttpError(*status),
            FetchError::ConnectionError(_) => Self::ConnectionError,
            FetchError::TooManyRetries { .. } => Self::TooManyRetries,
            FetchError::InvalidTarget(_) => Self::InvalidTarget,
        }
    }
}

impl From<&ParseError> for FailureKind {
    fn from(error: &ParseError) -> Self {
        match error {
            ParseError::InvalidMarkup(_) => Self::InvalidMarkup,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "timeout"),
            Self::HttpError(status) => write!(f, "http {}", status),
            Self::ConnectionError => write!(f, "connection error"),
            Self::TooManyRetries => write!(f, "too many retries"),
            Self::InvalidTarget => write!(f, "invalid target"),
            Self::InvalidMarkup => write!(f, "invalid markup"),
            Self::TaskFailed => write!(f, "task failed"),
        }
    }
}

/// A target that ended in failure
#[derive(Debug, Clone)]
pub struct TargetFailure {
    pub target: String,
    pub kind: FailureKind,
    pub message: String,
    pub depth: u32,
    pub retries: u32,
}

/// A target dropped without a fetch result
#[derive(Debug, Clone)]
pub struct AbandonedTarget {
    pub target: String,
    pub depth: u32,
    pub reason: String,
}

/// Summary of a finished (or cancelled) run
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    /// Records handed to the sink
    pub records: usize,

    /// Fetches started
    pub dispatched: usize,

    /// Fetches that produced a FetchResult
    pub completed: usize,

    /// Links accepted into the queue
    pub discovered: usize,

    /// Targets filtered by the seen set
    pub duplicates: usize,

    /// Links dropped for exceeding the depth limit
    pub beyond_depth: usize,

    pub failures: Vec<TargetFailure>,

    pub abandoned: Vec<AbandonedTarget>,

    /// Whether the run stopped on a cancellation signal
    pub cancelled: bool,

    pub elapsed: Duration,
}

impl RunSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    /// Number of failures per kind
    pub fn failure_counts(&self) -> BTreeMap<FailureKind, usize> {
        let mut counts = BTreeMap::new();
        for failure in &self.failures {
            *counts.entry(failure.kind).or_insert(0) += 1;
        }
        counts
    }

    /// Share of completed fetches that produced a record, as a percentage
    pub fn success_rate(&self) -> f64 {
        if self.completed == 0 {
            return 0.0;
        }
        (self.records as f64 / self.completed as f64) * 100.0
    }
}
