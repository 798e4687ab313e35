//! Crawler module for the crawl-and-extract pipeline
//!
//! This module contains the core pipeline logic, including:
//! - HTTP fetching with retry and backoff
//! - Schema-driven extraction and link discovery
//! - Seen-set deduplication
//! - Breadth-first scheduling with concurrency and politeness limits
//! - Overall run coordination

mod backoff;
mod coordinator;
mod dedup;
mod fetcher;
mod parser;
mod scheduler;

pub use backoff::RetryPolicy;
pub use coordinator::{CancelHandle, Coordinator, PipelineError};
pub use dedup::Deduplicator;
pub use fetcher::{build_http_client, FetchError, FetchResult, Fetcher};
pub use parser::{parse, ExtractedRecord, ExtractionSchema, FieldMap, FieldValue, ParseError};
pub use scheduler::{Dispatch, DispatchPermits, ScheduledFetch, Scheduler, WorkItem};

use crate::config::Config;
use crate::output::{RecordSink, RunSummary};
use crate::HarvestError;

/// Runs a complete harvest
///
/// This is the main entry point for a run. It will:
/// 1. Validate the configuration and compile the extraction schema
/// 2. Load persisted state, if a state path is configured
/// 3. Fetch and parse pages breadth-first from the seeds
/// 4. Emit every extracted record into `sink`
/// 5. Return the run summary, including per-target failures
pub async fn harvest<S: RecordSink + ?Sized>(
    config: Config,
    sink: &mut S,
) -> Result<RunSummary, HarvestError> {
    Coordinator::new(config, false)?.run(sink).await
}
