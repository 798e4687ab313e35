//! Pipeline coordinator - main harvest orchestration logic
//!
//! This module contains the run loop that coordinates:
//! - Seeding the scheduler from config and any saved frontier
//! - Dispatching bounded-concurrency fetch tasks
//! - Parsing bodies, filtering discovered links and re-enqueueing them
//! - Emitting records to the sink and collecting per-target failures
//! - Cancellation, shutdown grace and state checkpointing

use crate::config::{validate, Config};
use crate::crawler::dedup::Deduplicator;
use crate::crawler::fetcher::{FetchError, FetchResult, Fetcher};
use crate::crawler::parser::{parse, ExtractionSchema};
use crate::crawler::scheduler::{Dispatch, ScheduledFetch, Scheduler, WorkItem};
use crate::output::{
    AbandonedTarget, ChannelSink, FailureKind, RecordSink, RecordStream, RunSummary,
    TargetFailure,
};
use crate::storage::{open_store, RunStatus, StateStore};
use crate::url::{host_key, normalize_url};
use crate::HarvestError;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinSet};
use url::Url;

/// Pause used when slots are held but no fetch of this run is in flight
const IDLE_TICK: Duration = Duration::from_millis(50);

/// Summary-level pipeline outcome
///
/// Never produced for a single target; only for a run as a whole.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("queue exhausted with {failed} failed targets ({records} records extracted)")]
    QueueExhaustedWithFailures {
        failed: usize,
        records: usize,
        summary: Box<RunSummary>,
    },
}

impl PipelineError {
    /// Turns a summary with failures into an error, keeping the summary
    pub fn check(summary: RunSummary) -> Result<RunSummary, PipelineError> {
        if summary.has_failures() {
            return Err(PipelineError::QueueExhaustedWithFailures {
                failed: summary.failures.len(),
                records: summary.records,
                summary: Box::new(summary),
            });
        }
        Ok(summary)
    }
}

/// Requests cancellation of a running pipeline
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Main pipeline coordinator structure
pub struct Coordinator {
    config: Config,
    schema: ExtractionSchema,
    fetcher: Arc<Fetcher>,
    dedup: Arc<Deduplicator>,
    scheduler: Scheduler,
    store: Option<Box<dyn StateStore + Send>>,
    run_id: Option<i64>,
    config_hash: String,
    cancel_tx: Arc<watch::Sender<bool>>,
    summary: RunSummary,
}

impl Coordinator {
    /// Creates a coordinator and seeds its queue
    ///
    /// Misconfiguration (empty schema, bad seeds, bad selectors) fails here,
    /// before anything is fetched. With a state path configured, the persisted
    /// seen set is loaded and an interrupted run's frontier is re-queued;
    /// `fresh` discards both first.
    pub fn new(config: Config, fresh: bool) -> Result<Self, HarvestError> {
        let store = match &config.output.state_path {
            Some(path) => Some(Box::new(open_store(Path::new(path))?) as Box<dyn StateStore + Send>),
            None => None,
        };
        Self::with_store(config, store, fresh)
    }

    /// Creates a coordinator over an already opened state store
    pub fn with_store(
        config: Config,
        mut store: Option<Box<dyn StateStore + Send>>,
        fresh: bool,
    ) -> Result<Self, HarvestError> {
        validate(&config)?;

        let schema = ExtractionSchema::from_config(&config.extraction)?;
        let fetcher = Fetcher::new(&config.crawler, &config.user_agent)?;

        let (seen, frontier) = match store.as_mut() {
            Some(store) => {
                if fresh {
                    tracing::info!("Fresh run requested, clearing saved state");
                    store.clear()?;
                }
                (store.load_seen()?, store.load_frontier()?)
            }
            None => (Vec::new(), Vec::new()),
        };

        if !seen.is_empty() {
            tracing::info!("Loaded {} previously seen targets", seen.len());
        }

        let (cancel_tx, _) = watch::channel(false);
        let mut coordinator = Self {
            scheduler: Scheduler::new(config.crawler.clone()),
            dedup: Arc::new(Deduplicator::from_targets(seen)),
            fetcher: Arc::new(fetcher),
            schema,
            store,
            run_id: None,
            config_hash: String::new(),
            cancel_tx: Arc::new(cancel_tx),
            summary: RunSummary::new(),
            config,
        };

        if !frontier.is_empty() {
            tracing::info!("Resuming {} targets from saved frontier", frontier.len());
        }
        // Saved frontier items are already in the seen set
        for item in frontier {
            coordinator.enqueue_or_abandon(item);
        }

        for seed in coordinator.config.seeds.clone() {
            let target = normalize_url(&seed)?.to_string();
            if coordinator.dedup.should_process(&target) {
                coordinator.enqueue_or_abandon(WorkItem::seed(target));
            } else {
                tracing::debug!("Seed {} already seen, skipping", target);
                coordinator.summary.duplicates += 1;
            }
        }

        Ok(coordinator)
    }

    /// Sets the config hash recorded with the run
    pub fn set_config_hash(&mut self, hash: impl Into<String>) {
        self.config_hash = hash.into();
    }

    /// Returns a handle that stops dispatch and starts the shutdown grace period
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            tx: Arc::clone(&self.cancel_tx),
        }
    }

    /// Number of targets queued before the run starts
    pub fn pending(&self) -> usize {
        self.scheduler.len()
    }

    /// Runs the pipeline to completion, emitting records into `sink`
    ///
    /// Per-target failures are collected in the returned summary. Errors are
    /// returned only for run-level problems: state storage or the sink itself
    /// failing.
    pub async fn run<S: RecordSink + ?Sized>(mut self, sink: &mut S) -> Result<RunSummary, HarvestError> {
        let started = Instant::now();

        if let Some(store) = self.store.as_mut() {
            if let Some(previous) = store.latest_run()? {
                if !self.config_hash.is_empty() && previous.config_hash != self.config_hash {
                    tracing::warn!(
                        "Configuration changed since run {} (was {}), saved state still applies",
                        previous.id,
                        previous.config_hash
                    );
                }
            }
            self.run_id = Some(store.create_run(&self.config_hash)?);
        }

        tracing::info!(
            "Starting harvest: {} targets queued, max {} in flight ({} per host)",
            self.scheduler.len(),
            self.config.crawler.max_concurrency,
            self.config.crawler.max_per_host_concurrency
        );

        let leftover = match self.drive(sink).await {
            Ok(leftover) => leftover,
            Err(e) => {
                tracing::error!("Harvest aborted: {}", e);
                self.record_aborted_run();
                return Err(e);
            }
        };

        self.summary.elapsed = started.elapsed();
        sink.flush()?;
        self.checkpoint(leftover)?;

        tracing::info!(
            "Harvest finished: {} records, {} failures, {} abandoned in {:.1}s",
            self.summary.records,
            self.summary.failures.len(),
            self.summary.abandoned.len(),
            self.summary.elapsed.as_secs_f64()
        );

        Ok(self.summary)
    }

    /// Runs the pipeline in a background task, yielding records lazily
    ///
    /// At most `max-concurrency` records are buffered; beyond that no new
    /// fetch is dispatched until the reader catches up.
    pub fn stream(self) -> RecordStream {
        let (tx, rx) = mpsc::channel(self.config.crawler.max_concurrency.max(1));
        let handle = tokio::spawn(async move {
            let mut sink = ChannelSink::new(tx);
            self.run(&mut sink).await
        });
        RecordStream::new(rx, handle)
    }

    /// The dispatch/complete loop
    ///
    /// Returns the items that were in flight and never completed, so they can
    /// be re-queued on resume.
    async fn drive<S: RecordSink + ?Sized>(&mut self, sink: &mut S) -> Result<Vec<WorkItem>, HarvestError> {
        let mut cancel_rx = self.cancel_tx.subscribe();
        let mut tasks: JoinSet<(WorkItem, FetchResult)> = JoinSet::new();
        let mut in_flight: HashMap<String, WorkItem> = HashMap::new();

        loop {
            if *cancel_rx.borrow_and_update() {
                self.summary.cancelled = true;
                break;
            }

            // Nothing is dispatched or accepted while the sink is behind
            let cancelled = tokio::select! {
                ready = sink.ready() => {
                    ready?;
                    false
                }
                _ = cancel_rx.changed() => true,
            };
            if cancelled {
                continue;
            }

            let mut wait = None;
            loop {
                match self.scheduler.poll_dispatch(Instant::now()) {
                    Dispatch::Ready(scheduled) => self.spawn_fetch(&mut tasks, &mut in_flight, scheduled),
                    Dispatch::Wait(delay) => {
                        wait = Some(delay);
                        break;
                    }
                    Dispatch::Saturated | Dispatch::Empty => break,
                }
            }

            if tasks.is_empty() && wait.is_none() {
                if self.scheduler.is_empty() {
                    tracing::info!("Queue empty and no fetches in flight");
                    break;
                }
                wait = Some(IDLE_TICK);
            }

            tokio::select! {
                _ = cancel_rx.changed() => {}
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    self.handle_joined(joined, &mut in_flight, sink)?;
                }
                _ = tokio::time::sleep(wait.unwrap_or_default()), if wait.is_some() => {}
            }
        }

        if self.summary.cancelled && !tasks.is_empty() {
            let grace = self.config.crawler.shutdown_grace();
            tracing::info!(
                "Cancellation requested, waiting up to {:?} for {} in-flight fetches",
                grace,
                tasks.len()
            );

            let deadline = tokio::time::Instant::now() + grace;
            loop {
                let next = tokio::time::timeout_at(deadline, async {
                    sink.ready().await?;
                    Ok::<_, HarvestError>(tasks.join_next().await)
                })
                .await;

                match next {
                    Ok(Ok(Some(joined))) => self.handle_joined(joined, &mut in_flight, sink)?,
                    Ok(Ok(None)) => break,
                    Ok(Err(e)) => return Err(e),
                    Err(_) => {
                        tracing::warn!(
                            "Shutdown grace elapsed, abandoning {} in-flight fetches",
                            tasks.len()
                        );
                        tasks.abort_all();
                        break;
                    }
                }
            }
        }

        Ok(in_flight.into_values().collect())
    }

    fn spawn_fetch(
        &mut self,
        tasks: &mut JoinSet<(WorkItem, FetchResult)>,
        in_flight: &mut HashMap<String, WorkItem>,
        scheduled: ScheduledFetch,
    ) {
        let ScheduledFetch { item, host, permits } = scheduled;
        tracing::debug!(
            "Dispatching {} (depth {}, host {})",
            item.target,
            item.depth,
            host
        );

        self.summary.dispatched += 1;
        in_flight.insert(item.target.clone(), item.clone());

        let fetcher = Arc::clone(&self.fetcher);
        tasks.spawn(async move {
            let result = fetcher.fetch(&item.target).await;
            drop(permits);
            (item, result)
        });
    }

    fn handle_joined<S: RecordSink + ?Sized>(
        &mut self,
        joined: Result<(WorkItem, FetchResult), JoinError>,
        in_flight: &mut HashMap<String, WorkItem>,
        sink: &mut S,
    ) -> Result<(), HarvestError> {
        match joined {
            Ok((item, result)) => {
                in_flight.remove(&item.target);
                self.complete(item, result, sink)
            }
            // The item stays in `in_flight` and is reported when the run ends
            Err(e) if e.is_panic() => {
                tracing::error!("Fetch task panicked: {}", e);
                Ok(())
            }
            Err(_) => Ok(()),
        }
    }

    /// Parse, discover and emit for one finished fetch
    fn complete<S: RecordSink + ?Sized>(
        &mut self,
        mut item: WorkItem,
        result: FetchResult,
        sink: &mut S,
    ) -> Result<(), HarvestError> {
        self.summary.completed += 1;
        item.record_retries(result.retries);

        let body = match result.outcome {
            Ok(body) => body,
            Err(error) => {
                if is_rate_limited(&error) {
                    self.cool_down(&item.target, result.retry_after);
                }
                tracing::warn!(
                    "Fetch failed for {} after {} retries: {}",
                    item.target,
                    item.retry_count,
                    error
                );
                self.record_failure(&item, FailureKind::from(&error), error.to_string());
                return Ok(());
            }
        };

        let source = match Url::parse(&item.target) {
            Ok(url) => url,
            Err(e) => {
                self.record_failure(&item, FailureKind::InvalidTarget, e.to_string());
                return Ok(());
            }
        };

        let record = match parse(&body, &source, &self.schema) {
            Ok(record) => record,
            Err(error) => {
                tracing::warn!("Failed to parse {}: {}", item.target, error);
                self.record_failure(&item, FailureKind::from(&error), error.to_string());
                return Ok(());
            }
        };

        for link in &record.links {
            self.discover(link, item.depth + 1);
        }

        tracing::debug!(
            "Extracted {} ({} links, {:?} status, {:?})",
            item.target,
            record.links.len(),
            result.status,
            result.elapsed
        );

        sink.accept(record)?;
        self.summary.records += 1;
        Ok(())
    }

    /// Filters a discovered link and queues it
    fn discover(&mut self, link: &str, depth: u32) {
        if depth > self.config.crawler.max_depth {
            tracing::debug!("Skipping {}: depth {} exceeds limit", link, depth);
            self.summary.beyond_depth += 1;
            return;
        }

        if !self.dedup.should_process(link) {
            self.summary.duplicates += 1;
            return;
        }

        if self.enqueue_or_abandon(WorkItem::discovered(link, depth)) {
            self.summary.discovered += 1;
        }
    }

    fn enqueue_or_abandon(&mut self, item: WorkItem) -> bool {
        let target = item.target.clone();
        let depth = item.depth;

        match self.scheduler.enqueue(item) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Dropping {}: {}", target, e);
                self.summary.abandoned.push(AbandonedTarget {
                    target,
                    depth,
                    reason: e.to_string(),
                });
                false
            }
        }
    }

    /// Pauses a rate-limiting host for the longer of its Retry-After and the backoff limit
    fn cool_down(&mut self, target: &str, retry_after: Option<Duration>) {
        let Some(host) = Url::parse(target).ok().as_ref().and_then(host_key) else {
            return;
        };
        let cooldown = Duration::from_millis(self.config.crawler.backoff_max_ms)
            .max(retry_after.unwrap_or_default());
        tracing::info!("Host {} is rate limiting, pausing it for {:?}", host, cooldown);
        self.scheduler.mark_rate_limited(&host, cooldown, Instant::now());
    }

    fn record_failure(&mut self, item: &WorkItem, kind: FailureKind, message: String) {
        self.summary.failures.push(TargetFailure {
            target: item.target.clone(),
            kind,
            message,
            depth: item.depth,
            retries: item.retry_count,
        });
    }

    /// Accounts for unfinished work and persists state
    fn checkpoint(&mut self, leftover: Vec<WorkItem>) -> Result<(), HarvestError> {
        let mut unfinished = Vec::new();

        for item in leftover {
            if self.summary.cancelled {
                tracing::info!("Abandoning in-flight {} (cancelled)", item.target);
                self.summary.abandoned.push(AbandonedTarget {
                    target: item.target.clone(),
                    depth: item.depth,
                    reason: "in flight at cancellation".to_string(),
                });
                unfinished.push(item);
            } else {
                self.record_failure(&item, FailureKind::TaskFailed, "fetch task did not complete".to_string());
            }
        }

        let pending = self.scheduler.drain();
        if !pending.is_empty() {
            tracing::info!("Abandoning {} queued targets (cancelled)", pending.len());
        }
        for item in &pending {
            self.summary.abandoned.push(AbandonedTarget {
                target: item.target.clone(),
                depth: item.depth,
                reason: "cancelled before dispatch".to_string(),
            });
        }
        unfinished.extend(pending);
        unfinished.sort_by_key(|item| item.depth);

        let Some(store) = self.store.as_mut() else {
            return Ok(());
        };

        store.add_seen(&self.dedup.snapshot(), self.run_id)?;
        if unfinished.is_empty() {
            store.clear_frontier()?;
        } else {
            tracing::info!("Saving {} unfinished targets for resume", unfinished.len());
            store.save_frontier(&unfinished)?;
        }

        if let Some(run_id) = self.run_id {
            let status = if self.summary.cancelled {
                RunStatus::Interrupted
            } else if self.summary.has_failures() {
                RunStatus::CompletedWithFailures
            } else {
                RunStatus::Completed
            };
            store.finish_run(
                run_id,
                status,
                self.summary.records,
                self.summary.failures.len(),
            )?;
        }

        Ok(())
    }

    fn record_aborted_run(&mut self) {
        if let (Some(store), Some(run_id)) = (self.store.as_mut(), self.run_id) {
            if let Err(e) = store.finish_run(
                run_id,
                RunStatus::Failed,
                self.summary.records,
                self.summary.failures.len(),
            ) {
                tracing::warn!("Failed to record aborted run {}: {}", run_id, e);
            }
        }
    }
}

/// True when the last response was a 429
fn is_rate_limited(error: &FetchError) -> bool {
    match error {
        FetchError::HttpError(429) => true,
        FetchError::TooManyRetries { last, .. } => is_rate_limited(last),
        _ => false,
    }
}
