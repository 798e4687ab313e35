//! Scheduler for the crawl frontier and dispatch limits
//!
//! This module handles:
//! - Breadth-first ordering of pending work (by depth, FIFO within a depth)
//! - Global concurrency limiting via a semaphore
//! - Per-host concurrency limits and politeness delays
//! - Host cooldowns after rate-limit responses

use crate::config::CrawlerConfig;
use crate::state::{HostState, Readiness};
use crate::url::host_key;
use crate::{UrlError, UrlResult};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use url::Url;

/// A unit of pending work
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    /// Normalized target identifier
    pub target: String,

    /// Link distance from the seeds
    pub depth: u32,

    /// Retries spent on this target so far
    pub retry_count: u32,
}

impl WorkItem {
    pub fn seed(target: impl Into<String>) -> Self {
        Self::discovered(target, 0)
    }

    pub fn discovered(target: impl Into<String>, depth: u32) -> Self {
        Self {
            target: target.into(),
            depth,
            retry_count: 0,
        }
    }

    /// Records retries reported by the fetcher
    pub fn record_retries(&mut self, retries: u32) {
        self.retry_count += retries;
    }
}

#[derive(Debug)]
struct QueuedItem {
    item: WorkItem,
    host: String,
}

/// Slots held for the duration of one fetch; released on drop
#[derive(Debug)]
pub struct DispatchPermits {
    _global: OwnedSemaphorePermit,
    _host: OwnedSemaphorePermit,
}

/// A work item cleared for fetching
#[derive(Debug)]
pub struct ScheduledFetch {
    pub item: WorkItem,
    pub host: String,
    pub permits: DispatchPermits,
}

/// Outcome of asking the scheduler for work
#[derive(Debug)]
pub enum Dispatch {
    /// An item is cleared for fetching
    Ready(ScheduledFetch),
    /// Nothing is eligible until this much time passes
    Wait(Duration),
    /// Every candidate is blocked on a slot; wait for a fetch to finish
    Saturated,
    /// The queue is empty
    Empty,
}

/// Scheduler manages the frontier queue and dispatch limits
///
/// Dispatch is breadth-first: only items at the shallowest pending depth are
/// candidates. Among those, the first (oldest) item whose host is ready wins.
pub struct Scheduler {
    /// Global semaphore for limiting concurrent fetches
    global: Arc<Semaphore>,

    /// Per-host politeness and slot tracking
    hosts: HashMap<String, HostState>,

    /// Pending items by depth, FIFO within each depth
    frontier: BTreeMap<u32, VecDeque<QueuedItem>>,

    /// Number of pending items across all depths
    pending: usize,

    config: CrawlerConfig,
}

impl Scheduler {
    pub fn new(config: CrawlerConfig) -> Self {
        Self {
            global: Arc::new(Semaphore::new(config.max_concurrency)),
            hosts: HashMap::new(),
            frontier: BTreeMap::new(),
            pending: 0,
            config,
        }
    }

    /// Adds an item to the back of its depth's queue
    ///
    /// Fails when the target has no host to schedule against.
    pub fn enqueue(&mut self, item: WorkItem) -> UrlResult<()> {
        let url = Url::parse(&item.target).map_err(|e| UrlError::Parse(format!("{}: {}", item.target, e)))?;
        let host = host_key(&url).ok_or(UrlError::MissingHost)?;

        self.frontier
            .entry(item.depth)
            .or_default()
            .push_back(QueuedItem { item, host });
        self.pending += 1;
        Ok(())
    }

    /// Removes the next item in breadth-first order, ignoring host limits
    pub fn dequeue(&mut self) -> Option<WorkItem> {
        let mut entry = self.frontier.first_entry()?;
        let queued = entry.get_mut().pop_front();
        if entry.get().is_empty() {
            entry.remove();
        }
        if queued.is_some() {
            self.pending -= 1;
        }
        queued.map(|q| q.item)
    }

    /// Tries to clear the next item for fetching
    ///
    /// Never blocks; the caller sleeps on `Wait` and waits for a completion on
    /// `Saturated`.
    pub fn poll_dispatch(&mut self, now: Instant) -> Dispatch {
        let Some(mut entry) = self.frontier.first_entry() else {
            return Dispatch::Empty;
        };

        if self.global.available_permits() == 0 {
            return Dispatch::Saturated;
        }

        let politeness = self.config.politeness_delay();
        let per_host = self.config.max_per_host_concurrency;
        let mut shortest_wait: Option<Duration> = None;
        let mut chosen = None;

        for (index, queued) in entry.get().iter().enumerate() {
            let host = self
                .hosts
                .entry(queued.host.clone())
                .or_insert_with(|| HostState::new(per_host));

            let readiness = host.readiness(politeness, now);
            tracing::trace!("Candidate {} on {}: {:?}", queued.item.target, queued.host, readiness);

            match readiness {
                Readiness::Ready => {
                    chosen = Some(index);
                    break;
                }
                Readiness::WaitFor(wait) => {
                    shortest_wait = Some(shortest_wait.map_or(wait, |w| w.min(wait)));
                }
                Readiness::Busy => {}
            }
        }

        let Some(index) = chosen else {
            return match shortest_wait {
                Some(wait) => Dispatch::Wait(wait),
                None => Dispatch::Saturated,
            };
        };

        let Ok(global) = Arc::clone(&self.global).try_acquire_owned() else {
            return Dispatch::Saturated;
        };

        let host_name = entry.get()[index].host.clone();
        let Some(host_permit) = self
            .hosts
            .get_mut(&host_name)
            .and_then(|host| host.try_dispatch(now))
        else {
            return Dispatch::Saturated;
        };

        let Some(queued) = entry.get_mut().remove(index) else {
            return Dispatch::Saturated;
        };
        if entry.get().is_empty() {
            entry.remove();
        }
        self.pending -= 1;

        Dispatch::Ready(ScheduledFetch {
            item: queued.item,
            host: queued.host,
            permits: DispatchPermits {
                _global: global,
                _host: host_permit,
            },
        })
    }

    /// Holds off a host after it answered 429
    pub fn mark_rate_limited(&mut self, host: &str, cooldown: Duration, now: Instant) {
        let per_host = self.config.max_per_host_concurrency;
        self.hosts
            .entry(host.to_string())
            .or_insert_with(|| HostState::new(per_host))
            .mark_rate_limited(now, cooldown);
    }

    /// Empties the queue, returning pending items in breadth-first order
    pub fn drain(&mut self) -> Vec<WorkItem> {
        let drained: Vec<WorkItem> = std::mem::take(&mut self.frontier)
            .into_values()
            .flatten()
            .map(|q| q.item)
            .collect();
        self.pending = 0;
        drained
    }

    /// Number of pending items
    pub fn len(&self) -> usize {
        self.pending
    }

    pub fn is_empty(&self) -> bool {
        self.pending == 0
    }

    /// Number of fetches currently holding a global slot
    pub fn in_flight(&self) -> usize {
        self.config
            .max_concurrency
            .saturating_sub(self.global.available_permits())
    }

    /// Dispatches so far per host
    pub fn dispatch_counts(&self) -> BTreeMap<String, u32> {
        self.hosts
            .iter()
            .map(|(host, state)| (host.clone(), state.dispatch_count))
            .collect()
    }
}
