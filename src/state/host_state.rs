use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Whether a host can take another dispatch right now
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// A slot is free and the politeness delay has elapsed
    Ready,
    /// Every per-host slot is held by an in-flight fetch
    Busy,
    /// The host becomes eligible after this long
    WaitFor(Duration),
}

/// Tracks the state of a single host during crawling
#[derive(Debug, Clone)]
pub struct HostState {
    /// Per-host in-flight limit; a permit is held for the whole fetch
    slots: Arc<Semaphore>,

    /// When the last fetch against this host was dispatched
    pub last_dispatch: Option<Instant>,

    /// Host answered 429; nothing is dispatched before this instant
    pub blocked_until: Option<Instant>,

    /// Number of fetches dispatched to this host in the current run
    pub dispatch_count: u32,
}

impl HostState {
    /// Creates a host state allowing `max_in_flight` concurrent fetches
    pub fn new(max_in_flight: usize) -> Self {
        Self {
            slots: Arc::new(Semaphore::new(max_in_flight)),
            last_dispatch: None,
            blocked_until: None,
            dispatch_count: 0,
        }
    }

    /// Checks whether a fetch can be dispatched to this host
    ///
    /// Cooldown and politeness are reported as a wait so the caller can sleep
    /// precisely; a full slot set is reported as `Busy` because only a
    /// completing fetch can free it.
    pub fn readiness(&self, politeness_delay: Duration, now: Instant) -> Readiness {
        if let Some(until) = self.blocked_until {
            if until > now {
                return Readiness::WaitFor(until - now);
            }
        }

        if let Some(last) = self.last_dispatch {
            let elapsed = now.saturating_duration_since(last);
            if elapsed < politeness_delay {
                return Readiness::WaitFor(politeness_delay - elapsed);
            }
        }

        if self.slots.available_permits() == 0 {
            return Readiness::Busy;
        }

        Readiness::Ready
    }

    /// Takes a slot and starts the politeness clock
    ///
    /// Returns None when every slot is taken.
    pub fn try_dispatch(&mut self, now: Instant) -> Option<OwnedSemaphorePermit> {
        let permit = Arc::clone(&self.slots).try_acquire_owned().ok()?;
        self.last_dispatch = Some(now);
        self.dispatch_count += 1;
        Some(permit)
    }

    /// Blocks the host for `cooldown` after a rate-limit response
    pub fn mark_rate_limited(&mut self, now: Instant, cooldown: Duration) {
        let until = now + cooldown;
        self.blocked_until = Some(match self.blocked_until {
            Some(existing) if existing > until => existing,
            _ => until,
        });
    }

    /// Number of fetches currently holding a slot
    pub fn in_flight(&self, max_in_flight: usize) -> usize {
        max_in_flight.saturating_sub(self.slots.available_permits())
    }
}
