//! State module for tracking per-host crawl progress
//!
//! `HostState` carries everything the scheduler needs to enforce per-host
//! limits: the in-flight slot semaphore, the politeness clock and any
//! rate-limit cooldown.

mod host_state;

pub use host_state::{HostState, Readiness};
