//! Output module for extracted records and run summaries
//!
//! This module handles:
//! - The `RecordSink` interface the pipeline emits into
//! - In-memory, JSON Lines and bounded channel-backed sinks
//! - Summaries of runs and persisted state

mod channel;
mod jsonl;
mod memory;
pub mod stats;
mod traits;

pub use channel::{ChannelSink, RecordStream};
pub use jsonl::JsonLinesSink;
pub use memory::MemorySink;
pub use stats::{print_state_stats, print_summary, write_summary};
pub use traits::{
    AbandonedTarget, FailureKind, OutputError, OutputResult, RecordSink, RunSummary, SinkReady,
    TargetFailure,
};
