//! Channel-backed sink and the lazy record stream built on it

use crate::crawler::ExtractedRecord;
use crate::output::traits::{OutputError, OutputResult, RecordSink, RunSummary, SinkReady};
use crate::HarvestError;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::mpsc::{OwnedPermit, Receiver, Sender};
use tokio::task::JoinHandle;

/// Forwards records into a bounded channel
///
/// `ready` reserves a slot and waits while the channel is full, which is what
/// holds the pipeline back when the reader falls behind.
#[derive(Debug)]
pub struct ChannelSink {
    tx: Sender<ExtractedRecord>,
    permit: Option<OwnedPermit<ExtractedRecord>>,
}

impl ChannelSink {
    pub fn new(tx: Sender<ExtractedRecord>) -> Self {
        Self { tx, permit: None }
    }
}

impl RecordSink for ChannelSink {
    fn accept(&mut self, record: ExtractedRecord) -> OutputResult<()> {
        match self.permit.take() {
            Some(permit) => {
                permit.send(record);
                Ok(())
            }
            None => self.tx.try_send(record).map_err(|e| match e {
                TrySendError::Full(_) => OutputError::Full,
                TrySendError::Closed(_) => OutputError::Closed,
            }),
        }
    }

    fn ready(&mut self) -> SinkReady<'_> {
        Box::pin(async move {
            if self.permit.is_none() {
                let permit = self
                    .tx
                    .clone()
                    .reserve_owned()
                    .await
                    .map_err(|_| OutputError::Closed)?;
                self.permit = Some(permit);
            }
            Ok(())
        })
    }
}

/// Records of a run in progress, yielded as they are extracted
///
/// The sequence is finite and cannot be restarted. The run only gets a few
/// records ahead of the reader; an unread stream stops dispatching new
/// fetches. Dropping the stream early makes the run fail with
/// `OutputError::Closed`.
pub struct RecordStream {
    rx: Receiver<ExtractedRecord>,
    handle: JoinHandle<Result<RunSummary, HarvestError>>,
}

impl RecordStream {
    pub(crate) fn new(
        rx: Receiver<ExtractedRecord>,
        handle: JoinHandle<Result<RunSummary, HarvestError>>,
    ) -> Self {
        Self { rx, handle }
    }

    /// Next record, or None once the run has finished
    pub async fn next(&mut self) -> Option<ExtractedRecord> {
        self.rx.recv().await
    }

    /// Drains any remaining records and returns the run's outcome
    pub async fn finish(mut self) -> Result<(Vec<ExtractedRecord>, RunSummary), HarvestError> {
        let mut rest = Vec::new();
        while let Some(record) = self.rx.recv().await {
            rest.push(record);
        }

        let summary = self.handle.await??;
        Ok((rest, summary))
    }
}
