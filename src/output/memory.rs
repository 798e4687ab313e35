use crate::crawler::ExtractedRecord;
use crate::output::traits::{OutputResult, RecordSink};

/// Collects records in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Vec<ExtractedRecord>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[ExtractedRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<ExtractedRecord> {
        self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl RecordSink for MemorySink {
    fn accept(&mut self, record: ExtractedRecord) -> OutputResult<()> {
        self.records.push(record);
        Ok(())
    }
}
