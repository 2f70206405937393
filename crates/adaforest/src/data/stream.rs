//! Record stream contract consumed by batch ingestion.

use std::sync::Arc;

use super::{DataError, Record, Schema};

/// A restartable source of records sharing one header.
pub trait RecordStream {
    /// Schema of every record the stream yields.
    fn header(&self) -> &Arc<Schema>;

    fn has_more(&self) -> bool;

    /// Next record, or `None` once the stream is exhausted.
    fn next_record(&mut self) -> Option<Result<Record, DataError>>;

    /// Rewind to the first record.
    fn restart(&mut self);
}

/// In-memory stream over already typed records.
#[derive(Debug, Clone)]
pub struct MemoryStream {
    schema: Arc<Schema>,
    records: Vec<Record>,
    cursor: usize,
}

impl MemoryStream {
    pub fn new(schema: Arc<Schema>, records: Vec<Record>) -> Self {
        Self {
            schema,
            records,
            cursor: 0,
        }
    }
}

impl RecordStream for MemoryStream {
    fn header(&self) -> &Arc<Schema> {
        &self.schema
    }

    fn has_more(&self) -> bool {
        self.cursor < self.records.len()
    }

    fn next_record(&mut self) -> Option<Result<Record, DataError>> {
        let record = self.records.get(self.cursor)?.clone();
        self.cursor += 1;
        Some(Ok(record))
    }

    fn restart(&mut self) {
        self.cursor = 0;
    }
}
