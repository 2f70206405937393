//! Shared error types for batch ingestion.

use std::io;

/// Errors that can occur when ingesting a batch.
#[derive(Debug, thiserror::Error)]
pub enum DataError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("malformed record at row {row}: attribute `{attribute}` cannot hold `{value}`")]
    MalformedRecord {
        row: usize,
        attribute: String,
        value: String,
    },

    #[error("schema mismatch at row {row}: expected {expected} fields, found {found}")]
    SchemaMismatch {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("invalid header at line {line}: {message}")]
    InvalidHeader { line: usize, message: String },

    #[error("class index {index} out of range for {n_attributes} attributes")]
    ClassIndexOutOfRange { index: usize, n_attributes: usize },

    #[error("batch has no records")]
    EmptyBatch,
}
