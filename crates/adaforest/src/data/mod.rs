//! Batch ingestion: schema, typed records, record streams and per-batch
//! statistics.
//!
//! # Overview
//!
//! A batch arrives through a [`RecordStream`] (for files, [`ArffStream`]).
//! Its header is resolved into a [`Schema`] once; every row becomes a typed
//! [`Record`] whose values are addressed by attribute position.
//! [`BatchStats`] then computes what drift detection and repair consume:
//! numeric ranges, class vocabulary in first-seen order and class counts.
//!
//! # Missing Values
//!
//! Missing values (`?` in text) become [`Value::Missing`]. They are ignored by
//! range statistics and match no split condition when routed.

pub mod arff;
mod batch;
mod error;
mod record;
mod schema;
mod stream;

pub use arff::{write_arff, ArffStream};
pub use batch::BatchStats;
pub use error::DataError;
pub use record::{Record, Value, MISSING_TOKEN};
pub use schema::{Attribute, AttributeKind, Schema};
pub use stream::{MemoryStream, RecordStream};
