//! Per-batch statistics.

use std::sync::Arc;

use super::{DataError, Record, RecordStream, Schema, Value};

/// Snapshot of one ingested batch: its records plus the statistics the
/// repair machinery needs (numeric ranges, class vocabulary and counts).
#[derive(Debug, Clone)]
pub struct BatchStats {
    schema: Arc<Schema>,
    records: Vec<Record>,
    /// Per-attribute minimum; `+inf` for non-numeric or all-missing attributes.
    min: Vec<f64>,
    /// Per-attribute maximum; `-inf` for non-numeric or all-missing attributes.
    max: Vec<f64>,
    class_values: Vec<String>,
    class_counts: Vec<u32>,
}

impl BatchStats {
    /// Compute statistics over already typed records.
    ///
    /// # Errors
    ///
    /// [`DataError::SchemaMismatch`] if a record's arity differs from the
    /// schema, [`DataError::MalformedRecord`] if a record has no label.
    pub fn from_records(schema: Arc<Schema>, records: Vec<Record>) -> Result<Self, DataError> {
        let n_attributes = schema.n_attributes();
        let class_index = schema.class_index();
        let mut min = vec![f64::INFINITY; n_attributes];
        let mut max = vec![f64::NEG_INFINITY; n_attributes];
        let mut class_values: Vec<String> = Vec::new();
        let mut class_counts: Vec<u32> = Vec::new();

        for (row, record) in records.iter().enumerate() {
            if record.len() != n_attributes {
                return Err(DataError::SchemaMismatch {
                    row,
                    expected: n_attributes,
                    found: record.len(),
                });
            }
            for attribute in schema.numeric_indices() {
                if let Value::Numeric(v) = record.value(attribute) {
                    min[attribute] = min[attribute].min(*v);
                    max[attribute] = max[attribute].max(*v);
                }
            }
            let label = record.label(class_index).ok_or_else(|| DataError::MalformedRecord {
                row,
                attribute: schema.class_attribute().name().to_string(),
                value: record.value(class_index).to_string(),
            })?;
            match class_values.iter().position(|c| c == label) {
                Some(i) => class_counts[i] += 1,
                None => {
                    class_values.push(label.to_string());
                    class_counts.push(1);
                }
            }
        }

        Ok(Self {
            schema,
            records,
            min,
            max,
            class_values,
            class_counts,
        })
    }

    /// Parse raw text rows and compute statistics.
    pub fn from_rows<R, S>(schema: Arc<Schema>, rows: impl IntoIterator<Item = R>) -> Result<Self, DataError>
    where
        R: AsRef<[S]>,
        S: AsRef<str>,
    {
        let records = rows
            .into_iter()
            .enumerate()
            .map(|(row, fields)| Record::parse(&schema, fields.as_ref(), row))
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_records(schema, records)
    }

    /// Drain a stream from its start.
    pub fn from_stream(stream: &mut dyn RecordStream) -> Result<Self, DataError> {
        stream.restart();
        let schema = Arc::clone(stream.header());
        let mut records = Vec::new();
        while let Some(record) = stream.next_record() {
            records.push(record?);
        }
        Self::from_records(schema, records)
    }

    /// Consolidate several batches into one. Categorical domains of the
    /// schemas are unioned; batches with incompatible schemas are rejected.
    pub fn concat<'a>(batches: impl IntoIterator<Item = &'a BatchStats>) -> Result<Self, DataError> {
        let mut iter = batches.into_iter();
        let first = iter.next().ok_or(DataError::EmptyBatch)?;
        let mut schema = (*first.schema).clone();
        let mut records = first.records.clone();
        for batch in iter {
            schema = schema.union(&batch.schema).ok_or_else(|| DataError::InvalidHeader {
                line: 0,
                message: format!(
                    "cannot consolidate relation `{}` with `{}`",
                    schema.relation(),
                    batch.schema.relation()
                ),
            })?;
            records.extend(batch.records.iter().cloned());
        }
        Self::from_records(Arc::new(schema), records)
    }

    /// Records matching `predicate`, as a batch over the same schema.
    pub fn select(&self, predicate: impl Fn(&Record) -> bool) -> Self {
        let records: Vec<Record> = self.records.iter().filter(|r| predicate(r)).cloned().collect();
        // Records were validated when this batch was built.
        Self::from_records(Arc::clone(&self.schema), records)
            .unwrap_or_else(|_| Self::empty(Arc::clone(&self.schema)))
    }

    /// Records whose numeric `attribute` satisfies `predicate`. Records with a
    /// missing value are left out.
    pub fn partition(&self, attribute: usize, predicate: impl Fn(f64) -> bool) -> Self {
        self.select(|record| record.numeric(attribute).is_some_and(&predicate))
    }

    /// An empty batch over `schema`.
    pub fn empty(schema: Arc<Schema>) -> Self {
        let n = schema.n_attributes();
        Self {
            schema,
            records: Vec::new(),
            min: vec![f64::INFINITY; n],
            max: vec![f64::NEG_INFINITY; n],
            class_values: Vec::new(),
            class_counts: Vec::new(),
        }
    }

    #[inline]
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    #[inline]
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    #[inline]
    pub fn n_records(&self) -> usize {
        self.records.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[inline]
    pub fn min(&self) -> &[f64] {
        &self.min
    }

    #[inline]
    pub fn max(&self) -> &[f64] {
        &self.max
    }

    #[inline]
    pub fn class_values(&self) -> &[String] {
        &self.class_values
    }

    #[inline]
    pub fn class_counts(&self) -> &[u32] {
        &self.class_counts
    }

    #[inline]
    pub fn n_classes(&self) -> usize {
        self.class_values.len()
    }

    /// Label of `record` under this batch's class index.
    #[inline]
    pub fn label<'r>(&self, record: &'r Record) -> Option<&'r str> {
        record.label(self.schema.class_index())
    }

    /// Most frequent class; ties go to the value seen first.
    pub fn majority_class(&self) -> Option<&str> {
        let mut best: Option<(usize, u32)> = None;
        for (i, &count) in self.class_counts.iter().enumerate() {
            if best.map_or(true, |(_, c)| count > c) {
                best = Some((i, count));
            }
        }
        best.map(|(i, _)| self.class_values[i].as_str())
    }
}
