//! Typed records.

use std::fmt;
use std::sync::Arc;

use super::{DataError, Schema};

/// Token used for missing values in text formats.
pub const MISSING_TOKEN: &str = "?";

/// A single attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Numeric(f64),
    Nominal(String),
    Missing,
}

impl Value {
    #[inline]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Numeric(v) => Some(*v),
            _ => None,
        }
    }

    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Nominal(s) => Some(s),
            _ => None,
        }
    }

    #[inline]
    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Missing)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Numeric(v) => write!(f, "{}", v),
            Value::Nominal(s) => f.write_str(s),
            Value::Missing => f.write_str(MISSING_TOKEN),
        }
    }
}

/// One labeled row. Cloning is cheap: values are shared.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    values: Arc<[Value]>,
}

impl Record {
    pub fn new(values: Vec<Value>) -> Self {
        Self {
            values: values.into(),
        }
    }

    /// Parse raw text fields against `schema`. `row` is only used for errors.
    pub fn parse<S: AsRef<str>>(schema: &Schema, fields: &[S], row: usize) -> Result<Self, DataError> {
        if fields.len() != schema.n_attributes() {
            return Err(DataError::SchemaMismatch {
                row,
                expected: schema.n_attributes(),
                found: fields.len(),
            });
        }

        let mut values = Vec::with_capacity(fields.len());
        for (index, field) in fields.iter().enumerate() {
            let raw = unquote(field.as_ref().trim());
            let attribute = schema.attribute(index);
            let malformed = || DataError::MalformedRecord {
                row,
                attribute: attribute.name().to_string(),
                value: raw.to_string(),
            };

            let value = if raw == MISSING_TOKEN {
                Value::Missing
            } else if schema.is_numeric(index) {
                Value::Numeric(raw.parse::<f64>().map_err(|_| malformed())?)
            } else if attribute.admits(raw) {
                Value::Nominal(raw.to_string())
            } else {
                return Err(malformed());
            };
            values.push(value);
        }
        Ok(Self::new(values))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[inline]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    #[inline]
    pub fn value(&self, attribute: usize) -> &Value {
        &self.values[attribute]
    }

    #[inline]
    pub fn numeric(&self, attribute: usize) -> Option<f64> {
        self.values.get(attribute).and_then(Value::as_f64)
    }

    /// The record's label as text, whatever the class attribute's declared kind.
    pub fn label(&self, class_index: usize) -> Option<&str> {
        match self.values.get(class_index)? {
            Value::Nominal(s) => Some(s),
            _ => None,
        }
    }
}

/// Strip one level of matching single or double quotes.
pub(crate) fn unquote(s: &str) -> &str {
    let bytes = s.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if (first == b'\'' || first == b'"') && first == last {
            return &s[1..s.len() - 1];
        }
    }
    s
}
