//! Attribute schema of a batch.
//!
//! A [`Schema`] is resolved once when a batch header is read. Records are then
//! addressed by attribute position, and split nodes keep the position next to
//! the attribute name so traversal never looks names up.

use serde::{Deserialize, Serialize};

use super::DataError;

/// Value type of an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttributeKind {
    /// Real-valued attribute, split with ordered comparisons.
    Numeric,
    /// Nominal attribute, split with equality on a category.
    Categorical,
}

/// A named attribute with its kind and, for categorical attributes, the
/// declared domain (may be empty when the header did not declare one).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    name: String,
    kind: AttributeKind,
    domain: Vec<String>,
}

impl Attribute {
    pub fn numeric(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: AttributeKind::Numeric,
            domain: Vec::new(),
        }
    }

    pub fn categorical<S: Into<String>>(name: impl Into<String>, domain: impl IntoIterator<Item = S>) -> Self {
        Self {
            name: name.into(),
            kind: AttributeKind::Categorical,
            domain: domain.into_iter().map(Into::into).collect(),
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn kind(&self) -> AttributeKind {
        self.kind
    }

    #[inline]
    pub fn is_numeric(&self) -> bool {
        self.kind == AttributeKind::Numeric
    }

    /// Declared categories, in declaration order.
    #[inline]
    pub fn domain(&self) -> &[String] {
        &self.domain
    }

    /// Whether `value` is admissible for this attribute's declared domain.
    pub fn admits(&self, value: &str) -> bool {
        self.domain.is_empty() || self.domain.iter().any(|v| v == value)
    }
}

/// Ordered attributes of a batch plus the position of the class attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    relation: String,
    attributes: Vec<Attribute>,
    class_index: usize,
}

impl Schema {
    /// Create a schema. `class_index = None` selects the last attribute.
    pub fn new(
        relation: impl Into<String>,
        attributes: Vec<Attribute>,
        class_index: Option<usize>,
    ) -> Result<Self, DataError> {
        let n_attributes = attributes.len();
        let class_index = match class_index {
            Some(index) if index < n_attributes => index,
            Some(index) => return Err(DataError::ClassIndexOutOfRange { index, n_attributes }),
            None if n_attributes > 0 => n_attributes - 1,
            None => return Err(DataError::ClassIndexOutOfRange { index: 0, n_attributes }),
        };
        Ok(Self {
            relation: relation.into(),
            attributes,
            class_index,
        })
    }

    #[inline]
    pub fn relation(&self) -> &str {
        &self.relation
    }

    #[inline]
    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    #[inline]
    pub fn attribute(&self, index: usize) -> &Attribute {
        &self.attributes[index]
    }

    #[inline]
    pub fn n_attributes(&self) -> usize {
        self.attributes.len()
    }

    #[inline]
    pub fn class_index(&self) -> usize {
        self.class_index
    }

    pub fn class_attribute(&self) -> &Attribute {
        &self.attributes[self.class_index]
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.attributes.iter().position(|a| a.name == name)
    }

    /// Whether attribute `index` takes part in ordered comparisons.
    /// The class attribute never does, even when declared numeric.
    #[inline]
    pub fn is_numeric(&self, index: usize) -> bool {
        index != self.class_index && self.attributes[index].is_numeric()
    }

    /// Indices of all non-class attributes.
    pub fn feature_indices(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.attributes.len()).filter(move |&i| i != self.class_index)
    }

    /// Indices of numeric non-class attributes.
    pub fn numeric_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.feature_indices().filter(move |&i| self.attributes[i].is_numeric())
    }

    /// Union of two schemas over the same attributes: categorical domains are
    /// merged with `self`'s order first. Returns `None` if the attribute
    /// names, kinds or class position differ.
    pub fn union(&self, other: &Schema) -> Option<Schema> {
        if self.attributes.len() != other.attributes.len() || self.class_index != other.class_index {
            return None;
        }
        let mut attributes = Vec::with_capacity(self.attributes.len());
        for (a, b) in self.attributes.iter().zip(&other.attributes) {
            if a.name != b.name || a.kind != b.kind {
                return None;
            }
            let mut merged = a.clone();
            for value in &b.domain {
                if !merged.domain.contains(value) {
                    merged.domain.push(value.clone());
                }
            }
            attributes.push(merged);
        }
        Some(Schema {
            relation: self.relation.clone(),
            attributes,
            class_index: self.class_index,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weather() -> Schema {
        Schema::new(
            "weather",
            vec![
                Attribute::numeric("temperature"),
                Attribute::categorical("outlook", ["sunny", "rainy"]),
                Attribute::categorical("play", ["yes", "no"]),
            ],
            None,
        )
        .unwrap()
    }

    #[test]
    fn class_defaults_to_last_attribute() {
        let schema = weather();
        assert_eq!(schema.class_index(), 2);
        assert_eq!(schema.class_attribute().name(), "play");
        assert_eq!(schema.feature_indices().collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(schema.numeric_indices().collect::<Vec<_>>(), vec![0]);
    }

    #[test]
    fn class_index_out_of_range() {
        let err = Schema::new("r", vec![Attribute::numeric("a")], Some(3)).unwrap_err();
        assert!(matches!(err, DataError::ClassIndexOutOfRange { index: 3, n_attributes: 1 }));
    }

    #[test]
    fn union_appends_new_categories() {
        let a = weather();
        let b = Schema::new(
            "weather",
            vec![
                Attribute::numeric("temperature"),
                Attribute::categorical("outlook", ["overcast"]),
                Attribute::categorical("play", ["no", "maybe"]),
            ],
            None,
        )
        .unwrap();
        let merged = a.union(&b).unwrap();
        assert_eq!(merged.attribute(1).domain(), ["sunny", "rainy", "overcast"]);
        assert_eq!(merged.attribute(2).domain(), ["yes", "no", "maybe"]);

        let other = Schema::new("x", vec![Attribute::numeric("a")], None).unwrap();
        assert!(a.union(&other).is_none());
    }
}
