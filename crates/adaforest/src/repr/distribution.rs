//! Class distributions over an evolving class vocabulary.
//!
//! Batches may introduce class values a tree has never seen, so count vectors
//! from different moments are aligned by class *name*, never by position.
//! Everything here is a pure function of its inputs.

use serde::Serialize;

/// Result of [`merge_vocabulary`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VocabularyMerge {
    /// `old` in its order, followed by values first seen in `new`.
    pub merged: Vec<String>,
    /// How many values of `new` were not in `old`.
    pub num_new: usize,
}

/// Union of two vocabularies, keeping the order of `old`.
pub fn merge_vocabulary<S: AsRef<str>>(old: &[String], new: &[S]) -> VocabularyMerge {
    let mut merged = old.to_vec();
    let mut num_new = 0;
    for value in new {
        let value = value.as_ref();
        if !merged.iter().any(|v| v == value) {
            merged.push(value.to_string());
            num_new += 1;
        }
    }
    VocabularyMerge { merged, num_new }
}

/// Align two count vectors on `merged` and sum them.
///
/// Values absent from a source contribute 0. Values of a source that are not
/// in `merged` are dropped, so callers pass a superset vocabulary.
pub fn merge_counts(
    merged: &[String],
    old_vocab: &[String],
    old_counts: &[u32],
    new_vocab: &[String],
    new_counts: &[u32],
) -> Vec<u32> {
    debug_assert_eq!(old_vocab.len(), old_counts.len());
    debug_assert_eq!(new_vocab.len(), new_counts.len());
    merged
        .iter()
        .map(|value| lookup(value, old_vocab, old_counts) + lookup(value, new_vocab, new_counts))
        .collect()
}

#[inline]
fn lookup(value: &str, vocab: &[String], counts: &[u32]) -> u32 {
    vocab
        .iter()
        .position(|v| v == value)
        .and_then(|i| counts.get(i).copied())
        .unwrap_or(0)
}

/// Majority class position and its share of the total.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Majority {
    pub index: usize,
    pub confidence: f64,
}

/// Argmax of `counts` (lowest index on ties) and `max / total`.
///
/// Returns `None` when the total is zero: an empty distribution has no
/// majority.
pub fn majority_and_confidence(counts: &[u32]) -> Option<Majority> {
    let total: u64 = counts.iter().map(|&c| u64::from(c)).sum();
    if total == 0 {
        return None;
    }
    let mut index = 0;
    for (i, &c) in counts.iter().enumerate() {
        if c > counts[index] {
            index = i;
        }
    }
    Some(Majority {
        index,
        confidence: f64::from(counts[index]) / total as f64,
    })
}

/// Everything a merge of two distributions produces.
#[derive(Debug, Clone, PartialEq)]
pub struct DistributionSummary {
    pub vocabulary: Vec<String>,
    pub counts: Vec<u32>,
    pub majority: Option<String>,
    /// 0 when the merged distribution is empty.
    pub confidence: f64,
    pub num_new: usize,
}

/// Merge vocabularies and counts in one step.
pub fn merge_distributions(
    old_vocab: &[String],
    old_counts: &[u32],
    new_vocab: &[String],
    new_counts: &[u32],
) -> DistributionSummary {
    let VocabularyMerge { merged, num_new } = merge_vocabulary(old_vocab, new_vocab);
    let counts = merge_counts(&merged, old_vocab, old_counts, new_vocab, new_counts);
    let majority = majority_and_confidence(&counts);
    DistributionSummary {
        majority: majority.map(|m| merged[m.index].clone()),
        confidence: majority.map_or(0.0, |m| m.confidence),
        vocabulary: merged,
        counts,
        num_new,
    }
}

/// Class counts aligned with a class vocabulary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClassDistribution {
    values: Vec<String>,
    counts: Vec<u32>,
}

impl ClassDistribution {
    pub fn new(values: Vec<String>, counts: Vec<u32>) -> Self {
        debug_assert_eq!(values.len(), counts.len());
        Self { values, counts }
    }

    #[inline]
    pub fn values(&self) -> &[String] {
        &self.values
    }

    #[inline]
    pub fn counts(&self) -> &[u32] {
        &self.counts
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().map(|&c| u64::from(c)).sum()
    }

    pub fn count_of(&self, value: &str) -> u32 {
        lookup(value, &self.values, &self.counts)
    }

    #[inline]
    pub fn majority(&self) -> Option<Majority> {
        majority_and_confidence(&self.counts)
    }

    pub fn majority_class(&self) -> Option<&str> {
        self.majority().map(|m| self.values[m.index].as_str())
    }

    /// `max / total`, 0 for an empty distribution.
    pub fn confidence(&self) -> f64 {
        self.majority().map_or(0.0, |m| m.confidence)
    }

    /// Shannon entropy in bits.
    pub fn entropy(&self) -> f64 {
        let total = self.total() as f64;
        if total == 0.0 {
            return 0.0;
        }
        self.counts
            .iter()
            .filter(|&&c| c > 0)
            .map(|&c| {
                let p = f64::from(c) / total;
                -p * p.log2()
            })
            .sum()
    }

    /// Number of classes with a non-zero count.
    pub fn n_present(&self) -> usize {
        self.counts.iter().filter(|&&c| c > 0).count()
    }

    /// This distribution plus `other`, laid out over `vocabulary`.
    pub fn merged(&self, vocabulary: &[String], other_values: &[String], other_counts: &[u32]) -> Self {
        let counts = merge_counts(vocabulary, &self.values, &self.counts, other_values, other_counts);
        Self::new(vocabulary.to_vec(), counts)
    }
}
