//! Tree node types.

use std::fmt;

use crate::data::{Record, Value};

use super::{ClassDistribution, NodeId};

// =============================================================================
// Split conditions
// =============================================================================

/// Comparison operator of a split condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SplitOp {
    /// `value <= threshold`
    #[default]
    Le,
    /// `value < threshold`
    Lt,
    /// `value > threshold`
    Gt,
    /// `value >= threshold`
    Ge,
    /// categorical equality
    Eq,
}

impl SplitOp {
    pub fn as_str(self) -> &'static str {
        match self {
            SplitOp::Le => "<=",
            SplitOp::Lt => "<",
            SplitOp::Gt => ">",
            SplitOp::Ge => ">=",
            SplitOp::Eq => "=",
        }
    }

    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "<=" => Some(SplitOp::Le),
            "<" => Some(SplitOp::Lt),
            ">" => Some(SplitOp::Gt),
            ">=" => Some(SplitOp::Ge),
            "=" => Some(SplitOp::Eq),
            _ => None,
        }
    }

    #[inline]
    pub fn compare(self, value: f64, threshold: f64) -> bool {
        match self {
            SplitOp::Le => value <= threshold,
            SplitOp::Lt => value < threshold,
            SplitOp::Gt => value > threshold,
            SplitOp::Ge => value >= threshold,
            SplitOp::Eq => value == threshold,
        }
    }
}

impl fmt::Display for SplitOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Right-hand side of a split condition.
#[derive(Debug, Clone, PartialEq)]
pub enum Threshold {
    Numeric(f64),
    Category(String),
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Threshold::Numeric(v) => write!(f, "{}", v),
            Threshold::Category(c) => f.write_str(c),
        }
    }
}

/// Condition a record must satisfy to enter a node from its parent.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitCondition {
    pub op: SplitOp,
    pub threshold: Threshold,
}

impl SplitCondition {
    pub fn numeric(op: SplitOp, threshold: f64) -> Self {
        Self {
            op,
            threshold: Threshold::Numeric(threshold),
        }
    }

    pub fn category(value: impl Into<String>) -> Self {
        Self {
            op: SplitOp::Eq,
            threshold: Threshold::Category(value.into()),
        }
    }

    /// Whether `value` satisfies the condition. Missing values and values of
    /// the wrong kind never match.
    #[inline]
    pub fn matches(&self, value: &Value) -> bool {
        match (&self.threshold, value) {
            (Threshold::Numeric(t), Value::Numeric(v)) => self.op.compare(*v, *t),
            (Threshold::Category(c), Value::Nominal(v)) => c == v,
            _ => false,
        }
    }
}

impl fmt::Display for SplitCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.op, self.threshold)
    }
}

/// Attribute tested by an internal node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitAttribute {
    /// Position in the schema.
    pub index: usize,
    pub name: String,
    pub numeric: bool,
}

// =============================================================================
// Nodes
// =============================================================================

/// Leaf payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Leaf {
    /// Majority class.
    pub prediction: String,
    /// Class counts; `None` until statistics have been computed.
    pub distribution: Option<ClassDistribution>,
    /// `max(count) / sum(count)`, in `[0, 1]`.
    pub confidence: f64,
    /// Set by drift detection when the latest batch degraded the confidence.
    pub perturbed: bool,
    /// Every record routed here so far.
    pub records: Vec<Record>,
}

impl Leaf {
    pub fn new(prediction: impl Into<String>) -> Self {
        Self {
            prediction: prediction.into(),
            distribution: None,
            confidence: 0.0,
            perturbed: false,
            records: Vec::new(),
        }
    }

    #[inline]
    pub fn is_pure(&self) -> bool {
        self.confidence == 1.0
    }

    /// Install a distribution; prediction and confidence follow it unless it
    /// is empty, in which case the prediction is kept.
    pub fn set_distribution(&mut self, distribution: ClassDistribution) {
        match distribution.majority() {
            Some(m) => {
                self.prediction = distribution.values()[m.index].clone();
                self.confidence = m.confidence;
            }
            None => self.confidence = 0.0,
        }
        self.distribution = Some(distribution);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Internal {
        attribute: SplitAttribute,
        children: Vec<NodeId>,
    },
    Leaf(Leaf),
}

/// A node of the tree arena.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    /// Lookup-only back reference.
    pub parent: Option<NodeId>,
    pub depth: u32,
    /// `None` for the root.
    pub condition: Option<SplitCondition>,
    pub kind: NodeKind,
}

impl Node {
    pub fn leaf(prediction: impl Into<String>) -> Self {
        Self {
            parent: None,
            depth: 0,
            condition: None,
            kind: NodeKind::Leaf(Leaf::new(prediction)),
        }
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::Leaf(_))
    }

    #[inline]
    pub fn children(&self) -> &[NodeId] {
        match &self.kind {
            NodeKind::Internal { children, .. } => children,
            NodeKind::Leaf(_) => &[],
        }
    }

    #[inline]
    pub fn as_leaf(&self) -> Option<&Leaf> {
        match &self.kind {
            NodeKind::Leaf(leaf) => Some(leaf),
            NodeKind::Internal { .. } => None,
        }
    }

    #[inline]
    pub fn as_leaf_mut(&mut self) -> Option<&mut Leaf> {
        match &mut self.kind {
            NodeKind::Leaf(leaf) => Some(leaf),
            NodeKind::Internal { .. } => None,
        }
    }

    #[inline]
    pub fn split_attribute(&self) -> Option<&SplitAttribute> {
        match &self.kind {
            NodeKind::Internal { attribute, .. } => Some(attribute),
            NodeKind::Leaf(_) => None,
        }
    }
}
