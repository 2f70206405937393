//! Rule-set text format.
//!
//! Trees are exchanged between inducers and forests as indented rule text,
//! one block per tree:
//!
//! ```text
//! Tree 1:
//! a1 <= 5
//! |   a2 <= 3 : no {no:4, yes:0}
//! |   a2 > 3 : yes {no:0, yes:2}
//! a1 > 5 : yes {no:0, yes:6}
//!
//! Tree 2:
//! : yes {no:4, yes:8}
//! ```
//!
//! A condition line is `|   ` repeated once per level, then
//! `attribute op value`. A `: class` suffix marks a leaf; anything after the
//! first class token (counts, Weka's `(3/1)`) is ignored. A block holding a
//! single `: class` line is a one-leaf tree. Text before the first `Tree`
//! header is ignored.

use std::fmt::Write as _;

use crate::data::Schema;
use crate::repr::{
    NodeId, NodeKind, SplitAttribute, SplitCondition, SplitOp, Tree, TreeBuilder, TreeValidationError,
};

/// Indentation emitted per level.
const INDENT: &str = "|   ";

/// Operators as they appear between spaces, longest first.
const OPERATORS: [(&str, SplitOp); 5] = [
    (" <= ", SplitOp::Le),
    (" >= ", SplitOp::Ge),
    (" < ", SplitOp::Lt),
    (" > ", SplitOp::Gt),
    (" = ", SplitOp::Eq),
];

// =============================================================================
// Error types
// =============================================================================

/// Error type for rule-set parsing.
#[derive(Debug, thiserror::Error)]
pub enum RuleSetError {
    #[error("tree {tree}, line {line}: unknown attribute `{name}`")]
    UnknownAttribute { tree: usize, line: usize, name: String },
    #[error("tree {tree}, line {line}: invalid condition `{text}`")]
    InvalidCondition { tree: usize, line: usize, text: String },
    #[error("tree {tree}, line {line}: invalid threshold `{value}` for attribute `{attribute}`")]
    InvalidThreshold {
        tree: usize,
        line: usize,
        attribute: String,
        value: String,
    },
    #[error("tree {tree}, line {line}: unexpected indentation level {level}")]
    BadIndentation { tree: usize, line: usize, level: usize },
    #[error("tree {tree} has no rules")]
    EmptyTree { tree: usize },
    #[error("tree {tree}, line {line}: {message}")]
    InvalidStructure {
        tree: usize,
        line: usize,
        message: String,
    },
    #[error("tree {tree}: {source}")]
    Validation {
        tree: usize,
        #[source]
        source: TreeValidationError,
    },
}

// =============================================================================
// Parsing
// =============================================================================

/// One condition line of a block.
#[derive(Debug)]
struct RuleLine {
    line: usize,
    level: usize,
    /// `None` for the single line of a one-leaf tree.
    split: Option<(SplitAttribute, SplitCondition)>,
    class: Option<String>,
}

/// Parse every tree block of `text` against `schema`.
pub fn parse_rule_set(text: &str, schema: &Schema) -> Result<Vec<Tree>, RuleSetError> {
    let mut blocks: Vec<Vec<(usize, &str)>> = Vec::new();
    for (i, raw) in text.lines().enumerate() {
        let trimmed = raw.trim_end();
        if trimmed.trim().is_empty() {
            continue;
        }
        if trimmed.starts_with("Tree") {
            blocks.push(Vec::new());
        } else if let Some(block) = blocks.last_mut() {
            block.push((i + 1, trimmed));
        }
    }

    blocks
        .iter()
        .enumerate()
        .map(|(i, block)| parse_tree(i + 1, block, schema))
        .collect()
}

fn parse_tree(tree: usize, block: &[(usize, &str)], schema: &Schema) -> Result<Tree, RuleSetError> {
    let lines = block
        .iter()
        .map(|&(line, text)| parse_line(tree, line, text, schema))
        .collect::<Result<Vec<_>, _>>()?;

    let Some(first) = lines.first() else {
        return Err(RuleSetError::EmptyTree { tree });
    };
    if first.split.is_none() {
        return match (&first.class, lines.len()) {
            (Some(class), 1) => Ok(Tree::single_leaf(class.clone())),
            _ => Err(RuleSetError::InvalidStructure {
                tree,
                line: first.line,
                message: "a one-leaf tree must consist of a single `: class` line".to_string(),
            }),
        };
    }

    let mut builder = TreeBuilder::new();
    let root = builder.init_root();
    let consumed = grow(tree, &lines, 0, 0, &mut builder, root)?;
    if let Some(extra) = lines.get(consumed) {
        return Err(RuleSetError::BadIndentation {
            tree,
            line: extra.line,
            level: extra.level,
        });
    }
    builder
        .finish()
        .map_err(|source| RuleSetError::Validation { tree, source })
}

/// Turn `node` into the parent of the lines at `level` starting at `start`.
/// Returns the index of the first line not consumed.
fn grow(
    tree: usize,
    lines: &[RuleLine],
    start: usize,
    level: usize,
    builder: &mut TreeBuilder,
    node: NodeId,
) -> Result<usize, RuleSetError> {
    let first = &lines[start];
    if first.level != level {
        return Err(RuleSetError::BadIndentation {
            tree,
            line: first.line,
            level: first.level,
        });
    }

    let mut children = Vec::new();
    let mut i = start;
    while i < lines.len() && lines[i].level >= level {
        if lines[i].level == level {
            children.push(i);
        }
        i += 1;
    }

    let mut attribute: Option<&SplitAttribute> = None;
    let mut conditions = Vec::with_capacity(children.len());
    for &c in &children {
        let Some((attr, condition)) = &lines[c].split else {
            return Err(RuleSetError::InvalidStructure {
                tree,
                line: lines[c].line,
                message: "missing split condition".to_string(),
            });
        };
        match attribute {
            Some(a) if a != attr => {
                return Err(RuleSetError::InvalidStructure {
                    tree,
                    line: lines[c].line,
                    message: format!("siblings split on `{}` and `{}`", a.name, attr.name),
                })
            }
            _ => attribute = Some(attr),
        }
        conditions.push(condition.clone());
    }
    let Some(attribute) = attribute.cloned() else {
        return Err(RuleSetError::EmptyTree { tree });
    };

    let ids = builder.split(node, attribute, conditions);
    for (&c, &id) in children.iter().zip(&ids) {
        let has_children = lines.get(c + 1).is_some_and(|next| next.level > level);
        match (&lines[c].class, has_children) {
            (Some(class), false) => builder.make_leaf(id, class.clone()),
            (None, true) => {
                grow(tree, lines, c + 1, level + 1, builder, id)?;
            }
            (Some(_), true) => {
                return Err(RuleSetError::InvalidStructure {
                    tree,
                    line: lines[c].line,
                    message: "leaf line followed by nested conditions".to_string(),
                })
            }
            (None, false) => {
                return Err(RuleSetError::InvalidStructure {
                    tree,
                    line: lines[c].line,
                    message: "condition without class or nested conditions".to_string(),
                })
            }
        }
    }
    Ok(i)
}

fn parse_line(tree: usize, line: usize, text: &str, schema: &Schema) -> Result<RuleLine, RuleSetError> {
    let mut rest = text.trim_start();
    let mut level = 0;
    while let Some(stripped) = rest.strip_prefix('|') {
        level += 1;
        rest = stripped.trim_start();
    }

    let (condition, class) = match rest.find(':') {
        Some(pos) => (rest[..pos].trim(), class_token(&rest[pos + 1..])),
        None => (rest.trim(), None),
    };

    if condition.is_empty() {
        return Ok(RuleLine {
            line,
            level,
            split: None,
            class,
        });
    }

    let padded = format!(" {} ", condition);
    let found = OPERATORS
        .iter()
        .filter_map(|&(token, op)| padded.find(token).map(|pos| (pos, token, op)))
        .min_by_key(|&(pos, token, _)| (pos, std::cmp::Reverse(token.len())));
    let Some((pos, token, op)) = found else {
        return Err(RuleSetError::InvalidCondition {
            tree,
            line,
            text: condition.to_string(),
        });
    };
    let name = padded[..pos].trim();
    let value = padded[pos + token.len()..].trim();
    if name.is_empty() || value.is_empty() {
        return Err(RuleSetError::InvalidCondition {
            tree,
            line,
            text: condition.to_string(),
        });
    }

    let index = schema.index_of(name).ok_or_else(|| RuleSetError::UnknownAttribute {
        tree,
        line,
        name: name.to_string(),
    })?;
    let numeric = schema.is_numeric(index);
    let invalid_threshold = || RuleSetError::InvalidThreshold {
        tree,
        line,
        attribute: name.to_string(),
        value: value.to_string(),
    };
    let condition = if numeric {
        SplitCondition::numeric(op, value.parse::<f64>().map_err(|_| invalid_threshold())?)
    } else if op == SplitOp::Eq {
        SplitCondition::category(value)
    } else {
        return Err(invalid_threshold());
    };

    Ok(RuleLine {
        line,
        level,
        split: Some((
            SplitAttribute {
                index,
                name: name.to_string(),
                numeric,
            },
            condition,
        )),
        class,
    })
}

/// First token of a leaf annotation.
fn class_token(annotation: &str) -> Option<String> {
    annotation
        .split(|c: char| c.is_whitespace() || matches!(c, '{' | '}' | '(' | ')' | ':'))
        .find(|t| !t.is_empty())
        .map(str::to_string)
}

// =============================================================================
// Writing
// =============================================================================

/// Render trees as rule text, numbering blocks from 1.
pub fn write_rule_set<'a>(trees: impl IntoIterator<Item = &'a Tree>) -> String {
    let mut out = String::new();
    for (i, tree) in trees.into_iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        let _ = writeln!(out, "Tree {}:", i + 1);
        write_tree(tree, &mut out);
    }
    out
}

/// Append the condition lines of one tree.
pub fn write_tree(tree: &Tree, out: &mut String) {
    let root = tree.node(tree.root());
    if root.is_leaf() {
        out.push_str(": ");
        write_leaf(tree, tree.root(), out);
        out.push('\n');
        return;
    }
    write_children(tree, tree.root(), 0, out);
}

fn write_children(tree: &Tree, node: NodeId, level: usize, out: &mut String) {
    let NodeKind::Internal { attribute, children } = &tree.node(node).kind else {
        return;
    };
    for &child in children {
        let child_node = tree.node(child);
        for _ in 0..level {
            out.push_str(INDENT);
        }
        out.push_str(&attribute.name);
        if let Some(condition) = &child_node.condition {
            let _ = write!(out, " {}", condition);
        }
        if child_node.is_leaf() {
            out.push_str(" : ");
            write_leaf(tree, child, out);
            out.push('\n');
        } else {
            out.push('\n');
            write_children(tree, child, level + 1, out);
        }
    }
}

fn write_leaf(tree: &Tree, node: NodeId, out: &mut String) {
    let Some(leaf) = tree.leaf(node) else {
        return;
    };
    out.push_str(&leaf.prediction);
    if let Some(d) = &leaf.distribution {
        let counts: Vec<String> = d
            .values()
            .iter()
            .zip(d.counts())
            .map(|(v, c)| format!("{}:{}", v, c))
            .collect();
        let _ = write!(out, " {{{}}}", counts.join(", "));
    }
}

// =============================================================================
// Tests
// =============================================================================
