//! Text formats shared with external tree learners.
//!
//! Forests cross this boundary as Weka-style rule sets: inducers may emit
//! them, and the adapted forest is always rebuilt from the rule text of the
//! forest it copies.

pub mod ruleset;

pub use ruleset::{parse_rule_set, write_rule_set, RuleSetError};
