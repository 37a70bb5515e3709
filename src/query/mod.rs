//! Path-query engine.
//!
//! # Grammar
//! ```text
//! query   := "" | "/" | ("/" segment)+
//! segment := key | "*" | "[*]" | "[" N "]" | "[?" field op literal "]"
//! op      := "==" | "!=" | ">" | "<" | ">=" | "<="
//! ```
//!
//! # Data Flow
//! ```text
//! query string
//!     → parser.rs (segments, syntax errors)
//!     → eval.rs (recursive descent over the live tree under the read lock)
//!     → Vec<QueryResult> (owned copies, safe to keep after the lock is released)
//! ```
//!
//! # Design Decisions
//! - Results follow object insertion order and array index order
//! - Only key and index steps fail the query; wildcard and filter branches that
//!   fail are skipped

pub mod eval;
pub mod parser;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::tree::{path, Node, Tree};

pub use parser::{Filter, Literal, Operator, Segment};

/// One match: where it was found and a copy of the node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub path: String,
    pub node: Node,
}

/// Run `query` against `tree`.
pub fn execute(tree: &Tree, query: &str) -> Result<Vec<QueryResult>> {
    let segments = parser::parse(query)?;
    eval::evaluate(tree, &segments)
}

/// Every node of `root` accepted by `predicate`, pre-order.
pub fn find_all(root: &Node, predicate: &dyn Fn(&Node) -> bool) -> Vec<QueryResult> {
    let mut results = Vec::new();
    eval::find_all(root, path::ROOT.to_string(), predicate, &mut results);
    results
}
