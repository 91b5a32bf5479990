//! Query layer: name patterns, compound expressions, and the match engine.
//!
//! A query names a declaration kind (`function`, `class`, ...) plus a name
//! pattern, optionally constrained by attributes. Compound expressions
//! combine term queries with boolean operators and are evaluated as set
//! algebra over the match sets of the same source.

pub mod compound;
pub mod pattern;
mod walk;

use std::collections::BTreeMap;
use std::ops::Range;

use serde::Serialize;

pub use compound::{Expr, parse_expression};
pub use walk::{evaluate, find_matches};

/// A language-neutral query: canonical kind, name pattern, and optional
/// attribute constraints (`type=string`, `receiver=Server`, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentQuery {
    pub kind: String,
    pub name: String,
    pub attributes: BTreeMap<String, String>,
}

impl AgentQuery {
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: normalize_kind(&kind.into()),
            name: name.into(),
            attributes: BTreeMap::new(),
        }
    }
}

/// 1-based line/column span; start inclusive, end exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Location {
    pub start_line: usize,
    pub start_col: usize,
    pub end_line: usize,
    pub end_col: usize,
}

/// One matched declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryMatch {
    /// Canonical kind the query asked for.
    pub kind: String,
    /// Extracted name, or `"anonymous"`.
    pub name: String,
    /// Exact byte slice of the matched node.
    pub content: String,
    /// Byte range of the matched node in the source.
    pub byte_range: Range<usize>,
    pub location: Location,
    /// Whether the declaration is visible outside its module/package.
    pub exported: bool,
}

impl QueryMatch {
    /// Build a match from a CST node.
    pub fn from_node(
        kind: &str,
        name: String,
        node: tree_sitter::Node<'_>,
        source: &str,
        exported: bool,
    ) -> Self {
        let start = node.start_position();
        let end = node.end_position();
        Self {
            kind: kind.to_string(),
            name,
            content: node.utf8_text(source.as_bytes()).unwrap_or("").to_string(),
            byte_range: node.byte_range(),
            location: Location {
                start_line: start.row + 1,
                start_col: start.column + 1,
                end_line: end.row + 1,
                end_col: end.column + 1,
            },
            exported,
        }
    }

    /// Identity used for set algebra over compound expressions.
    pub(crate) fn key(&self) -> (usize, usize, String) {
        (self.byte_range.start, self.byte_range.end, self.name.clone())
    }
}

/// Canonicalize the kind vocabulary accepted on the command line. Unknown
/// kinds pass through untouched; providers treat them as literal node types.
pub fn normalize_kind(kind: &str) -> String {
    match kind.to_ascii_lowercase().as_str() {
        "func" | "fn" | "def" | "function" => "function".to_string(),
        "method" => "method".to_string(),
        "class" => "class".to_string(),
        "iface" | "interface" => "interface".to_string(),
        "trait" => "trait".to_string(),
        "struct" => "struct".to_string(),
        "var" | "variable" | "let" => "variable".to_string(),
        "const" | "constant" => "constant".to_string(),
        "field" | "property" => "field".to_string(),
        "import" => "import".to_string(),
        "export" => "export".to_string(),
        "type" => "type".to_string(),
        "enum" => "enum".to_string(),
        "namespace" | "module" => "namespace".to_string(),
        "decorator" => "decorator".to_string(),
        "param" | "parameter" => "parameter".to_string(),
        other => other.to_string(),
    }
}
