//! The rewriter: byte splices for the transform verbs.
//!
//! The tree is parsed once for locating targets; edits are purely textual.
//! When multiple targets match, edits apply in reverse byte order so
//! earlier positions stay valid. Inserted content reuses the leading
//! indentation of the target's line.

pub mod confidence;
pub mod diff;

use clap::ValueEnum;

use crate::error::{Error, Result};
use crate::query::QueryMatch;

pub use confidence::{Confidence, ConfidenceLevel, Factor};

/// Transform verbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum Verb {
    Query,
    Replace,
    Delete,
    InsertBefore,
    InsertAfter,
    Append,
}

impl Verb {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Query => "query",
            Verb::Replace => "replace",
            Verb::Delete => "delete",
            Verb::InsertBefore => "insert_before",
            Verb::InsertAfter => "insert_after",
            Verb::Append => "append",
        }
    }

    pub fn is_mutating(&self) -> bool {
        !matches!(self, Verb::Query)
    }

    /// Verbs that need a `content` argument.
    pub fn requires_content(&self) -> bool {
        matches!(
            self,
            Verb::Replace | Verb::InsertBefore | Verb::InsertAfter | Verb::Append
        )
    }
}

/// Result of a rewrite: the modified source plus everything the caller
/// shows the user and records in the journal.
#[derive(Debug, Clone)]
pub struct Rewrite {
    pub output: String,
    pub diff: String,
    pub confidence: Confidence,
    pub bytes_added: u64,
    pub bytes_removed: u64,
}

/// Compute the rewritten source for `verb` over `matches`.
///
/// `append_anchor` is the provider's smart-append insertion point, used by
/// [`Verb::Append`] when no target matched; `None` means end-of-file.
pub fn rewrite(
    source: &str,
    verb: Verb,
    matches: &[QueryMatch],
    content: &str,
    pattern: &str,
    append_anchor: Option<usize>,
) -> Result<Rewrite> {
    let mut edits: Vec<(std::ops::Range<usize>, String)> = Vec::new();

    match verb {
        Verb::Query => {
            return Err(Error::QueryResolution(
                "query verb does not rewrite".to_string(),
            ));
        }
        Verb::Replace => {
            for m in matches {
                edits.push((m.byte_range.clone(), content.to_string()));
            }
        }
        Verb::Delete => {
            for m in matches {
                edits.push((m.byte_range.clone(), String::new()));
            }
        }
        Verb::InsertBefore => {
            for m in matches {
                let indent = leading_indent(source, m.byte_range.start);
                let start = m.byte_range.start;
                edits.push((start..start, format!("{content}\n{indent}")));
            }
        }
        Verb::InsertAfter => {
            for m in matches {
                let indent = leading_indent(source, m.byte_range.start);
                let end = m.byte_range.end;
                edits.push((end..end, format!("\n{indent}{content}")));
            }
        }
        Verb::Append => {
            let at = match matches.first() {
                Some(first) => first.byte_range.end,
                None => append_anchor.unwrap_or(source.len()),
            };
            let text = if at == 0 {
                format!("{content}\n")
            } else {
                format!("\n\n{content}")
            };
            edits.push((at..at, text));
        }
    }

    let mut bytes_added = 0u64;
    let mut bytes_removed = 0u64;
    for (range, replacement) in &edits {
        bytes_added += replacement.len() as u64;
        bytes_removed += (range.end - range.start) as u64;
    }

    let output = splice(source, edits);
    let diff = diff::unified(source, &output);
    let confidence = confidence::score(verb, matches, pattern);

    Ok(Rewrite {
        output,
        diff,
        confidence,
        bytes_added,
        bytes_removed,
    })
}

/// Apply edits back-to-front so byte offsets stay valid.
fn splice(source: &str, mut edits: Vec<(std::ops::Range<usize>, String)>) -> String {
    edits.sort_by_key(|(range, _)| (range.start, range.end));
    let mut output = source.to_string();
    for (range, replacement) in edits.into_iter().rev() {
        output.replace_range(range, &replacement);
    }
    output
}

/// The run of spaces and tabs at the start of the line holding `at`.
fn leading_indent(source: &str, at: usize) -> String {
    let line_start = source[..at].rfind('\n').map(|i| i + 1).unwrap_or(0);
    source[line_start..]
        .chars()
        .take_while(|c| *c == ' ' || *c == '\t')
        .collect()
}
