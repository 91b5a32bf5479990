//! Tree-sitter bridge.
//!
//! Parsing goes through a shared [`AstCache`] keyed by the SHA-256 of the
//! source bytes, so repeated provider operations on byte-identical input
//! reuse one tree.

pub mod cache;

use std::path::Path;

use tree_sitter::{Parser, Tree};

use crate::error::{Error, Result};
use crate::lang::LanguageProvider;

pub use cache::{AstCache, CacheStats};

/// Build a parser for the provider's grammar.
pub fn new_parser(provider: &dyn LanguageProvider) -> Result<Parser> {
    let mut parser = Parser::new();
    parser
        .set_language(&provider.grammar())
        .map_err(|e| Error::Parse {
            path: Path::new(provider.id()).to_path_buf(),
            reason: format!("grammar rejected: {e}"),
        })?;
    Ok(parser)
}

/// Parse `source` through the cache. Returns the tree and whether it was a
/// cache hit.
pub fn parse_source(
    provider: &dyn LanguageProvider,
    cache: &AstCache,
    path: &Path,
    source: &str,
) -> Result<(Tree, bool)> {
    let mut parser = new_parser(provider)?;
    cache
        .get_or_parse(&mut parser, source)
        .ok_or_else(|| Error::Parse {
            path: path.to_path_buf(),
            reason: "grammar produced no tree".to_string(),
        })
}
