//! Morfx - structural code search and rewrite engine
//!
//! Morfx locates declarations in source files through per-language concrete
//! syntax tree providers, rewrites them with byte-accurate splices, and
//! records every mutation in a crash-safe, optionally encrypted journal
//! that supports rollback to any prior operation or named checkpoint.
//!
//! ## Module Structure
//!
//! - `cli`: Command-line interface layer (user-facing commands)
//! - `config`: Engine configuration from environment variables
//! - `engine`: The top-level [`engine::Engine`] value tying everything together
//! - `lang`: Language providers (Go, JavaScript, TypeScript, PHP)
//! - `parse`: Tree-sitter bridge and the shared AST cache
//! - `query`: Name patterns, compound expressions, and the match engine
//! - `rewrite`: Verbs, byte splices, confidence scoring, unified diffs
//! - `crypto`: Patch blob encryption and the HKDF keyring
//! - `journal`: The SQLite operation journal
//! - `apply`: Crash-safe apply and LIFO rollback protocol

pub mod apply;
pub mod cli;
pub mod commands;
pub mod config;
pub mod crypto;
pub mod engine;
pub mod error;
pub mod journal;
pub mod lang;
pub mod parse;
pub mod query;
pub mod report;
pub mod rewrite;

pub use engine::Engine;
pub use error::{Error, Result};
