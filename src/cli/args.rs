//! CLI argument definitions using clap.
//!
//! ## Commands
//!
//! - `query`: Find declarations matching a pattern or compound expression
//! - `replace` / `delete` / `insert-before` / `insert-after` / `append`:
//!   Apply a transform verb to a file
//! - `rollback`: Revert to an operation id or named checkpoint
//! - `checkpoint`: Record a named checkpoint in the latest run
//! - `history` / `summary`: Inspect recorded runs
//! - `keys`: Rotate or list patch encryption keys
//! - `logs`: Search the journal log

use std::path::PathBuf;

use clap::{Args, CommandFactory, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Arguments {
    #[command(subcommand)]
    pub command: Option<Command>,
}

impl Arguments {
    /// Check if a command was provided, otherwise print help and return None.
    pub fn with_command_or_help(self) -> Option<Self> {
        if self.command.is_none() {
            Self::command().print_help().ok();
            None
        } else {
            Some(self)
        }
    }

    /// Get the verbose flag from the command's common args.
    pub fn verbose(&self) -> bool {
        match &self.command {
            Some(Command::Query(cmd)) => cmd.common.verbose,
            Some(Command::Replace(cmd))
            | Some(Command::Delete(cmd))
            | Some(Command::InsertBefore(cmd))
            | Some(Command::InsertAfter(cmd))
            | Some(Command::Append(cmd)) => cmd.common.verbose,
            Some(Command::Rollback(cmd)) => cmd.common.verbose,
            Some(Command::Checkpoint(cmd)) => cmd.common.verbose,
            Some(Command::History(cmd)) => cmd.common.verbose,
            Some(Command::Summary(cmd)) => cmd.common.verbose,
            Some(Command::Keys(cmd)) => cmd.common.verbose,
            Some(Command::Logs(cmd)) => cmd.common.verbose,
            None => false,
        }
    }
}

/// Common arguments shared by all commands.
#[derive(Debug, Clone, Args)]
pub struct CommonArgs {
    /// Working tree root (defaults to the current directory)
    #[arg(long)]
    pub root: Option<PathBuf>,

    /// Language id, overriding file-extension detection
    #[arg(long)]
    pub lang: Option<String>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Debug, Parser)]
pub struct QueryCommand {
    /// Pattern: `kind:name` terms, combinable with & | ! (e.g.
    /// "func:Test* & !func:TestHelper")
    pub pattern: String,

    /// Files to search
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(Debug, Parser)]
pub struct TransformCommand {
    /// Pattern selecting the target declarations
    pub pattern: String,

    /// File to transform
    pub file: PathBuf,

    /// Content for replace/insert/append verbs
    #[arg(short, long)]
    pub content: Option<String>,

    /// Show the diff without touching disk or journal
    #[arg(long)]
    pub dry_run: bool,

    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(Debug, Parser)]
pub struct RollbackCommand {
    /// Operation id or checkpoint name
    pub target: String,

    /// Report what would revert without doing it
    #[arg(long)]
    pub dry_run: bool,

    /// Record warnings for failed file writes instead of aborting
    #[arg(long)]
    pub lenient: bool,

    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(Debug, Parser)]
pub struct CheckpointCommand {
    /// Checkpoint name, unique within the run
    pub name: String,

    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(Debug, Parser)]
pub struct HistoryCommand {
    /// Maximum number of runs to list
    #[arg(long, default_value_t = 20)]
    pub limit: u32,

    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(Debug, Parser)]
pub struct SummaryCommand {
    /// Run id or public id
    pub run: String,

    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
pub enum KeysAction {
    /// Derive the next key version and mark it active
    Rotate,
    /// List key versions (never key material)
    List,
}

#[derive(Debug, Parser)]
pub struct KeysCommand {
    #[command(subcommand)]
    pub action: KeysAction,

    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(Debug, Parser)]
pub struct LogsCommand {
    /// Search terms
    pub query: String,

    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Find declarations matching a pattern
    Query(QueryCommand),
    /// Replace each matched declaration with new content
    Replace(TransformCommand),
    /// Delete each matched declaration
    Delete(TransformCommand),
    /// Insert content before each match, reusing its indentation
    InsertBefore(TransformCommand),
    /// Insert content after each match, reusing its indentation
    InsertAfter(TransformCommand),
    /// Append content after the first match, or after the last declaration
    /// of the same kind when nothing matches
    Append(TransformCommand),
    /// Revert operations LIFO back to an operation id or checkpoint
    Rollback(RollbackCommand),
    /// Record a named checkpoint in the latest run
    Checkpoint(CheckpointCommand),
    /// List recent runs
    History(HistoryCommand),
    /// Show aggregate statistics for one run
    Summary(SummaryCommand),
    /// Patch encryption key management
    Keys(KeysCommand),
    /// Search the journal log
    Logs(LogsCommand),
}
