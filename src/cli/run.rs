//! Main entry point for the morfx CLI.
//!
//! Dispatches to the appropriate command handler based on the parsed
//! arguments.

use anyhow::Result;

use super::args::{Arguments, Command};
use super::exit_status::ExitStatus;
use crate::commands;
use crate::rewrite::Verb;

pub fn run_cli(args: Arguments) -> Result<ExitStatus> {
    let Some(args) = args.with_command_or_help() else {
        return Ok(ExitStatus::Success);
    };

    match args.command.expect("checked above") {
        Command::Query(cmd) => commands::query::query(cmd),
        Command::Replace(cmd) => commands::transform::transform(Verb::Replace, cmd),
        Command::Delete(cmd) => commands::transform::transform(Verb::Delete, cmd),
        Command::InsertBefore(cmd) => commands::transform::transform(Verb::InsertBefore, cmd),
        Command::InsertAfter(cmd) => commands::transform::transform(Verb::InsertAfter, cmd),
        Command::Append(cmd) => commands::transform::transform(Verb::Append, cmd),
        Command::Rollback(cmd) => commands::rollback::rollback(cmd),
        Command::Checkpoint(cmd) => commands::checkpoint::checkpoint(cmd),
        Command::History(cmd) => commands::history::history(cmd),
        Command::Summary(cmd) => commands::history::summary(cmd),
        Command::Keys(cmd) => commands::keys::keys(cmd),
        Command::Logs(cmd) => commands::logs::logs(cmd),
    }
}
