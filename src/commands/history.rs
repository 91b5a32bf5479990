//! The `history` and `summary` commands.

use anyhow::Result;

use crate::cli::args::{HistoryCommand, SummaryCommand};
use crate::cli::exit_status::ExitStatus;
use crate::commands::context::open_engine;
use crate::report;

pub fn history(cmd: HistoryCommand) -> Result<ExitStatus> {
    let engine = open_engine(&cmd.common)?;
    let runs = engine.history(cmd.limit)?;
    if runs.is_empty() {
        println!("no runs recorded");
    } else {
        report::print_runs(&runs);
    }
    engine.close()?;
    Ok(ExitStatus::Success)
}

pub fn summary(cmd: SummaryCommand) -> Result<ExitStatus> {
    let engine = open_engine(&cmd.common)?;
    let summary = engine.run_summary(&cmd.run)?;
    report::print_summary(&summary);
    engine.close()?;
    Ok(ExitStatus::Success)
}
