//! The `logs` command: search the journal log table.

use anyhow::Result;

use crate::cli::args::LogsCommand;
use crate::cli::exit_status::ExitStatus;
use crate::commands::context::open_engine;
use crate::report;

pub fn logs(cmd: LogsCommand) -> Result<ExitStatus> {
    let engine = open_engine(&cmd.common)?;
    let entries = engine.search_logs(&cmd.query)?;
    if entries.is_empty() {
        println!("no log entries match '{}'", cmd.query);
    } else {
        report::print_logs(&entries);
    }
    engine.close()?;
    Ok(ExitStatus::Success)
}
