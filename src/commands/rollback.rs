//! The `rollback` command.

use anyhow::Result;

use crate::apply::RollbackOptions;
use crate::cli::args::RollbackCommand;
use crate::cli::exit_status::ExitStatus;
use crate::commands::context::open_engine;
use crate::report;

pub fn rollback(cmd: RollbackCommand) -> Result<ExitStatus> {
    let engine = open_engine(&cmd.common)?;
    let options = RollbackOptions {
        dry_run: cmd.dry_run,
        strict: !cmd.lenient,
        crash_point: None,
    };
    let report = engine.rollback(&cmd.target, &options)?;
    report::print_rollback(&report);
    engine.close()?;
    Ok(ExitStatus::Success)
}
