//! The `checkpoint` command.

use anyhow::Result;
use colored::Colorize;

use crate::cli::args::CheckpointCommand;
use crate::cli::exit_status::ExitStatus;
use crate::commands::context::open_engine;

pub fn checkpoint(cmd: CheckpointCommand) -> Result<ExitStatus> {
    let engine = open_engine(&cmd.common)?;
    let run = engine.checkpoint(&cmd.name)?;
    println!(
        "{} checkpoint '{}' recorded in run {}",
        "✓".green(),
        cmd.name,
        run.public_id
    );
    engine.close()?;
    Ok(ExitStatus::Success)
}
