//! The `keys` command: rotation and listing.

use anyhow::Result;
use colored::Colorize;

use crate::cli::args::{KeysAction, KeysCommand};
use crate::cli::exit_status::ExitStatus;
use crate::commands::context::open_engine;
use crate::report;

pub fn keys(cmd: KeysCommand) -> Result<ExitStatus> {
    let engine = open_engine(&cmd.common)?;
    match cmd.action {
        KeysAction::Rotate => {
            let version = engine.rotate_key()?;
            println!("{} rotated to key version {version}", "✓".green());
        }
        KeysAction::List => {
            let keys = engine.list_keys()?;
            if keys.is_empty() {
                println!("no keys (encryption is off)");
            } else {
                report::print_keys(&keys);
            }
        }
    }
    engine.close()?;
    Ok(ExitStatus::Success)
}
