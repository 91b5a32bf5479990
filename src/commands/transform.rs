//! The transform commands: replace, delete, insert-before, insert-after,
//! append.

use anyhow::{Result, bail};

use crate::cli::args::TransformCommand;
use crate::cli::exit_status::ExitStatus;
use crate::commands::context::open_engine;
use crate::engine::TransformOptions;
use crate::error::Error;
use crate::report;
use crate::rewrite::Verb;

pub fn transform(verb: Verb, cmd: TransformCommand) -> Result<ExitStatus> {
    let content = cmd.content.clone().unwrap_or_default();
    if verb.requires_content() && content.is_empty() {
        bail!("{} requires --content", verb.as_str());
    }

    let engine = open_engine(&cmd.common)?;
    let options = TransformOptions {
        dry_run: cmd.dry_run,
        lang: cmd.common.lang.clone(),
    };

    match engine.transform(verb, &cmd.pattern, &cmd.file, &content, &options) {
        Ok(outcome) => {
            report::print_transform(&outcome);
            engine.close()?;
            Ok(ExitStatus::Success)
        }
        Err(Error::QueryResolution(message)) if message.starts_with("no matches") => {
            println!("{message}");
            engine.close()?;
            Ok(ExitStatus::Failure)
        }
        Err(err) => Err(err.into()),
    }
}
