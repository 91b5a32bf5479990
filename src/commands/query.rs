//! The `query` command: find declarations across one or more files.

use std::path::PathBuf;

use anyhow::Result;
use rayon::prelude::*;

use crate::cli::args::QueryCommand;
use crate::cli::exit_status::ExitStatus;
use crate::commands::context::open_engine;
use crate::query::QueryMatch;
use crate::report;

pub fn query(cmd: QueryCommand) -> Result<ExitStatus> {
    let engine = open_engine(&cmd.common)?;
    let lang = cmd.common.lang.as_deref();

    let results: Vec<crate::Result<(PathBuf, Vec<QueryMatch>)>> = cmd
        .files
        .par_iter()
        .map(|file| {
            engine
                .query_file(file, &cmd.pattern, lang)
                .map(|matches| (file.clone(), matches))
        })
        .collect();

    let multiple = cmd.files.len() > 1;
    let mut index = 1;
    let mut total = 0;
    for result in results {
        let (file, matches) = result?;
        if multiple && !matches.is_empty() {
            report::print_file_header(&file);
        }
        index = report::print_matches(&matches, index, cmd.common.verbose);
        total += matches.len();
    }

    if total == 0 {
        println!("no matches");
    }
    engine.close()?;
    Ok(ExitStatus::Success)
}
