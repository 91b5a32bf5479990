//! Morfx CLI application entry point.
//!
//! This binary handles command dispatch for the morfx structural code
//! rewrite tool. All real work happens in the library; this file parses
//! arguments, initialises logging, and maps results to exit codes.

use std::process::ExitCode;

use clap::Parser;
use morfx::cli::{Arguments, ExitStatus};

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Arguments::parse();

    match morfx::cli::run_cli(args) {
        Ok(status) => status.into(),
        Err(err) => {
            eprintln!("Error: {:#}", err);
            ExitStatus::Error.into()
        }
    }
}
