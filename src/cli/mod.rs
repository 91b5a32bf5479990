//! Command-line interface layer.
//!
//! This module owns argument parsing and command dispatch; the actual work
//! happens in [`crate::commands`] against an [`crate::engine::Engine`].

pub mod args;
pub mod exit_status;
mod run;

pub use args::{Arguments, Command};
pub use exit_status::ExitStatus;
pub use run::run_cli;
