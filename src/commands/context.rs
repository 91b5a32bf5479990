//! Shared command setup.

use anyhow::{Context, Result};

use crate::cli::args::CommonArgs;
use crate::config::EngineConfig;
use crate::engine::Engine;

/// Build the engine for the command's working tree, reading `MORFX_*`
/// settings from the environment exactly once.
pub fn open_engine(common: &CommonArgs) -> Result<Engine> {
    let root = match &common.root {
        Some(root) => root.clone(),
        None => std::env::current_dir().context("cannot determine working directory")?,
    };
    let config = EngineConfig::from_env().context("invalid MORFX_* environment")?;
    Engine::open(&root, config)
        .with_context(|| format!("failed to open journal under {}", root.display()))
}
