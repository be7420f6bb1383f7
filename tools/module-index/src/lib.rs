//! Shared setup for the module tools.

use std::path::Path;

use anyhow::Result;
use lorekeeper_core::ModuleLayout;
use lorekeeper_core::layout::require_directory;
use tracing_subscriber::EnvFilter;

/// Logs to stderr, filtered by `RUST_LOG` (default `info`).
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Layout of the module at `dir`, which must be a directory.
pub fn module_layout(dir: &Path) -> Result<ModuleLayout> {
    require_directory(dir)?;
    Ok(ModuleLayout::new(dir))
}
