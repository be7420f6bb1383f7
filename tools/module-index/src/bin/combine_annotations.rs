//! Combines the per-image annotations of a module into one manifest.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use lorekeeper_llm::combine_annotations;
use module_index::{init_tracing, module_layout};

/// CLI arguments
#[derive(Parser)]
#[command(name = "combine-annotations")]
#[command(about = "Write embedded-images.json from the annotations of a module")]
#[command(version)]
struct Cli {
    /// Module directory previously processed by annotate-images
    module_path: PathBuf,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let layout = module_layout(&cli.module_path)?;
    let report = combine_annotations(&layout).context("Error combining annotations")?;

    println!(
        "{} annotations combined into {} ({} skipped)",
        report.combined,
        layout.manifest.display(),
        report.skipped
    );
    Ok(())
}
