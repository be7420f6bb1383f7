//! Annotates the embedded images of a module with a vision LLM.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use lorekeeper_llm::{Annotator, AnnotatorConfig, default_provider};
use module_index::{init_tracing, module_layout};

/// CLI arguments
#[derive(Parser)]
#[command(name = "annotate-images")]
#[command(about = "Describe every embedded image of a module with an LLM")]
#[command(version)]
struct Cli {
    /// Module directory previously processed by extract-images
    module_path: PathBuf,

    /// Keep annotations that already exist
    #[arg(long)]
    skip_existing: bool,

    /// Model to use instead of OPENAI_MODEL
    #[arg(long)]
    model: Option<String>,

    /// Neighbouring pages sent on each side of the image's page
    #[arg(long, default_value_t = 1)]
    neighbor_pages: u32,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let layout = module_layout(&cli.module_path)?;
    let provider = default_provider(cli.model.as_deref()).context("Failed to configure the LLM provider")?;
    let config = AnnotatorConfig::new()
        .with_skip_existing(cli.skip_existing)
        .with_neighbor_pages(cli.neighbor_pages);

    let report = Annotator::new(layout, provider, config)
        .run()
        .context("Error annotating images")?;

    println!(
        "{} annotated, {} skipped, {} failed ({} input / {} output tokens)",
        report.annotated, report.skipped, report.failed, report.input_tokens, report.output_tokens
    );
    Ok(())
}
