//! Renders every page of the PDFs in a module directory and extracts their
//! embedded images.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::info;

use lorekeeper_pdf::{DedupScope, Extractor, ExtractorConfig, PdfiumRenderer};
use module_index::{init_tracing, module_layout};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Scope {
    /// Each PDF is deduplicated on its own
    Document,
    /// Identical images across all PDFs of the module are written once
    Module,
}

impl From<Scope> for DedupScope {
    fn from(scope: Scope) -> Self {
        match scope {
            Scope::Document => DedupScope::Document,
            Scope::Module => DedupScope::Module,
        }
    }
}

/// CLI arguments
#[derive(Parser)]
#[command(name = "extract-images")]
#[command(about = "Extract page images and embedded images from the PDFs of a module")]
#[command(version)]
struct Cli {
    /// Module directory containing the PDFs
    module_path: PathBuf,

    /// Skip embedded images narrower or shorter than this many pixels
    #[arg(long, default_value_t = 50)]
    min_dimension: u32,

    /// Page rendering resolution
    #[arg(long, default_value_t = 72)]
    dpi: u32,

    /// Scope of duplicate detection
    #[arg(long, value_enum, default_value_t = Scope::Document)]
    dedup_scope: Scope,

    /// Directory containing the pdfium library
    #[arg(long, env = "PDFIUM_LIB_DIR")]
    pdfium_dir: Option<PathBuf>,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let layout = module_layout(&cli.module_path)?;
    let renderer = PdfiumRenderer::with_library_dir(cli.pdfium_dir.as_deref())
        .context("Failed to initialize the PDF renderer")?;
    let config = ExtractorConfig::new()
        .with_min_dimension(cli.min_dimension)
        .with_page_dpi(cli.dpi)
        .with_dedup_scope(cli.dedup_scope.into());

    info!(module = %layout.root.display(), "Indexing module");
    let report = Extractor::new(layout, renderer, config)
        .run()
        .context("Error indexing module")?;

    println!(
        "{} documents, {} pages, {} embedded images ({} small, {} duplicate, {} failed)",
        report.documents,
        report.pages,
        report.images_written,
        report.skipped_small,
        report.skipped_duplicate,
        report.failed
    );
    Ok(())
}
