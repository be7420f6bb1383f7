//! Rule-set page search
//!
//! Renders the pages of every PDF in a rule-set directory, indexes them
//! with ColPali and answers text queries with matching page image paths.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use lorekeeper_core::RuleSetLayout;
use lorekeeper_core::layout::require_directory;
use lorekeeper_pdf::PdfiumRenderer;
use lorekeeper_vecdb::embedder::{MODEL_DIR_ENV, default_model_dir, describe_model_dir};
use lorekeeper_vecdb::{ColPaliEmbedder, EmbedderConfig, RagConfig, RuleSetRag, VisualEmbedder};

/// CLI arguments
#[derive(Parser)]
#[command(name = "ruleset-rag")]
#[command(about = "Index rule-set pages and search them with text queries")]
#[command(version)]
struct Cli {
    /// Rule-set directory containing the PDFs
    rule_set_path: PathBuf,

    /// Reuse the existing page images instead of rendering the PDFs again
    #[arg(long)]
    skip_render: bool,

    /// Reuse the existing index instead of embedding the pages again
    #[arg(long)]
    skip_index: bool,

    /// Number of pages returned per query
    #[arg(short = 'k', long, default_value_t = 10)]
    top_k: usize,

    /// Answer a single query and exit instead of reading queries from stdin
    #[arg(short, long)]
    query: Option<String>,

    /// Page images embedded per model call
    #[arg(long, default_value_t = 3)]
    batch_size: usize,

    /// Page rendering resolution
    #[arg(long, default_value_t = 200)]
    dpi: u32,

    /// ColPali model directory (safetensors shards and tokenizer.json)
    #[arg(long, env = MODEL_DIR_ENV)]
    model_dir: Option<PathBuf>,

    /// Run the model on the CPU even when CUDA is available
    #[arg(long)]
    cpu: bool,

    /// Directory containing the pdfium library
    #[arg(long, env = "PDFIUM_LIB_DIR")]
    pdfium_dir: Option<PathBuf>,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn print_paths(out: &mut impl Write, paths: &[PathBuf]) -> io::Result<()> {
    for path in paths {
        writeln!(out, "  {}", path.display())?;
    }
    out.flush()
}

/// Answers queries from stdin until an empty line or end of input.
fn repl<E: VisualEmbedder>(rag: &mut RuleSetRag<E>, top_k: usize) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout().lock();
    let mut lines = stdin.lock().lines();

    loop {
        eprint!("query: ");
        io::stderr().flush()?;

        let Some(line) = lines.next() else { break };
        let query = line?;
        let query = query.trim();
        if query.is_empty() {
            break;
        }

        let paths = rag.page_image_paths(query, top_k)?;
        print_paths(&mut stdout, &paths)?;
    }
    Ok(())
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    require_directory(&cli.rule_set_path)?;
    let layout = RuleSetLayout::new(&cli.rule_set_path);

    let model_dir = cli.model_dir.clone().unwrap_or_else(default_model_dir);
    let embedder_config = EmbedderConfig::new()
        .with_model_dir(&model_dir)
        .with_force_cpu(cli.cpu);
    let embedder = ColPaliEmbedder::load(embedder_config)
        .with_context(|| format!("Failed to load the ColPali model from {}", describe_model_dir(&model_dir)))?;

    let config = RagConfig::new()
        .with_batch_size(cli.batch_size)
        .with_page_dpi(cli.dpi);
    let mut rag = RuleSetRag::open(layout, embedder, config).context("Failed to open the rule set")?;

    if !cli.skip_render {
        let renderer = PdfiumRenderer::with_library_dir(cli.pdfium_dir.as_deref())
            .context("Failed to initialize the PDF renderer")?;
        let pages = rag.create_page_images(&renderer).context("Failed to render page images")?;
        info!(pages, "Rendered page images");
    }

    if !cli.skip_index {
        rag.create_collection().context("Failed to create the collection")?;
        let report = rag.index_page_images().context("Failed to index page images")?;
        info!(
            indexed = report.indexed,
            skipped = report.skipped_images,
            failed_batches = report.failed_batches,
            "Index ready"
        );
    }

    match cli.query {
        Some(query) => {
            let paths = rag.page_image_paths(&query, cli.top_k)?;
            print_paths(&mut io::stdout().lock(), &paths)?;
        }
        None => repl(&mut rag, cli.top_k)?,
    }
    Ok(())
}
