//! # Rule-set visual RAG
//!
//! Renders every page of a rule set's PDFs, embeds the page images and
//! answers text queries with the best-matching page image paths.

use std::path::{Path, PathBuf};

use image::ImageFormat;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use lorekeeper_core::layout::{self, RuleSetLayout};
use lorekeeper_core::types::{PNG_EXTENSION, page_image_file_name};
use lorekeeper_pdf::PageRenderer;

use crate::embedder::VisualEmbedder;
use crate::error::Result;
use crate::retry::with_retry;
use crate::store::{CollectionConfig, MultiVectorStore, PointStruct};

/// Payload key holding the page image path.
pub const SOURCE_PAYLOAD_KEY: &str = "source";

/// Indexing threshold applied once the bulk upload has finished.
pub const POST_UPLOAD_INDEXING_THRESHOLD: u64 = 10;

/// Indexer settings.
#[derive(Debug, Clone)]
pub struct RagConfig {
    /// Page images embedded per model call.
    pub batch_size: usize,
    /// Attempts per batch upsert before the batch is given up.
    pub upsert_attempts: u32,
    /// Resolution pages are rendered at.
    pub page_dpi: u32,
    /// Quantile for the int8 clipping bound.
    pub quantile: f32,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            batch_size: 3,
            upsert_attempts: 3,
            page_dpi: 200,
            quantile: 0.99,
        }
    }
}

impl RagConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_upsert_attempts(mut self, attempts: u32) -> Self {
        self.upsert_attempts = attempts.max(1);
        self
    }

    pub fn with_page_dpi(mut self, dpi: u32) -> Self {
        self.page_dpi = dpi.max(1);
        self
    }

    pub fn with_quantile(mut self, quantile: f32) -> Self {
        self.quantile = quantile.clamp(0.0, 1.0);
        self
    }
}

/// Counts from one indexing pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexReport {
    pub pages: usize,
    pub indexed: usize,
    pub skipped_images: usize,
    pub failed_batches: usize,
}

/// `"<text> <Text> <text> <TEXT>"`: the query followed by its capitalized,
/// lower-case and upper-case forms.
pub fn augment_query(text: &str) -> String {
    let lower = text.to_lowercase();
    let mut chars = lower.chars();
    let capitalized: String = match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    };
    format!("{text} {capitalized} {lower} {}", text.to_uppercase())
}

fn progress_bar(len: u64, message: &'static str) -> ProgressBar {
    let bar = ProgressBar::new(len);
    if let Ok(style) = ProgressStyle::with_template("{msg} [{bar:40}] {pos}/{len} ({eta})") {
        bar.set_style(style.progress_chars("=> "));
    }
    bar.set_message(message);
    bar
}

/// Page-image retrieval over one rule-set directory.
pub struct RuleSetRag<E> {
    layout: RuleSetLayout,
    embedder: E,
    store: MultiVectorStore,
    config: RagConfig,
    page_images: Vec<PathBuf>,
}

impl<E: VisualEmbedder> RuleSetRag<E> {
    /// Prepares `page_image/` and `qdrant/` under the rule-set directory and
    /// opens the store.
    pub fn open(layout: RuleSetLayout, embedder: E, config: RagConfig) -> Result<Self> {
        layout::require_directory(&layout.root)?;
        std::fs::create_dir_all(&layout.page_image)?;
        let store = MultiVectorStore::open(&layout.store)?;

        let mut rag = Self {
            layout,
            embedder,
            store,
            config,
            page_images: Vec::new(),
        };
        rag.reload_page_images()?;
        Ok(rag)
    }

    /// Sorted page image paths; a path's position is its point id.
    pub fn page_images(&self) -> &[PathBuf] {
        &self.page_images
    }

    pub fn store(&self) -> &MultiVectorStore {
        &self.store
    }

    fn reload_page_images(&mut self) -> Result<()> {
        self.page_images = layout::list_files_with_extension(&self.layout.page_image, PNG_EXTENSION)?;
        Ok(())
    }

    /// Clears `page_image/` and renders every PDF of the rule set into it.
    pub fn create_page_images<R: PageRenderer>(&mut self, renderer: &R) -> Result<usize> {
        let removed = layout::clean_directory(&self.layout.page_image)?;
        info!(dir = %self.layout.page_image.display(), removed, "Cleared page images");

        let mut written = 0usize;
        for pdf in layout::list_pdfs(&self.layout.root)? {
            let stem = layout::file_stem(&pdf);
            info!(pdf = %pdf.display(), "Rendering page images");
            let target_dir = &self.layout.page_image;
            renderer.render_pages(&pdf, self.config.page_dpi, &mut |page, raster| {
                raster.save_with_format(target_dir.join(page_image_file_name(&stem, page)), ImageFormat::Png)?;
                written += 1;
                Ok(())
            })?;
        }

        self.reload_page_images()?;
        Ok(written)
    }

    /// Recreates the embedder's collection, empty, with bulk-upload settings.
    pub fn create_collection(&mut self) -> Result<()> {
        let name = self.embedder.collection_name().to_string();
        if self.store.collection_exists(&name)? {
            self.store.delete_collection(&name)?;
        }
        let config = CollectionConfig::new(self.embedder.vector_size())
            .with_int8_quantization(self.config.quantile, true)
            .with_on_disk_payload(true)
            .with_indexing_threshold(0);
        self.store.create_collection(&name, config)
    }

    /// Embeds and stores every cached page image, then builds the quantized
    /// index.
    pub fn index_page_images(&mut self) -> Result<IndexReport> {
        let name = self.embedder.collection_name().to_string();
        let mut report = IndexReport {
            pages: self.page_images.len(),
            ..Default::default()
        };

        let batch_size = self.config.batch_size.max(1);
        let bar = progress_bar(self.page_images.len() as u64, "Generating embeddings");
        for (batch_index, batch) in self.page_images.chunks(batch_size).enumerate() {
            let first_id = batch_index * batch_size;
            bar.inc(batch.len() as u64);

            let mut ids = Vec::with_capacity(batch.len());
            let mut images = Vec::with_capacity(batch.len());
            for (offset, path) in batch.iter().enumerate() {
                match image::open(path) {
                    Ok(img) => {
                        ids.push((first_id + offset) as u64);
                        images.push(img);
                    }
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "Error loading image");
                        report.skipped_images += 1;
                    }
                }
            }
            if images.is_empty() {
                continue;
            }

            let embeddings = self.embedder.embed_images(&images)?;
            let points: Vec<PointStruct> = ids
                .iter()
                .zip(embeddings)
                .map(|(&id, vectors)| {
                    PointStruct::new(id, vectors)
                        .with_payload(SOURCE_PAYLOAD_KEY, self.page_images[id as usize].to_string_lossy().into_owned())
                })
                .collect();

            let store = &mut self.store;
            match with_retry(self.config.upsert_attempts, "upsert", || store.upsert(&name, &points)) {
                Ok(()) => report.indexed += points.len(),
                Err(e) => {
                    warn!(first_id, error = %e, "Giving up on batch");
                    report.failed_batches += 1;
                }
            }
        }
        bar.finish_and_clear();

        self.store
            .update_indexing_threshold(&name, POST_UPLOAD_INDEXING_THRESHOLD)?;
        info!(
            collection = %name,
            pages = report.pages,
            indexed = report.indexed,
            skipped = report.skipped_images,
            failed_batches = report.failed_batches,
            "Indexed page images"
        );
        Ok(report)
    }

    /// Renders, recreates the collection and indexes, in that order.
    pub fn create_index<R: PageRenderer>(&mut self, renderer: &R) -> Result<IndexReport> {
        self.create_page_images(renderer)?;
        self.create_collection()?;
        self.index_page_images()
    }

    /// Paths of the `top_k` page images best matching `query`, best first.
    pub fn page_image_paths(&mut self, query: &str, top_k: usize) -> Result<Vec<PathBuf>> {
        let name = self.embedder.collection_name().to_string();
        let embedding = self.embedder.embed_query(&augment_query(query))?;
        let hits = self.store.query_points(&name, &embedding, top_k)?;

        Ok(hits
            .into_iter()
            .filter_map(|hit| {
                let path = self.page_images.get(hit.id as usize).cloned();
                if path.is_none() {
                    warn!(id = hit.id, "Point id outside the page image cache");
                }
                path
            })
            .collect())
    }

    pub fn layout(&self) -> &RuleSetLayout {
        &self.layout
    }

    pub fn root(&self) -> &Path {
        &self.layout.root
    }
}
