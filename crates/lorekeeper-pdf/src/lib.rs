//! # Lorekeeper PDF
//!
//! Turns RPG module PDFs into images on disk: one raster per page and one
//! PNG per embedded image XObject.
//!
//! Page rasterization goes through the [`PageRenderer`] trait, backed by
//! libpdfium in [`PdfiumRenderer`]. Embedded images are read straight from
//! the document's object graph with `lopdf`, decoded to pixels, filtered by
//! size and deduplicated by SHA-256 of their encoded stream.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use lorekeeper_core::ModuleLayout;
//! use lorekeeper_pdf::{Extractor, ExtractorConfig, PdfiumRenderer};
//!
//! let layout = ModuleLayout::new("modules/keep-on-the-borderlands");
//! let renderer = PdfiumRenderer::new()?;
//! let report = Extractor::new(layout, renderer, ExtractorConfig::default()).run()?;
//!
//! println!("{} pages, {} images", report.pages, report.images_written);
//! # Ok::<(), lorekeeper_pdf::PdfError>(())
//! ```
pub mod decode;
pub mod embedded;
pub mod error;
pub mod extractor;
pub mod render;

// Re-export primary API
pub use error::{PdfError, Result};
pub use extractor::{DedupScope, ExtractionReport, Extractor, ExtractorConfig};
pub use render::{PageRenderer, PageVisitor, PdfiumRenderer};
