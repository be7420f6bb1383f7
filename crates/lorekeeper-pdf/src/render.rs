//! # Page rendering
//!
//! Rasterizes every page of a PDF. The extractor and the rule-set indexer
//! only see the [`PageRenderer`] trait; [`PdfiumRenderer`] is the binding
//! to libpdfium used by the command line tools.

use std::path::{Path, PathBuf};

use image::DynamicImage;
use pdfium_render::prelude::*;
use tracing::{debug, info};

use crate::error::{PdfError, Result};

/// Resolution PDF user space is defined in.
pub const POINTS_PER_INCH: f32 = 72.0;

/// Environment variable naming a directory that contains libpdfium.
pub const PDFIUM_LIB_DIR_ENV: &str = "PDFIUM_LIB_DIR";

/// Callback receiving each rendered page (1-based page number).
pub type PageVisitor<'a> = dyn FnMut(u32, DynamicImage) -> Result<()> + 'a;

/// Something that can rasterize the pages of a PDF document.
pub trait PageRenderer {
    /// Renders every page of `pdf` at `dpi` and hands it to `visit` in page
    /// order. Returns the number of pages rendered.
    fn render_pages(&self, pdf: &Path, dpi: u32, visit: &mut PageVisitor<'_>) -> Result<u32>;
}

/// Page renderer backed by a dynamically bound libpdfium.
pub struct PdfiumRenderer {
    pdfium: Pdfium,
}

impl PdfiumRenderer {
    /// Binds libpdfium, searching `$PDFIUM_LIB_DIR`, the current directory,
    /// `./vendor/pdfium/lib/` and finally the system library paths.
    pub fn new() -> Result<Self> {
        let configured = std::env::var_os(PDFIUM_LIB_DIR_ENV).map(PathBuf::from);
        Self::with_library_dir(configured.as_deref())
    }

    /// Binds libpdfium, trying `dir` before the default search locations.
    pub fn with_library_dir(dir: Option<&Path>) -> Result<Self> {
        let mut candidates: Vec<PathBuf> = Vec::new();
        if let Some(dir) = dir {
            candidates.push(dir.to_path_buf());
        }
        candidates.push(PathBuf::from("./"));
        candidates.push(PathBuf::from("./vendor/pdfium/lib/"));

        for candidate in &candidates {
            let library = Pdfium::pdfium_platform_library_name_at_path(candidate);
            match Pdfium::bind_to_library(library) {
                Ok(bindings) => {
                    info!(dir = %candidate.display(), "Bound pdfium library");
                    return Ok(Self {
                        pdfium: Pdfium::new(bindings),
                    });
                }
                Err(e) => debug!(dir = %candidate.display(), error = ?e, "pdfium not found"),
            }
        }

        let bindings = Pdfium::bind_to_system_library().map_err(|e| {
            PdfError::Render(format!(
                "failed to load the pdfium library (set {PDFIUM_LIB_DIR_ENV} or install libpdfium): {e:?}"
            ))
        })?;
        Ok(Self {
            pdfium: Pdfium::new(bindings),
        })
    }
}

impl PageRenderer for PdfiumRenderer {
    fn render_pages(&self, pdf: &Path, dpi: u32, visit: &mut PageVisitor<'_>) -> Result<u32> {
        let document = self
            .pdfium
            .load_pdf_from_file(pdf, None)
            .map_err(|e| PdfError::Render(format!("{}: {e:?}", pdf.display())))?;

        let config = PdfRenderConfig::new().scale_page_by_factor(dpi as f32 / POINTS_PER_INCH);

        let mut rendered = 0u32;
        for page in document.pages().iter() {
            let bitmap = page
                .render_with_config(&config)
                .map_err(|e| PdfError::Render(format!("page {}: {e:?}", rendered + 1)))?;
            rendered += 1;
            visit(rendered, bitmap.as_image())?;
        }

        Ok(rendered)
    }
}
