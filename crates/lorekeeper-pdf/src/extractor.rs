//! # Module image extractor
//!
//! Repopulates a module's `page-images/` and `embedded-images/`
//! directories from the PDFs in the module root.

use std::collections::HashSet;
use std::path::Path;

use image::ImageFormat;
use indicatif::{ProgressBar, ProgressStyle};
use lopdf::{Document, ObjectId};
use tracing::{debug, info, warn};

use lorekeeper_core::layout::{self, ModuleLayout};
use lorekeeper_core::types::{EmbeddedImageId, page_image_file_name};

use crate::decode::decode_image;
use crate::embedded::{ContentHash, page_images, page_resources};
use crate::error::Result;
use crate::render::PageRenderer;

/// Scope within which identical images are written only once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DedupScope {
    /// Each document is deduplicated on its own.
    #[default]
    Document,
    /// Images already written for an earlier document are skipped too.
    Module,
}

/// Configuration for the extractor.
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    /// Images narrower or shorter than this many pixels are skipped.
    pub min_dimension: u32,
    /// Resolution page rasters are rendered at.
    pub page_dpi: u32,
    /// Where duplicate detection is scoped.
    pub dedup_scope: DedupScope,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            min_dimension: 50,
            page_dpi: 72,
            dedup_scope: DedupScope::Document,
        }
    }
}

impl ExtractorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_min_dimension(mut self, min_dimension: u32) -> Self {
        self.min_dimension = min_dimension;
        self
    }

    pub fn with_page_dpi(mut self, dpi: u32) -> Self {
        self.page_dpi = dpi.max(1);
        self
    }

    pub fn with_dedup_scope(mut self, scope: DedupScope) -> Self {
        self.dedup_scope = scope;
        self
    }
}

/// Counts collected over one extractor run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractionReport {
    pub documents: usize,
    pub pages: usize,
    pub images_written: usize,
    pub skipped_small: usize,
    pub skipped_duplicate: usize,
    pub failed: usize,
}

impl ExtractionReport {
    fn absorb(&mut self, other: ExtractionReport) {
        self.documents += other.documents;
        self.pages += other.pages;
        self.images_written += other.images_written;
        self.skipped_small += other.skipped_small;
        self.skipped_duplicate += other.skipped_duplicate;
        self.failed += other.failed;
    }
}

fn progress_bar(len: u64, message: String) -> ProgressBar {
    let bar = ProgressBar::new(len);
    if let Ok(style) = ProgressStyle::with_template("{msg} [{bar:40}] {pos}/{len} ({eta})") {
        bar.set_style(style.progress_chars("=> "));
    }
    bar.set_message(message);
    bar
}

/// Extracts page rasters and embedded images for every PDF in a module.
pub struct Extractor<R> {
    layout: ModuleLayout,
    renderer: R,
    config: ExtractorConfig,
}

impl<R: PageRenderer> Extractor<R> {
    pub fn new(layout: ModuleLayout, renderer: R, config: ExtractorConfig) -> Self {
        Self {
            layout,
            renderer,
            config,
        }
    }

    pub fn layout(&self) -> &ModuleLayout {
        &self.layout
    }

    /// Clears both output directories and repopulates them from every PDF
    /// in the module root.
    pub fn run(&self) -> Result<ExtractionReport> {
        layout::clean_directory(&self.layout.page_images)?;
        layout::clean_directory(&self.layout.embedded_images)?;

        let pdfs = layout::list_pdfs(&self.layout.root)?;
        if pdfs.is_empty() {
            warn!(dir = %self.layout.root.display(), "No PDF documents found");
        }

        let mut module_seen = HashSet::new();
        let mut report = ExtractionReport::default();
        for pdf in &pdfs {
            let document_report = self.extract_document(pdf, &mut module_seen)?;
            info!(
                pdf = %pdf.display(),
                pages = document_report.pages,
                images = document_report.images_written,
                "Indexed document"
            );
            report.absorb(document_report);
        }

        info!(
            documents = report.documents,
            pages = report.pages,
            images = report.images_written,
            small = report.skipped_small,
            duplicates = report.skipped_duplicate,
            failed = report.failed,
            "Extraction complete"
        );
        Ok(report)
    }

    /// Renders every page of `pdf` and writes its embedded images.
    ///
    /// `module_seen` collects content hashes across documents; it is only
    /// consulted when the dedup scope is [`DedupScope::Module`].
    pub fn extract_document(
        &self,
        pdf: &Path,
        module_seen: &mut HashSet<ContentHash>,
    ) -> Result<ExtractionReport> {
        let stem = layout::file_stem(pdf);
        let document = Document::load(pdf)?;
        let pages = document.get_pages();

        let mut document_seen = HashSet::new();
        let seen = match self.config.dedup_scope {
            DedupScope::Document => &mut document_seen,
            DedupScope::Module => module_seen,
        };

        let mut report = ExtractionReport {
            documents: 1,
            ..Default::default()
        };
        let bar = progress_bar(pages.len() as u64, format!("Processing {}", pdf.display()));

        self.renderer.render_pages(pdf, self.config.page_dpi, &mut |page, raster| {
            let target = self.layout.page_images.join(page_image_file_name(&stem, page));
            raster.save_with_format(&target, ImageFormat::Png)?;
            report.pages += 1;

            match pages.get(&page) {
                Some(page_id) => {
                    self.extract_page_images(&document, &stem, page, *page_id, seen, &mut report)?
                }
                None => warn!(pdf = %pdf.display(), page, "Rendered page has no page object"),
            }
            bar.inc(1);
            Ok(())
        })?;

        bar.finish_and_clear();
        Ok(report)
    }

    fn extract_page_images(
        &self,
        document: &Document,
        stem: &str,
        page: u32,
        page_id: ObjectId,
        seen: &mut HashSet<ContentHash>,
        report: &mut ExtractionReport,
    ) -> Result<()> {
        let listed = page_resources(document, page_id).and_then(|resources| {
            page_images(document, page_id).map(|images| (resources, images))
        });
        let (resources, images) = match listed {
            Ok(listed) => listed,
            Err(e) => {
                warn!(stem, page, error = %e, "Could not list page images");
                report.failed += 1;
                return Ok(());
            }
        };

        for (position, entry) in images.iter().enumerate() {
            let id = EmbeddedImageId::new(stem, page, position as u32 + 1);
            let raw = match entry {
                Ok(raw) => raw,
                Err(e) => {
                    warn!(image = %id, error = %e, "Skipping malformed image object");
                    report.failed += 1;
                    continue;
                }
            };

            if !raw.meets_min_dimension(self.config.min_dimension) {
                debug!(image = %id, width = raw.width, height = raw.height, "Skipping small image");
                report.skipped_small += 1;
                continue;
            }
            let hash = raw.content_hash();
            if seen.contains(&hash) {
                debug!(image = %id, "Skipping duplicate image");
                report.skipped_duplicate += 1;
                continue;
            }

            let decoded = match decode_image(document, resources, raw) {
                Ok(decoded) => decoded,
                Err(e) => {
                    warn!(image = %id, error = %e, "Failed to decode embedded image");
                    report.failed += 1;
                    continue;
                }
            };

            let target = self.layout.embedded_images.join(id.file_name());
            decoded.save_with_format(&target, ImageFormat::Png)?;
            // Only written content counts as seen.
            seen.insert(hash);
            report.images_written += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedded::tests::document_with_pages;
    use crate::render::PageVisitor;
    use image::{DynamicImage, RgbImage};
    use std::fs;
    use std::path::PathBuf;

    /// Renders blank pages, one per page object, without pdfium.
    struct BlankRenderer;

    impl PageRenderer for BlankRenderer {
        fn render_pages(&self, pdf: &Path, _dpi: u32, visit: &mut PageVisitor<'_>) -> Result<u32> {
            let count = Document::load(pdf)?.get_pages().len() as u32;
            for page in 1..=count {
                visit(page, DynamicImage::ImageRgb8(RgbImage::new(10, 14)))?;
            }
            Ok(count)
        }
    }

    fn names(dir: &Path) -> Vec<String> {
        let mut names: Vec<_> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    fn module_with(docs: &[(&str, Vec<Vec<(u32, u32, [u8; 3])>>)]) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        for (name, pages) in docs {
            let mut doc = document_with_pages(pages);
            doc.save(dir.path().join(format!("{name}.pdf"))).unwrap();
        }
        let root = dir.path().to_path_buf();
        (dir, root)
    }

    fn module_with_document(name: &str, mut doc: Document) -> (tempfile::TempDir, ModuleLayout) {
        let dir = tempfile::tempdir().unwrap();
        doc.save(dir.path().join(format!("{name}.pdf"))).unwrap();
        let layout = ModuleLayout::new(dir.path());
        (dir, layout)
    }

    fn image_object(doc: &Document, page: u32, name: &[u8]) -> ObjectId {
        let page_id = doc.get_pages()[&page];
        let resources = page_resources(doc, page_id).unwrap().unwrap();
        resources
            .get(b"XObject")
            .unwrap()
            .as_dict()
            .unwrap()
            .get(name)
            .unwrap()
            .as_reference()
            .unwrap()
    }

    #[test]
    fn three_pages_one_large_image() {
        let (_dir, root) = module_with(&[(
            "crypt",
            vec![vec![], vec![(40, 40, [255, 0, 0]), (200, 200, [0, 0, 255])], vec![]],
        )]);
        let layout = ModuleLayout::new(&root);
        let extractor = Extractor::new(layout.clone(), BlankRenderer, ExtractorConfig::default());

        let report = extractor.run().unwrap();

        assert_eq!(
            names(&layout.page_images),
            vec!["crypt-0001.png", "crypt-0002.png", "crypt-0003.png"]
        );
        assert_eq!(names(&layout.embedded_images), vec!["crypt-0002-0002.png"]);
        assert_eq!(report.pages, 3);
        assert_eq!(report.images_written, 1);
        assert_eq!(report.skipped_small, 1);

        let written = image::open(layout.embedded_images.join("crypt-0002-0002.png")).unwrap();
        assert_eq!((written.width(), written.height()), (200, 200));
    }

    #[test]
    fn small_images_are_never_written() {
        let (_dir, root) = module_with(&[(
            "tower",
            vec![vec![(49, 300, [1, 1, 1]), (300, 49, [2, 2, 2]), (50, 50, [3, 3, 3])]],
        )]);
        let layout = ModuleLayout::new(&root);
        Extractor::new(layout.clone(), BlankRenderer, ExtractorConfig::default())
            .run()
            .unwrap();

        let written = names(&layout.embedded_images);
        assert_eq!(written, vec!["tower-0001-0003.png"]);
        for name in written {
            let img = image::open(layout.embedded_images.join(name)).unwrap();
            assert!(img.width() >= 50 && img.height() >= 50);
        }
    }

    #[test]
    fn duplicates_within_a_document_are_written_once() {
        let (_dir, root) = module_with(&[(
            "keep",
            vec![
                vec![(80, 80, [7, 7, 7]), (80, 80, [7, 7, 7])],
                vec![(80, 80, [7, 7, 7]), (90, 90, [8, 8, 8])],
            ],
        )]);
        let layout = ModuleLayout::new(&root);
        let report = Extractor::new(layout.clone(), BlankRenderer, ExtractorConfig::default())
            .run()
            .unwrap();

        assert_eq!(names(&layout.embedded_images), vec!["keep-0001-0001.png", "keep-0002-0002.png"]);
        assert_eq!(report.skipped_duplicate, 2);
    }

    #[test]
    fn dedup_scope_controls_cross_document_duplicates() {
        let docs = [
            ("a-module", vec![vec![(64, 64, [5, 5, 5])]]),
            ("b-module", vec![vec![(64, 64, [5, 5, 5])]]),
        ];

        let (_dir, root) = module_with(&docs);
        let layout = ModuleLayout::new(&root);
        Extractor::new(layout.clone(), BlankRenderer, ExtractorConfig::default())
            .run()
            .unwrap();
        assert_eq!(names(&layout.embedded_images).len(), 2);

        let config = ExtractorConfig::new().with_dedup_scope(DedupScope::Module);
        Extractor::new(layout.clone(), BlankRenderer, config).run().unwrap();
        assert_eq!(names(&layout.embedded_images), vec!["a-module-0001-0001.png"]);
    }

    #[test]
    fn run_clears_previous_output() {
        let (_dir, root) = module_with(&[("crypt", vec![vec![]])]);
        let layout = ModuleLayout::new(&root);
        fs::create_dir_all(&layout.embedded_images).unwrap();
        fs::write(layout.embedded_images.join("stale-0009-0001.png"), b"old").unwrap();

        Extractor::new(layout.clone(), BlankRenderer, ExtractorConfig::default())
            .run()
            .unwrap();

        assert!(names(&layout.embedded_images).is_empty());
        assert_eq!(names(&layout.page_images), vec!["crypt-0001.png"]);
    }

    #[test]
    fn malformed_image_does_not_hide_its_neighbours() {
        let mut doc = document_with_pages(&[vec![(100, 100, [1, 1, 1]), (100, 100, [2, 2, 2])]]);
        let broken = image_object(&doc, 1, b"Im1");
        doc.get_object_mut(broken)
            .unwrap()
            .as_stream_mut()
            .unwrap()
            .dict
            .remove(b"Width");

        let (_dir, layout) = module_with_document("lair", doc);
        let report = Extractor::new(layout.clone(), BlankRenderer, ExtractorConfig::default())
            .run()
            .unwrap();

        assert_eq!(names(&layout.embedded_images), vec!["lair-0001-0002.png"]);
        assert_eq!(report.images_written, 1);
        assert_eq!(report.failed, 1);
    }

    #[test]
    fn broken_page_resources_fail_only_that_page() {
        let mut doc = document_with_pages(&[vec![(100, 100, [1, 1, 1])], vec![(100, 100, [2, 2, 2])]]);
        let first_page = doc.get_pages()[&1];
        doc.get_object_mut(first_page)
            .unwrap()
            .as_dict_mut()
            .unwrap()
            .set("Resources", 5);

        let (_dir, layout) = module_with_document("vault", doc);
        let report = Extractor::new(layout.clone(), BlankRenderer, ExtractorConfig::default())
            .run()
            .unwrap();

        assert_eq!(report.pages, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(names(&layout.embedded_images), vec!["vault-0002-0001.png"]);
    }

    #[test]
    fn failed_decode_does_not_mark_content_as_seen() {
        // Same sample bytes twice; the first copy names a colour space the
        // page does not define.
        let mut doc = document_with_pages(&[vec![(80, 80, [4, 4, 4]), (80, 80, [4, 4, 4])]]);
        let broken = image_object(&doc, 1, b"Im1");
        doc.get_object_mut(broken)
            .unwrap()
            .as_stream_mut()
            .unwrap()
            .dict
            .set("ColorSpace", "CS9");

        let (_dir, layout) = module_with_document("shrine", doc);
        let report = Extractor::new(layout.clone(), BlankRenderer, ExtractorConfig::default())
            .run()
            .unwrap();

        assert_eq!(report.failed, 1);
        assert_eq!(report.skipped_duplicate, 0);
        assert_eq!(names(&layout.embedded_images), vec!["shrine-0001-0002.png"]);
    }
}
