//! # Image annotator
//!
//! Asks a vision-capable LLM to describe each embedded image of a module,
//! using the page the image came from and its neighbours as context, and
//! stores the structured answer as `<image stem>.json` beside the image.

use std::fs;
use std::path::{Path, PathBuf};

use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;
use tracing::{debug, info, warn};

use lorekeeper_core::layout::{self, ModuleLayout};
use lorekeeper_core::types::{AnnotationRecord, EmbeddedImageId, PNG_EXTENSION, page_image_file_name};

use crate::error::{LlmError, Result};
use crate::provider::{LlmMessage, LlmProvider, MessageContent, MessageRole};

/// System prompt sent with every annotation request.
pub const ANNOTATION_SYSTEM_PROMPT: &str = r#"You are an assistant to the game master of a tabletop role-playing game.
You catalogue the images found in published adventure modules so they can be found and shown at the table.

You will receive one embedded image, followed by the full page it was printed on and the neighbouring pages.
Use the pages to understand what the image depicts and how it is used in the adventure.

Classify the image as exactly one of these types:
- map: a map or floor plan of an area
- location: an illustration of a place
- character: a named or notable non-player character
- creature: a monster or animal
- item: an object, weapon or treasure
- event: a scene from something that happens in the adventure
- handout: material meant to be given to the players
- decoration: borders, ornaments and other art with no game meaning

Reply with a single JSON object and nothing else, using this schema:
{
  "description": "what the image shows",
  "context": "how the image relates to the adventure text",
  "type": "map | location | character | creature | item | event | handout | decoration",
  "location": "location shown or referenced, or null",
  "event": "event shown or referenced, or null",
  "character": "character shown, or null",
  "creature": "creature shown, or null",
  "relevance": 0-10 (how useful the image is during play),
  "keywords": ["search", "keywords"],
  "secret": true if showing the image would reveal information the players should not have,
  "handout": true if the image is meant to be shown to the players
}"#;

/// Returns the first balanced `{...}` span in `text`.
///
/// Braces inside JSON string literals are ignored, so prose or code fences
/// around the object do not matter.
pub fn extract_json_object(text: &str) -> Result<&str> {
    let start = text.find('{').ok_or(LlmError::NoJsonObject)?;

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Ok(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    Err(LlmError::NoJsonObject)
}

/// Annotator settings.
#[derive(Debug, Clone)]
pub struct AnnotatorConfig {
    /// Leave images that already have a `.json` annotation alone.
    pub skip_existing: bool,
    /// Pages on each side of the source page sent as extra context.
    pub neighbor_pages: u32,
}

impl Default for AnnotatorConfig {
    fn default() -> Self {
        Self {
            skip_existing: false,
            neighbor_pages: 1,
        }
    }
}

impl AnnotatorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_skip_existing(mut self, skip: bool) -> Self {
        self.skip_existing = skip;
        self
    }

    pub fn with_neighbor_pages(mut self, pages: u32) -> Self {
        self.neighbor_pages = pages;
        self
    }
}

/// One successfully annotated image.
#[derive(Debug, Clone)]
pub struct Annotation {
    pub record: AnnotationRecord,
    pub json_path: PathBuf,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Totals over one annotator run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AnnotationReport {
    pub annotated: usize,
    pub skipped: usize,
    pub failed: usize,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Path of the annotation written for `image`.
pub fn annotation_path(image: &Path) -> PathBuf {
    image.with_extension("json")
}

/// Annotates the embedded images of a module.
pub struct Annotator<P> {
    layout: ModuleLayout,
    provider: P,
    config: AnnotatorConfig,
}

impl<P: LlmProvider> Annotator<P> {
    pub fn new(layout: ModuleLayout, provider: P, config: AnnotatorConfig) -> Self {
        Self {
            layout,
            provider,
            config,
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Page image for `page` followed by the existing neighbour pages.
    fn context_pages(&self, id: &EmbeddedImageId) -> Result<Vec<PathBuf>> {
        let page = self.layout.page_images.join(id.page_image_file_name());
        if !page.is_file() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("page image {} not found", page.display()),
            )
            .into());
        }

        let first = id.page.saturating_sub(self.config.neighbor_pages).max(1);
        let last = id.page.saturating_add(self.config.neighbor_pages);
        let neighbours = (first..=last)
            .filter(|&n| n != id.page)
            .map(|n| self.layout.page_images.join(page_image_file_name(&id.stem, n)))
            .filter(|path| path.is_file());

        Ok(std::iter::once(page).chain(neighbours).collect())
    }

    fn request(&self, image: &Path, id: &EmbeddedImageId, pages: &[PathBuf]) -> LlmMessage {
        let task = format!(
            "Annotate the embedded image {}. It is the first image below. \
             The second image is page {} of the module, where the embedded image appears; \
             any further images are the neighbouring pages.",
            id.file_name(),
            id.page
        );

        let mut parts = vec![
            MessageContent::Text(task),
            MessageContent::Image(image.to_path_buf()),
        ];
        parts.extend(pages.iter().cloned().map(MessageContent::Image));
        LlmMessage::parts(MessageRole::User, parts)
    }

    /// Annotates one embedded image and writes `<stem>.json` beside it.
    ///
    /// Nothing is written when any step fails.
    pub fn annotate_image(&self, image: &Path) -> Result<Annotation> {
        let id: EmbeddedImageId = layout::file_stem(image).parse()?;
        let pages = self.context_pages(&id)?;
        let message = self.request(image, &id, &pages);

        let reply = self
            .provider
            .send_message(&[message], Some(ANNOTATION_SYSTEM_PROMPT))?;
        let json: Value = serde_json::from_str(extract_json_object(&reply.content)?)?;
        let record = AnnotationRecord::from_value(json)?;

        let json_path = annotation_path(image);
        fs::write(&json_path, serde_json::to_string_pretty(&record)?)?;
        debug!(image = %id, path = %json_path.display(), "Wrote annotation");

        Ok(Annotation {
            record,
            json_path,
            input_tokens: reply.input_tokens,
            output_tokens: reply.output_tokens,
        })
    }

    /// Annotates every embedded image of the module in name order.
    pub fn run(&self) -> Result<AnnotationReport> {
        if !self.provider.supports_images() {
            return Err(LlmError::ImagesUnsupported {
                provider: self.provider.provider_name().to_string(),
                model: self.provider.model_name().to_string(),
            });
        }

        let images = layout::list_files_with_extension(&self.layout.embedded_images, PNG_EXTENSION)?;
        info!(
            images = images.len(),
            provider = self.provider.provider_name(),
            model = self.provider.model_name(),
            "Annotating embedded images"
        );

        let bar = ProgressBar::new(images.len() as u64);
        if let Ok(style) = ProgressStyle::with_template("{msg} [{bar:40}] {pos}/{len} ({eta})") {
            bar.set_style(style.progress_chars("=> "));
        }
        bar.set_message("Annotating");

        let mut report = AnnotationReport::default();
        for image in &images {
            bar.inc(1);
            if self.config.skip_existing && annotation_path(image).is_file() {
                report.skipped += 1;
                continue;
            }
            match self.annotate_image(image) {
                Ok(annotation) => {
                    report.annotated += 1;
                    report.input_tokens += annotation.input_tokens;
                    report.output_tokens += annotation.output_tokens;
                }
                Err(e) => {
                    warn!(image = %image.display(), error = %e, "Failed to annotate image");
                    report.failed += 1;
                }
            }
        }
        bar.finish_and_clear();

        info!(
            annotated = report.annotated,
            skipped = report.skipped,
            failed = report.failed,
            input_tokens = report.input_tokens,
            output_tokens = report.output_tokens,
            "Annotation complete"
        );
        Ok(report)
    }
}
