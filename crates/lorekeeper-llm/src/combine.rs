//! # Annotation combiner
//!
//! Merges the per-image `.json` annotations of a module into the single
//! `embedded-images.json` manifest, keyed by image stem.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use serde_json::{Map, Value};
use tracing::{info, warn};

use lorekeeper_core::layout::{self, ModuleLayout};
use lorekeeper_core::types::{IMAGE_FILENAME_FIELD, PNG_EXTENSION};

use crate::error::Result;

/// Outcome of a combiner run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CombineReport {
    pub combined: usize,
    pub skipped: usize,
}

/// File names of the module's images, keyed by stem.
fn image_file_names(dir: &Path) -> Result<HashMap<String, String>> {
    Ok(layout::list_files_with_extension(dir, PNG_EXTENSION)?
        .into_iter()
        .filter_map(|path| {
            let name = path.file_name()?.to_string_lossy().into_owned();
            Some((layout::file_stem(&path), name))
        })
        .collect())
}

fn read_annotation(path: &Path) -> std::result::Result<Map<String, Value>, String> {
    let text = fs::read_to_string(path).map_err(|e| e.to_string())?;
    match serde_json::from_str::<Value>(&text).map_err(|e| e.to_string())? {
        Value::Object(map) => Ok(map),
        _ => Err("annotation is not a JSON object".to_string()),
    }
}

/// Writes `embedded-images.json` from every annotation in the module.
///
/// Files that cannot be read or are not JSON objects are logged and left
/// out.
pub fn combine_annotations(layout: &ModuleLayout) -> Result<CombineReport> {
    let files = layout::list_files_with_extension(&layout.embedded_images, "json")?;
    let images = image_file_names(&layout.embedded_images)?;

    let mut combined = BTreeMap::new();
    let mut report = CombineReport::default();
    for path in &files {
        let stem = layout::file_stem(path);
        match read_annotation(path) {
            Ok(mut record) => {
                // Falls back to `<stem>.png` when the image itself is gone.
                let image = images
                    .get(&stem)
                    .cloned()
                    .unwrap_or_else(|| format!("{stem}.{PNG_EXTENSION}"));
                record.insert(IMAGE_FILENAME_FIELD.to_string(), Value::String(image));
                combined.insert(stem, Value::Object(record));
                report.combined += 1;
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping annotation");
                report.skipped += 1;
            }
        }
    }

    fs::write(&layout.manifest, serde_json::to_string_pretty(&combined)?)?;
    info!(
        combined = report.combined,
        skipped = report.skipped,
        manifest = %layout.manifest.display(),
        "Combined annotations"
    );
    Ok(report)
}
