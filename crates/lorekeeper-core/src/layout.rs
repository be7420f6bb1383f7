//! # Directory layout
//!
//! Where each tool reads and writes inside a module or rule-set directory,
//! plus the small filesystem helpers every pipeline stage shares.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{CoreError, Result};

/// Subdirectory holding one rendered raster per module page.
pub const MODULE_PAGE_IMAGES_DIR: &str = "page-images";
/// Subdirectory holding embedded images and their annotation records.
pub const MODULE_EMBEDDED_IMAGES_DIR: &str = "embedded-images";
/// Combined annotation manifest in the module root.
pub const MODULE_MANIFEST_FILE: &str = "embedded-images.json";
/// Subdirectory holding one rendered raster per rule-set page.
pub const RULE_SET_PAGE_IMAGE_DIR: &str = "page_image";
/// Subdirectory holding the vector store.
pub const RULE_SET_STORE_DIR: &str = "qdrant";

/// Paths used by the module tools (extractor, annotator, combiner).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleLayout {
    pub root: PathBuf,
    pub page_images: PathBuf,
    pub embedded_images: PathBuf,
    pub manifest: PathBuf,
}

impl ModuleLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            page_images: root.join(MODULE_PAGE_IMAGES_DIR),
            embedded_images: root.join(MODULE_EMBEDDED_IMAGES_DIR),
            manifest: root.join(MODULE_MANIFEST_FILE),
            root,
        }
    }
}

/// Paths used by the rule-set retrieval index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleSetLayout {
    pub root: PathBuf,
    pub page_image: PathBuf,
    pub store: PathBuf,
}

impl RuleSetLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            page_image: root.join(RULE_SET_PAGE_IMAGE_DIR),
            store: root.join(RULE_SET_STORE_DIR),
            root,
        }
    }
}

/// Fails with [`CoreError::NotADirectory`] unless `path` is an existing directory.
pub fn require_directory(path: &Path) -> Result<()> {
    if path.is_dir() {
        Ok(())
    } else {
        Err(CoreError::NotADirectory {
            path: path.to_path_buf(),
        })
    }
}

/// Removes the regular files of `dir`, or creates it when missing.
///
/// Subdirectories are left alone. Returns the number of files removed.
pub fn clean_directory(dir: &Path) -> Result<usize> {
    if !dir.exists() {
        info!(dir = %dir.display(), "Creating directory");
        fs::create_dir_all(dir)?;
        return Ok(0);
    }

    let mut removed = 0;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            fs::remove_file(entry.path())?;
            removed += 1;
        }
    }
    debug!(dir = %dir.display(), removed, "Cleaned directory");
    Ok(removed)
}

/// Regular files directly inside `dir` whose extension matches `extension`
/// (case-insensitive), sorted by path.
pub fn list_files_with_extension(dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let path = entry.path();
        let matches = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(extension));
        if matches {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// PDF documents directly inside `dir`, sorted by path.
pub fn list_pdfs(dir: &Path) -> Result<Vec<PathBuf>> {
    list_files_with_extension(dir, "pdf")
}

/// File name without its extension, lossily converted to UTF-8.
#[must_use]
pub fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_layout_paths() {
        let layout = ModuleLayout::new("/data/modules/b2");
        assert_eq!(layout.page_images, PathBuf::from("/data/modules/b2/page-images"));
        assert_eq!(
            layout.embedded_images,
            PathBuf::from("/data/modules/b2/embedded-images")
        );
        assert_eq!(
            layout.manifest,
            PathBuf::from("/data/modules/b2/embedded-images.json")
        );
    }

    #[test]
    fn rule_set_layout_paths() {
        let layout = RuleSetLayout::new("rules/SRD3_5");
        assert_eq!(layout.page_image, PathBuf::from("rules/SRD3_5/page_image"));
        assert_eq!(layout.store, PathBuf::from("rules/SRD3_5/qdrant"));
    }

    #[test]
    fn require_directory_rejects_files() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("module.pdf");
        fs::write(&file, b"%PDF").unwrap();

        assert!(require_directory(dir.path()).is_ok());
        assert!(matches!(
            require_directory(&file),
            Err(CoreError::NotADirectory { .. })
        ));
        assert!(require_directory(&dir.path().join("missing")).is_err());
    }

    #[test]
    fn clean_directory_creates_or_empties() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("page-images");

        assert_eq!(clean_directory(&target).unwrap(), 0);
        assert!(target.is_dir());

        fs::write(target.join("a.png"), b"a").unwrap();
        fs::write(target.join("b.png"), b"b").unwrap();
        fs::create_dir(target.join("keep")).unwrap();

        assert_eq!(clean_directory(&target).unwrap(), 2);
        assert!(target.join("keep").is_dir());
        assert_eq!(fs::read_dir(&target).unwrap().count(), 1);
    }

    #[test]
    fn lists_pdfs_sorted_case_insensitive() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.pdf", "a.PDF", "notes.txt", "c.pdf.bak"] {
            fs::write(dir.path().join(name), b"").unwrap();
        }
        fs::create_dir(dir.path().join("d.pdf")).unwrap();

        let pdfs = list_pdfs(dir.path()).unwrap();
        let names: Vec<_> = pdfs
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.PDF", "b.pdf"]);
    }

    #[test]
    fn file_stem_strips_extension() {
        assert_eq!(file_stem(Path::new("/x/tomb-0001-0002.png")), "tomb-0001-0002");
        assert_eq!(file_stem(Path::new("/")), "");
    }
}
