use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Extension used for every raster written by the pipeline.
pub const PNG_EXTENSION: &str = "png";

fn embedded_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(?P<stem>.+)-(?P<page>\d{4,})-(?P<index>\d{4,})$")
            .expect("embedded image pattern is valid")
    })
}

/// File stem of the rendered raster for a 1-based page of a document.
///
/// ```
/// use lorekeeper_core::types::page_image_stem;
///
/// assert_eq!(page_image_stem("tomb-of-horrors", 7), "tomb-of-horrors-0007");
/// ```
#[must_use]
pub fn page_image_stem(document_stem: &str, page: u32) -> String {
    format!("{document_stem}-{page:04}")
}

/// File name (`.png`) of the rendered raster for a 1-based page of a document.
#[must_use]
pub fn page_image_file_name(document_stem: &str, page: u32) -> String {
    format!("{}.{PNG_EXTENSION}", page_image_stem(document_stem, page))
}

/// Identity of an embedded image: source document, 1-based page and
/// 1-based position in the page's image list.
///
/// The `Display` form is the file stem used on disk and `FromStr` parses it
/// back, so the annotator can find the page an image came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EmbeddedImageId {
    /// Stem of the source PDF (file name without `.pdf`).
    pub stem: String,
    /// 1-based page number.
    pub page: u32,
    /// 1-based index in the page's image list.
    pub index: u32,
}

impl EmbeddedImageId {
    /// Creates a new embedded image identity.
    pub fn new(stem: impl Into<String>, page: u32, index: u32) -> Self {
        Self {
            stem: stem.into(),
            page,
            index,
        }
    }

    /// File name of the embedded image (`.png`).
    #[must_use]
    pub fn file_name(&self) -> String {
        format!("{self}.{PNG_EXTENSION}")
    }

    /// File name of the page raster this image was found on.
    #[must_use]
    pub fn page_image_file_name(&self) -> String {
        page_image_file_name(&self.stem, self.page)
    }
}

impl fmt::Display for EmbeddedImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:04}-{:04}", self.stem, self.page, self.index)
    }
}

impl FromStr for EmbeddedImageId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CoreError::InvalidImageName { name: s.to_string() };
        let caps = embedded_name_pattern().captures(s).ok_or_else(invalid)?;

        let page = caps["page"].parse::<u32>().map_err(|_| invalid())?;
        let index = caps["index"].parse::<u32>().map_err(|_| invalid())?;
        if page == 0 || index == 0 {
            return Err(invalid());
        }

        Ok(Self {
            stem: caps["stem"].to_string(),
            page,
            index,
        })
    }
}
