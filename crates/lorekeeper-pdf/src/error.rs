use thiserror::Error;

use lorekeeper_core::CoreError;

/// Errors that can occur while rendering or extracting from PDF documents.
#[derive(Debug, Error)]
pub enum PdfError {
    /// The PDF could not be parsed.
    #[error("PDF parse error: {0}")]
    Parse(#[from] lopdf::Error),

    /// The pdfium library could not be bound or failed to render.
    #[error("PDF render error: {0}")]
    Render(String),

    /// An image object uses a filter we cannot decode.
    #[error("unsupported image filter: {0}")]
    UnsupportedFilter(String),

    /// An image object uses a colour space we cannot convert.
    #[error("unsupported colour space: {0}")]
    UnsupportedColorSpace(String),

    /// An image object is structurally invalid.
    #[error("malformed image object: {0}")]
    MalformedImage(String),

    /// Image decoding or encoding error.
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// Layout or naming error from the core crate.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for PDF operations.
pub type Result<T> = std::result::Result<T, PdfError>;
