use std::path::PathBuf;

use thiserror::Error;

use lorekeeper_core::CoreError;
use lorekeeper_pdf::PdfError;

/// Errors that can occur while embedding, storing or searching page images.
#[derive(Debug, Error)]
pub enum VecDbError {
    /// SQLite error from the embedded store.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A collection that should exist does not.
    #[error("collection not found: {0}")]
    CollectionNotFound(String),

    /// A collection that should not exist does.
    #[error("collection already exists: {0}")]
    CollectionExists(String),

    /// A vector does not have the collection's dimensionality.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Configured vector size.
        expected: usize,
        /// Size of the offending vector.
        actual: usize,
    },

    /// A point or query is malformed.
    #[error("invalid point: {0}")]
    InvalidPoint(String),

    /// The model directory or one of its files is missing.
    #[error("model file not found: {path:?}")]
    ModelNotFound {
        /// Missing path.
        path: PathBuf,
    },

    /// Candle tensor or model error.
    #[error("Candle error: {0}")]
    Candle(String),

    /// Tokenizer error.
    #[error("tokenizer error: {0}")]
    Tokenizer(String),

    /// Image decoding error.
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// Page rendering error.
    #[error(transparent)]
    Pdf(#[from] PdfError),

    /// Layout error from the core crate.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<candle_core::Error> for VecDbError {
    fn from(e: candle_core::Error) -> Self {
        VecDbError::Candle(e.to_string())
    }
}

/// Result type alias for vector database operations.
pub type Result<T> = std::result::Result<T, VecDbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let err = VecDbError::DimensionMismatch {
            expected: 128,
            actual: 64,
        };
        assert_eq!(err.to_string(), "dimension mismatch: expected 128, got 64");

        let err = VecDbError::CollectionNotFound("page_images".into());
        assert_eq!(err.to_string(), "collection not found: page_images");
    }
}
