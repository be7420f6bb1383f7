use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur in the shared Lorekeeper data model and layout helpers.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A path that must identify a directory does not.
    #[error("expected {path:?} to identify a directory")]
    NotADirectory {
        /// The offending path.
        path: PathBuf,
    },

    /// A file stem does not follow the `<stem>-<page>-<index>` naming scheme.
    #[error("invalid embedded image name: {name:?}")]
    InvalidImageName {
        /// The name that could not be parsed.
        name: String,
    },

    /// An image type string is not one of the known categories.
    #[error("unknown image type: {0:?}")]
    UnknownImageType(String),

    /// An annotation record violates its schema.
    #[error("invalid annotation record: {0}")]
    InvalidAnnotation(String),

    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for Lorekeeper core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let err = CoreError::InvalidImageName {
            name: "cover".into(),
        };
        assert!(err.to_string().contains("cover"));

        let err = CoreError::NotADirectory {
            path: PathBuf::from("/tmp/module.pdf"),
        };
        assert!(err.to_string().contains("module.pdf"));
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<CoreError>();
    }
}
