use thiserror::Error;

use lorekeeper_core::CoreError;

/// Errors that can occur while talking to an LLM or handling its output.
#[derive(Debug, Error)]
pub enum LlmError {
    /// `OPENAI_API_KEY` is unset or empty.
    #[error("OPENAI_API_KEY environment variable is not set")]
    MissingApiKey,

    /// The configured model cannot read images.
    #[error("model {model} from {provider} does not accept image input")]
    ImagesUnsupported {
        /// Provider display name.
        provider: String,
        /// Model identifier.
        model: String,
    },

    /// Transport-level HTTP failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with a non-success status.
    #[error("API returned {status}: {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body as text.
        body: String,
    },

    /// The API response lacks a field we rely on.
    #[error("unexpected API response: {0}")]
    InvalidResponse(String),

    /// No JSON object could be found in a model reply.
    #[error("no JSON object found in model response")]
    NoJsonObject,

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Naming, layout or annotation schema error from the core crate.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for LLM operations.
pub type Result<T> = std::result::Result<T, LlmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_carries_status_and_body() {
        let err = LlmError::Api {
            status: 429,
            body: "rate limited".into(),
        };
        assert_eq!(err.to_string(), "API returned 429: rate limited");
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<LlmError>();
    }
}
