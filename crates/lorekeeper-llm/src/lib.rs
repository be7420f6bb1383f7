//! # Lorekeeper LLM
//!
//! Describes the embedded images of an RPG module with a vision-capable
//! language model.
//!
//! - [`provider`]: provider-neutral messages and the [`LlmProvider`] trait
//! - [`openai`]: the OpenAI chat-completions backend
//! - [`annotate`]: per-image annotation with page context
//! - [`combine`]: merges annotations into `embedded-images.json`
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use lorekeeper_core::ModuleLayout;
//! use lorekeeper_llm::{Annotator, AnnotatorConfig, combine_annotations, default_provider};
//!
//! let layout = ModuleLayout::new("modules/keep-on-the-borderlands");
//! let provider = default_provider(None)?;
//! let report = Annotator::new(layout.clone(), provider, AnnotatorConfig::default()).run()?;
//! combine_annotations(&layout)?;
//!
//! println!("annotated {} images", report.annotated);
//! # Ok::<(), lorekeeper_llm::LlmError>(())
//! ```
pub mod annotate;
pub mod combine;
pub mod error;
pub mod openai;
pub mod provider;

// Re-export primary API
pub use annotate::{
    ANNOTATION_SYSTEM_PROMPT, Annotation, AnnotationReport, Annotator, AnnotatorConfig,
    extract_json_object,
};
pub use combine::{CombineReport, combine_annotations};
pub use error::{LlmError, Result};
pub use openai::{OpenAiConfig, OpenAiProvider};
pub use provider::{
    LlmMessage, LlmProvider, LlmResponse, MessageBody, MessageContent, MessageRole, ProviderKind,
    default_provider,
};
