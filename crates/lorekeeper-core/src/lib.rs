//! # Lorekeeper Core
//!
//! Shared data model for the Lorekeeper RPG content pipeline: how page and
//! embedded images are named on disk, the annotation record the LLM
//! annotator produces, and the directory layout of modules and rule sets.
//!
//! ## Quick Start
//!
//! ```rust
//! use lorekeeper_core::types::EmbeddedImageId;
//!
//! let id: EmbeddedImageId = "keep-on-the-borderlands-0012-0002".parse().unwrap();
//!
//! assert_eq!(id.page, 12);
//! assert_eq!(id.page_image_file_name(), "keep-on-the-borderlands-0012.png");
//! ```
pub mod error;
pub mod layout;
pub mod types;

// Re-export primary API
pub use error::{CoreError, Result};
pub use layout::{ModuleLayout, RuleSetLayout};
pub use types::{AnnotationRecord, EmbeddedImageId, ImageType};
