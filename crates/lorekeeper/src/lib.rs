//! # Lorekeeper
//!
//! Tools for preparing tabletop RPG PDFs for use at the table:
//!
//! - [`pdf`]: page rasters and embedded images of module PDFs
//! - [`llm`]: LLM annotation of embedded images and the combined manifest
//! - [`vecdb`]: visual retrieval over rule-set pages
//!
//! The shared data model and directory layout live in [`model`].
//!
//! ```
//! use lorekeeper::{EmbeddedImageId, ModuleLayout};
//!
//! let layout = ModuleLayout::new("modules/tomb-of-horrors");
//! let id: EmbeddedImageId = "tomb-of-horrors-0003-0001".parse().unwrap();
//! assert_eq!(id.page, 3);
//! assert!(layout.embedded_images.ends_with("embedded-images"));
//! ```
pub use lorekeeper_core as model;
pub use lorekeeper_llm as llm;
pub use lorekeeper_pdf as pdf;
pub use lorekeeper_vecdb as vecdb;

pub use lorekeeper_core::{AnnotationRecord, EmbeddedImageId, ImageType, ModuleLayout, RuleSetLayout};
