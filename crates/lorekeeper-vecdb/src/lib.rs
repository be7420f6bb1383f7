//! # Lorekeeper VecDB
//!
//! Visual retrieval over rule-set pages. Every page is rendered to an
//! image, embedded as a multi-vector with ColPali and stored in an
//! embedded MaxSim store; text queries return the best-matching page
//! images.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use lorekeeper_core::RuleSetLayout;
//! use lorekeeper_pdf::PdfiumRenderer;
//! use lorekeeper_vecdb::{ColPaliEmbedder, EmbedderConfig, RagConfig, RuleSetRag};
//!
//! let embedder = ColPaliEmbedder::load(EmbedderConfig::default())?;
//! let mut rag = RuleSetRag::open(RuleSetLayout::new("rules/srd"), embedder, RagConfig::default())?;
//! rag.create_index(&PdfiumRenderer::new()?)?;
//!
//! for path in rag.page_image_paths("grapple", 5)? {
//!     println!("{}", path.display());
//! }
//! # Ok::<(), lorekeeper_vecdb::VecDbError>(())
//! ```
pub mod embedder;
pub mod error;
pub mod quantize;
pub mod rag;
pub mod retry;
pub mod scoring;
pub mod store;

// Re-export primary API
pub use embedder::{ColPaliEmbedder, EmbedderConfig, VisualEmbedder};
pub use error::{Result, VecDbError};
pub use quantize::ScalarQuantizer;
pub use rag::{IndexReport, RagConfig, RuleSetRag, augment_query};
pub use retry::with_retry;
pub use scoring::{MultiVector, max_sim};
pub use store::{
    CollectionConfig, Distance, MultiVectorComparator, MultiVectorStore, PointStruct,
    ScalarQuantization, ScoredPoint,
};
