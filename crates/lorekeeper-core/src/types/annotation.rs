use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::image_type::ImageType;
use crate::error::{CoreError, Result};

/// Upper bound of [`AnnotationRecord::relevance`].
pub const MAX_RELEVANCE: f32 = 10.0;

/// Field injected into every record of the combined manifest.
pub const IMAGE_FILENAME_FIELD: &str = "image_filename";

/// Structured description of one embedded image, as produced by the LLM
/// annotator and persisted next to the image.
///
/// Fields the model adds beyond the schema are kept in `extra` so that
/// nothing it said is lost when the record is rewritten.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationRecord {
    /// What the image shows.
    pub description: String,

    /// How the image relates to the surrounding pages.
    pub context: String,

    /// Image category.
    #[serde(rename = "type")]
    pub image_type: ImageType,

    /// Location depicted or referenced, if any.
    #[serde(default)]
    pub location: Option<String>,

    /// Event depicted or referenced, if any.
    #[serde(default)]
    pub event: Option<String>,

    /// Named character depicted, if any.
    #[serde(default)]
    pub character: Option<String>,

    /// Creature depicted, if any.
    #[serde(default)]
    pub creature: Option<String>,

    /// Usefulness at the table, `0..=10`.
    pub relevance: f32,

    /// Search keywords.
    pub keywords: Vec<String>,

    /// Whether the image reveals information the players should not see.
    pub secret: bool,

    /// Whether the image is meant to be shown to the players.
    pub handout: bool,

    /// Any additional fields returned by the model.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AnnotationRecord {
    /// Names of the fields every record must carry.
    pub const REQUIRED_FIELDS: [&'static str; 7] = [
        "description",
        "context",
        "type",
        "relevance",
        "keywords",
        "secret",
        "handout",
    ];

    /// Builds a record from a parsed JSON value and checks its invariants.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Json` when a required field is missing or has the
    /// wrong type and `CoreError::InvalidAnnotation` when the relevance is
    /// out of range.
    pub fn from_value(value: Value) -> Result<Self> {
        let record: Self = serde_json::from_value(value)?;
        record.validate()?;
        Ok(record)
    }

    /// Checks value ranges serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=MAX_RELEVANCE).contains(&self.relevance) {
            return Err(CoreError::InvalidAnnotation(format!(
                "relevance {} is outside 0..={MAX_RELEVANCE}",
                self.relevance
            )));
        }
        if self.description.trim().is_empty() {
            return Err(CoreError::InvalidAnnotation("empty description".into()));
        }
        Ok(())
    }
}
