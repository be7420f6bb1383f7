pub mod annotation;
pub mod image_type;
pub mod naming;

pub use annotation::{AnnotationRecord, IMAGE_FILENAME_FIELD, MAX_RELEVANCE};
pub use image_type::ImageType;
pub use naming::{EmbeddedImageId, PNG_EXTENSION, page_image_file_name, page_image_stem};
